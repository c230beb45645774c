//! In-memory stand-in for the CRM system of record.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dealflow_core::{Credential, ExternalId, ExternalSystem, Fields, RemoteError, RemoteRecord};

/// Kind of call made against the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmOp {
    /// Record creation
    Create,
    /// Record update
    Update,
    /// Record deletion
    Delete,
    /// Remote action
    Invoke,
}

/// A call the fake received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Operation
    pub op: CrmOp,
    /// Collection, or action name for invocations
    pub target: String,
    /// Addressed record, for updates and deletes
    pub external_id: Option<ExternalId>,
    /// Request payload
    pub payload: Fields,
    /// Bearer token the call was made with
    pub token: String,
}

type PayloadMatcher = Box<dyn Fn(&Fields) -> bool + Send + Sync>;

struct FailureRule {
    op: CrmOp,
    target: String,
    matcher: Option<PayloadMatcher>,
    error: RemoteError,
}

impl FailureRule {
    fn applies(&self, op: CrmOp, target: &str, payload: &Fields) -> bool {
        self.op == op
            && self.target == target
            && self.matcher.as_ref().map_or(true, |matches| matches(payload))
    }
}

#[derive(Default)]
struct CrmState {
    next_id: HashMap<String, u64>,
    records: HashMap<(String, ExternalId), Fields>,
    calls: Vec<RecordedCall>,
    rules: Vec<FailureRule>,
    actions: HashMap<String, Value>,
}

/// Fake CRM that assigns sequential ids per collection
///
/// Created ids look like `price_lists-1`. Failures can be scripted per
/// operation and collection, optionally only for payloads matching a
/// predicate.
#[derive(Clone, Default)]
pub struct FakeCrm {
    state: Arc<Mutex<CrmState>>,
}

impl fmt::Debug for FakeCrm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeCrm")
            .field("records", &state.records.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl FakeCrm {
    /// Create an empty fake
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every matching call with the given error
    pub fn fail(&self, op: CrmOp, target: &str, error: RemoteError) {
        self.state.lock().rules.push(FailureRule {
            op,
            target: target.to_string(),
            matcher: None,
            error,
        });
    }

    /// Fail matching calls whose payload satisfies the predicate
    pub fn fail_when<F>(&self, op: CrmOp, target: &str, matcher: F, error: RemoteError)
    where
        F: Fn(&Fields) -> bool + Send + Sync + 'static,
    {
        self.state.lock().rules.push(FailureRule {
            op,
            target: target.to_string(),
            matcher: Some(Box::new(matcher)),
            error,
        });
    }

    /// Reject creates in a collection whose payload has `field == value`
    pub fn reject_create_where(&self, collection: &str, field: &str, value: Value, status: u16) {
        let field = field.to_string();
        self.fail_when(
            CrmOp::Create,
            collection,
            move |payload| payload.get(&field) == Some(&value),
            RemoteError::from_status(status, "rejected by fake CRM"),
        );
    }

    /// Drop every scripted failure
    pub fn clear_failures(&self) {
        self.state.lock().rules.clear();
    }

    /// Script the response of a remote action
    pub fn set_action_response(&self, action: &str, response: Value) {
        self.state
            .lock()
            .actions
            .insert(action.to_string(), response);
    }

    /// Seed a remote record, as if created outside the workflow
    pub fn seed(&self, collection: &str, external_id: &str, fields: Fields) {
        self.state
            .lock()
            .records
            .insert((collection.to_string(), external_id.into()), fields);
    }

    /// Current remote state of a record
    pub fn record(&self, collection: &str, external_id: &ExternalId) -> Option<Fields> {
        self.state
            .lock()
            .records
            .get(&(collection.to_string(), external_id.clone()))
            .cloned()
    }

    /// Every live record of a collection
    pub fn records(&self, collection: &str) -> Vec<(ExternalId, Fields)> {
        let mut records: Vec<_> = self
            .state
            .lock()
            .records
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), fields)| (id.clone(), fields.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    /// Every call received, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one operation against one collection or action
    pub fn calls_to(&self, op: CrmOp, target: &str) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.op == op && call.target == target)
            .cloned()
            .collect()
    }

    /// Number of successful creates across all collections
    pub fn created_count(&self) -> u64 {
        self.state.lock().next_id.values().sum()
    }

    fn record_call(
        &self,
        op: CrmOp,
        target: &str,
        external_id: Option<&ExternalId>,
        payload: &Fields,
        credential: &Credential,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            op,
            target: target.to_string(),
            external_id: external_id.cloned(),
            payload: payload.clone(),
            token: credential.token().to_string(),
        });
        match state
            .rules
            .iter()
            .find(|rule| rule.applies(op, target, payload))
        {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExternalSystem for FakeCrm {
    async fn create(
        &self,
        credential: &Credential,
        collection: &str,
        payload: &Fields,
    ) -> Result<RemoteRecord, RemoteError> {
        self.record_call(CrmOp::Create, collection, None, payload, credential)?;

        let mut state = self.state.lock();
        let counter = state.next_id.entry(collection.to_string()).or_insert(0);
        *counter += 1;
        let external_id = ExternalId::from(format!("{}-{}", collection, counter));

        let mut fields = payload.clone();
        fields.insert("id".into(), json!(external_id));
        state
            .records
            .insert((collection.to_string(), external_id.clone()), fields.clone());

        Ok(RemoteRecord {
            external_id,
            fields,
        })
    }

    async fn update(
        &self,
        credential: &Credential,
        collection: &str,
        external_id: &ExternalId,
        payload: &Fields,
    ) -> Result<Fields, RemoteError> {
        self.record_call(CrmOp::Update, collection, Some(external_id), payload, credential)?;

        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(&(collection.to_string(), external_id.clone()))
            .ok_or_else(|| RemoteError::from_status(404, format!("{} not found", external_id)))?;
        for (key, value) in payload {
            record.insert(key.clone(), value.clone());
        }
        Ok(record.clone())
    }

    async fn delete(
        &self,
        credential: &Credential,
        collection: &str,
        external_id: &ExternalId,
    ) -> Result<(), RemoteError> {
        self.record_call(
            CrmOp::Delete,
            collection,
            Some(external_id),
            &Fields::new(),
            credential,
        )?;
        self.state
            .lock()
            .records
            .remove(&(collection.to_string(), external_id.clone()));
        Ok(())
    }

    async fn invoke(
        &self,
        credential: &Credential,
        action: &str,
        payload: &Fields,
    ) -> Result<Value, RemoteError> {
        self.record_call(CrmOp::Invoke, action, None, payload, credential)?;
        self.state
            .lock()
            .actions
            .get(action)
            .cloned()
            .ok_or_else(|| RemoteError::from_status(404, format!("Unknown action {}", action)))
    }
}
