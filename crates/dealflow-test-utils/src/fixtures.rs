//! Seeded worlds for pipeline tests.
//!
//! A [`TestWorld`] pairs a [`FakeCrm`] with a [`FailableLocalStore`] and
//! builds orchestrators over them. Seeding helpers create records in both
//! stores so they start out synced.

use serde_json::{json, Value};
use std::sync::Arc;

use dealflow_core::{
    Credential, EntityKind, ExternalId, Fields, LocalId, LocalRecord, LocalStore, NewPriceList,
    OfferingRequest, Orchestrator, OrchestratorConfig,
};

use crate::fakes::{FailableLocalStore, FakeCrm};

/// Token every fixture call is made with
pub const TEST_TOKEN: &str = "test-token";

/// Credential carrying [`TEST_TOKEN`]
pub fn credential() -> Credential {
    Credential::bearer(TEST_TOKEN)
}

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Both stores, ready to be seeded
#[derive(Clone, Default)]
pub struct TestWorld {
    /// Remote side
    pub crm: FakeCrm,
    /// Local side
    pub store: FailableLocalStore,
}

impl TestWorld {
    /// Create an empty world
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Orchestrator with the default configuration
    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(OrchestratorConfig::default())
    }

    /// Orchestrator with a custom configuration
    pub fn orchestrator_with(&self, config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(
            Arc::new(self.crm.clone()),
            Arc::new(self.store.clone()),
            config,
        )
    }

    /// Insert a record present in both stores
    pub async fn seed_synced(
        &self,
        kind: EntityKind,
        local_id: &str,
        external_id: &str,
        fields: Value,
    ) -> LocalRecord {
        let fields = as_fields(fields);
        self.crm.seed(kind.collection(), external_id, fields.clone());
        self.store
            .inner()
            .insert(LocalRecord::new(
                kind,
                local_id.into(),
                Some(external_id.into()),
                fields,
            ))
            .await
            .expect("seed synced record")
    }

    /// Insert a record that only exists locally
    pub async fn seed_unsynced(&self, kind: EntityKind, local_id: &str, fields: Value) -> LocalRecord {
        self.store
            .inner()
            .insert(LocalRecord::new(kind, local_id.into(), None, as_fields(fields)))
            .await
            .expect("seed unsynced record")
    }

    /// Synced account `acc-1` / `ACC-1`
    pub async fn seed_account(&self) -> LocalRecord {
        self.seed_synced(EntityKind::Account, "acc-1", "ACC-1", json!({"name": "Acme"}))
            .await
    }

    /// Synced product offerings `po-{n}` / `PO-{n}` for each name
    pub async fn seed_offerings(&self, names: &[&str]) -> Vec<LocalRecord> {
        let mut seeded = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let n = index + 1;
            seeded.push(
                self.seed_synced(
                    EntityKind::ProductOffering,
                    &format!("po-{}", n),
                    &format!("PO-{}", n),
                    json!({"name": name}),
                )
                .await,
            );
        }
        seeded
    }

    /// Local record by id, bypassing injected failures
    pub async fn local(&self, kind: EntityKind, local_id: &LocalId) -> Option<LocalRecord> {
        self.store
            .inner()
            .find_by_id(kind, local_id)
            .await
            .expect("read local record")
    }

    /// Local records whose fields match the criteria, bypassing injected failures
    pub async fn local_where(&self, kind: EntityKind, criteria: Value) -> Vec<LocalRecord> {
        self.store
            .inner()
            .find_where(kind, &as_fields(criteria))
            .await
            .expect("query local records")
    }

    /// Local record mirroring a remote id, bypassing injected failures
    pub async fn local_for(&self, kind: EntityKind, external_id: &ExternalId) -> Option<LocalRecord> {
        self.store
            .inner()
            .find_by_external_id(kind, external_id)
            .await
            .expect("read local record")
    }
}

/// Offering request with default quantity and unit
pub fn offering(product_offering: &str, amount: f64) -> OfferingRequest {
    OfferingRequest {
        product_offering: product_offering.into(),
        amount,
        quantity: 1,
        unit_of_measure: "each".to_string(),
        term_months: 0,
    }
}

/// New price list request
pub fn price_list(name: &str) -> NewPriceList {
    NewPriceList {
        name: name.to_string(),
        currency: Some("USD".to_string()),
        description: None,
    }
}

fn as_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
