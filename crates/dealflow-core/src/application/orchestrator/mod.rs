//! The workflow pipelines
//!
//! Three pipelines drive the sales flow across both stores: opportunity
//! creation with pricing, pricing replacement and quote generation. Each
//! one runs a mandatory prefix of single-entity steps followed by a fan-out
//! whose items fail independently. A prefix failure is a hard failure only
//! while nothing has been written remotely; after that the run is partial.

mod creation;
mod pricing;
mod quote;
mod replacement;

use serde_json::Value;
use std::sync::Arc;

use crate::application::fan_out::FanOutAggregator;
use crate::application::pinner::{CorrelationPinner, PinnedId};
use crate::application::resolver::ReferenceResolver;
use crate::application::step_executor::{StepExecutor, StepSpec};
use crate::config::OrchestratorConfig;
use crate::domain::entities::NewPriceList;
use crate::domain::entities::PriceListFields;
use crate::domain::external::ExternalSystem;
use crate::domain::repository::LocalStore;
use crate::error::StepError;
use crate::types::{Credential, EntityKind, Fields, Synced};

/// Runs the workflow pipelines on behalf of a caller
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn LocalStore>,
    resolver: ReferenceResolver,
    pinner: CorrelationPinner,
    executor: StepExecutor,
    aggregator: FanOutAggregator,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator over the two stores
    pub fn new(
        external: Arc<dyn ExternalSystem>,
        store: Arc<dyn LocalStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            resolver: ReferenceResolver::new(store.clone()),
            pinner: CorrelationPinner::new(config.correlation_field.clone()),
            executor: StepExecutor::new(external, store.clone()),
            aggregator: FanOutAggregator::new(config.fan_out_concurrency),
            store,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Turn a JSON object into a remote payload carrying the pinned id
    fn remote_payload(&self, pinned: &PinnedId, body: Value) -> Fields {
        let mut payload = match body {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        self.pinner.embed(pinned, &mut payload);
        payload
    }

    /// Run a create or adopt step and return both identifiers of the entity
    async fn create_synced(
        &self,
        credential: &Credential,
        spec: StepSpec,
    ) -> Result<Synced, StepError> {
        let output = self.executor.execute(credential, spec).await?;
        output.synced().ok_or(StepError::NotSynced {
            entity: output.kind,
            local_id: output.local_id,
        })
    }

    /// Create a price list for an account
    async fn create_price_list(
        &self,
        credential: &Credential,
        account: &Synced,
        list: &NewPriceList,
    ) -> Result<Synced, StepError> {
        let pinned = self.pinner.pin(EntityKind::PriceList);
        let local_fields = PriceListFields {
            name: list.name.clone(),
            account: account.local_id.clone(),
            currency: list.currency.clone(),
            description: list.description.clone(),
        }
        .to_fields();
        let payload = self.remote_payload(
            &pinned,
            serde_json::json!({
                "name": list.name,
                "account": account.external_id,
                "currency": list.currency,
                "description": list.description,
            }),
        );
        let input = serde_json::to_value(list).unwrap_or(Value::Null);

        self.create_synced(
            credential,
            StepSpec::create(EntityKind::PriceList, input, pinned, payload, local_fields),
        )
        .await
    }
}
