//!
//! Dealflow Core - cross-system workflow orchestration
//!
//! This crate holds the domain model, the two collaborator ports (the CRM
//! system of record and the local store) and the orchestration built on
//! top of them: reference resolution, correlation pinning, step execution,
//! fan-out aggregation and the three pricing/quoting pipelines.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - entities, ports and workflow results
pub mod domain;

/// Application services - the orchestration components
pub mod application;

/// Identifiers, records and shared value types
pub mod types;

/// Error types
pub mod error;

/// Orchestrator configuration
pub mod config;

// Re-export key types
pub use config::OrchestratorConfig;
pub use error::{RemoteError, StepError, StoreError};
pub use types::{Credential, EntityKind, ExternalId, Fields, LocalId, LocalRecord, Synced, SyncRef};

pub use domain::entities::{
    CreateOpportunityInput, NewPriceList, OfferingRequest, PriceListRequest, ReplacePricingInput,
};
pub use domain::external::{ExternalSystem, RemoteRecord};
pub use domain::repository::{LocalStore, RecordPatch};
pub use domain::result::{
    CreationReport, ItemResult, Outcome, PipelineReport, QuoteReport, ReplacementReport,
    WorkflowResult,
};

pub use application::fan_out::{FanOutAggregator, FanOutMode};
pub use application::orchestrator::Orchestrator;
pub use application::pinner::{CorrelationPinner, PinnedId};
pub use application::resolver::ReferenceResolver;
pub use application::step_executor::{StepExecutor, StepOutput, StepPhase, StepSpec};
