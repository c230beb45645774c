//! Workflow results
//!
//! Every pipeline returns a [`WorkflowResult`]: an overall outcome, one
//! [`ItemResult`] per fan-out input in input order, and a pipeline-specific
//! report of the single-entity steps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;
use crate::types::{ExternalId, LocalId, SyncRef};

/// Overall outcome of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every step succeeded
    Success,
    /// Something was written remotely but at least one step failed
    PartialFailure,
    /// A mandatory step failed before anything was written remotely
    HardFailure,
}

/// Result of one fan-out item or cleanup step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    /// The input that produced this result
    pub input: Value,
    /// Whether the item fully succeeded
    pub success: bool,
    /// External id of the entity, when the remote write happened
    pub remote_ref: Option<ExternalId>,
    /// Local id of the entity, when the local write happened
    pub local_ref: Option<LocalId>,
    /// Classified failure
    pub error: Option<StepError>,
    /// Other entities written on behalf of this item
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<SyncRef>,
}

impl ItemResult {
    /// Successful item
    pub fn succeeded(input: Value, remote_ref: Option<ExternalId>, local_ref: Option<LocalId>) -> Self {
        Self {
            input,
            success: true,
            remote_ref,
            local_ref,
            error: None,
            related: Vec::new(),
        }
    }

    /// Failed item; a remote id carried by the error is surfaced as the remote ref
    pub fn failed(input: Value, error: StepError) -> Self {
        Self {
            input,
            success: false,
            remote_ref: error.remote_ref().cloned(),
            local_ref: None,
            error: Some(error),
            related: Vec::new(),
        }
    }

    /// Attach entities written on behalf of this item
    pub fn with_related(mut self, related: Vec<SyncRef>) -> Self {
        self.related = related;
        self
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Overall outcome
    pub outcome: Outcome,
    /// Per-item results, one per fan-out input, in input order
    pub items: Vec<ItemResult>,
    /// Cause of a hard failure, or the first failure of a partial one
    pub error: Option<StepError>,
    /// Pipeline-specific report
    pub report: PipelineReport,
}

impl WorkflowResult {
    /// A mandatory step failed
    pub fn hard_failure(report: impl Into<PipelineReport>, error: StepError) -> Self {
        Self {
            outcome: Outcome::HardFailure,
            items: Vec::new(),
            error: Some(error),
            report: report.into(),
        }
    }

    /// A mandatory step failed after the run had already written remotely
    ///
    /// The remote records exist, so the run is partial and carries no items;
    /// the report holds the references written so far.
    pub fn aborted(report: impl Into<PipelineReport>, error: StepError) -> Self {
        Self {
            outcome: Outcome::PartialFailure,
            items: Vec::new(),
            error: Some(error),
            report: report.into(),
        }
    }

    /// A mandatory step failed; hard only when nothing was written remotely
    ///
    /// A `LocalPersistenceFailed` error is itself a remote write, whatever
    /// `wrote_remote` says.
    pub fn stopped(report: impl Into<PipelineReport>, error: StepError, wrote_remote: bool) -> Self {
        if wrote_remote || error.remote_ref().is_some() {
            Self::aborted(report, error)
        } else {
            Self::hard_failure(report, error)
        }
    }

    /// The pipeline ran to completion; any headline error makes it partial
    pub fn completed(
        report: impl Into<PipelineReport>,
        items: Vec<ItemResult>,
        headline: Option<StepError>,
    ) -> Self {
        let outcome = if headline.is_some() {
            Outcome::PartialFailure
        } else {
            Outcome::Success
        };
        Self {
            outcome,
            items,
            error: headline,
            report: report.into(),
        }
    }

    /// Whether the run fully succeeded
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Items that failed
    pub fn failed_items(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|item| !item.success)
    }
}

/// Pipeline-specific part of a workflow result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pipeline", rename_all = "snake_case")]
pub enum PipelineReport {
    /// Opportunity creation with pricing
    Creation(CreationReport),
    /// Pricing replacement
    Replacement(ReplacementReport),
    /// Quote generation
    Quote(QuoteReport),
}

impl PipelineReport {
    /// The creation report, if this is one
    pub fn as_creation(&self) -> Option<&CreationReport> {
        match self {
            PipelineReport::Creation(report) => Some(report),
            _ => None,
        }
    }

    /// The replacement report, if this is one
    pub fn as_replacement(&self) -> Option<&ReplacementReport> {
        match self {
            PipelineReport::Replacement(report) => Some(report),
            _ => None,
        }
    }

    /// The quote report, if this is one
    pub fn as_quote(&self) -> Option<&QuoteReport> {
        match self {
            PipelineReport::Quote(report) => Some(report),
            _ => None,
        }
    }
}

/// Single-entity steps of the creation pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreationReport {
    /// The opportunity, once created or reused
    pub opportunity: Option<SyncRef>,
    /// The price list, once created or resolved
    pub price_list: Option<SyncRef>,
    /// Whether the price list already existed
    pub price_list_reused: bool,
}

/// Single-entity steps of the replacement pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplacementReport {
    /// The repriced opportunity
    pub opportunity: Option<SyncRef>,
    /// The price list the opportunity pointed at before the run
    pub previous_price_list: Option<LocalId>,
    /// The new price list
    pub price_list: Option<SyncRef>,
    /// One result per old line item deleted, in load order
    pub line_item_deletions: Vec<ItemResult>,
    /// Deletion of the old price list, if there was one
    pub price_list_deletion: Option<ItemResult>,
    /// Repointing of the opportunity at the new list
    pub opportunity_update: Option<ItemResult>,
}

/// Steps of the quote pipeline, with lines split by failure class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteReport {
    /// External id of the computed quote
    pub remote_quote: Option<ExternalId>,
    /// The persisted quote
    pub quote: Option<SyncRef>,
    /// Lines persisted locally
    pub created: Vec<ItemResult>,
    /// Lines whose references could not be resolved
    pub validation_errors: Vec<ItemResult>,
    /// Lines whose local write failed
    pub creation_errors: Vec<ItemResult>,
}

impl From<CreationReport> for PipelineReport {
    fn from(report: CreationReport) -> Self {
        PipelineReport::Creation(report)
    }
}

impl From<ReplacementReport> for PipelineReport {
    fn from(report: ReplacementReport) -> Self {
        PipelineReport::Replacement(report)
    }
}

impl From<QuoteReport> for PipelineReport {
    fn from(report: QuoteReport) -> Self {
        PipelineReport::Quote(report)
    }
}
