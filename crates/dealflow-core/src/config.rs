use serde::{Deserialize, Serialize};

/// Tunables of the workflow orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum outstanding steps of a concurrent fan-out; 0 means unbounded
    #[serde(default = "default_fan_out_concurrency")]
    pub fan_out_concurrency: usize,

    /// Remote payload field holding the pinned local id
    #[serde(default = "default_correlation_field")]
    pub correlation_field: String,

    /// Lifecycle status given to newly created offering prices
    #[serde(default = "default_price_status")]
    pub price_status: String,

    /// Remote action that computes a quote from an opportunity
    #[serde(default = "default_quote_action")]
    pub quote_action: String,
}

fn default_fan_out_concurrency() -> usize {
    8
}

fn default_correlation_field() -> String {
    "external_id".to_string()
}

fn default_price_status() -> String {
    "Active".to_string()
}

fn default_quote_action() -> String {
    "generate_quote".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fan_out_concurrency: default_fan_out_concurrency(),
            correlation_field: default_correlation_field(),
            price_status: default_price_status(),
            quote_action: default_quote_action(),
        }
    }
}
