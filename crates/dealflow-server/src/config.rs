//! Configuration for the Dealflow Server
//!
//! Everything is read from environment variables; unset variables keep
//! their defaults and unparseable ones are reported and ignored.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

use dealflow_core::OrchestratorConfig;
use dealflow_crm::CrmClientConfig;

use crate::error::{ServerError, ServerResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ServerError::ConfigError(format!("Unknown log format: {}", other))),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// CRM client settings
    #[serde(default)]
    pub crm: CrmClientConfig,

    /// Token used when a request carries no bearer token
    #[serde(default, skip_serializing)]
    pub crm_api_token: Option<String>,

    /// `memory://` or a `postgres://` connection string
    #[serde(default = "default_local_store_url")]
    pub local_store_url: String,

    /// Orchestrator tunables
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_local_store_url() -> String {
    "memory://local".to_string()
}

/// Parse a variable into `target`, warning and keeping the old value on failure
fn parse_var<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", name, raw),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        let mut config = Self::default();

        parse_var("SERVER_PORT", &mut config.port);

        if let Ok(host) = env::var("SERVER_HOST") {
            config.bind_address = host;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.log_level = log_level;
        }

        parse_var("LOG_FORMAT", &mut config.log_format);

        if let Ok(base_url) = env::var("CRM_BASE_URL") {
            config.crm.base_url = base_url;
        }

        parse_var("CRM_TIMEOUT_SECS", &mut config.crm.timeout_secs);

        if let Ok(token) = env::var("CRM_API_TOKEN") {
            if !token.is_empty() {
                config.crm_api_token = Some(token);
            }
        }

        if let Ok(url) = env::var("LOCAL_STORE_URL") {
            config.local_store_url = url;
        }

        parse_var(
            "FAN_OUT_CONCURRENCY",
            &mut config.orchestrator.fan_out_concurrency,
        );

        if let Ok(field) = env::var("CORRELATION_FIELD") {
            config.orchestrator.correlation_field = field;
        }

        config.validate()?;

        if config.crm_api_token.is_none() {
            warn!("No CRM_API_TOKEN provided - requests without a bearer token will be rejected");
        }

        info!("Loaded server configuration");
        Ok(config)
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> ServerResult<()> {
        if self.crm.base_url.is_empty() {
            return Err(ServerError::ConfigError("CRM base URL is required".to_string()));
        }
        if !(self.local_store_url.starts_with("memory://")
            || self.local_store_url.starts_with("postgres://")
            || self.local_store_url.starts_with("postgresql://"))
        {
            return Err(ServerError::ConfigError(format!(
                "Unsupported local store URL: {}",
                self.local_store_url
            )));
        }
        if self.orchestrator.correlation_field.is_empty() {
            return Err(ServerError::ConfigError(
                "Correlation field must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            crm: CrmClientConfig::default(),
            crm_api_token: None,
            local_store_url: default_local_store_url(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.local_store_url, "memory://local");
        assert_eq!(config.orchestrator.fan_out_concurrency, 8);
    }

    #[test]
    fn test_unsupported_store_url_is_rejected() {
        let config = ServerConfig {
            local_store_url: "redis://localhost".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::ConfigError(_))));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = ServerConfig {
            crm_api_token: Some("secret".to_string()),
            ..ServerConfig::default()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("crm_api_token").is_none());
    }
}
