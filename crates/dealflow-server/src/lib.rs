//!
//! Dealflow Server - HTTP surface of the Dealflow pipelines
//!
//! Wires the CRM client and the configured local store into an orchestrator
//! and exposes its three pipelines over HTTP.

use std::sync::Arc;

use dealflow_core::{ExternalSystem, LocalStore};
use dealflow_crm::HttpCrmClient;
use dealflow_state_inmemory::InMemoryLocalStore;

/// API module
pub mod api;

/// Server module
pub mod server;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

// Re-export key types
pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::DealflowServer;

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    init_logging(&config);

    let external = create_crm_client(&config)?;
    let store = create_local_store(&config).await?;

    DealflowServer::new(config, external, store).run().await
}

/// Initialize logging
pub fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format {
        LogFormat::Json => fmt().with_env_filter(filter).with_target(true).json().try_init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Create the CRM client
pub fn create_crm_client(config: &ServerConfig) -> ServerResult<Arc<dyn ExternalSystem>> {
    let client = HttpCrmClient::new(config.crm.clone())?;
    tracing::info!(base_url = %config.crm.base_url, "Using CRM");
    Ok(Arc::new(client))
}

/// Create the local store named by the configured URL
pub async fn create_local_store(config: &ServerConfig) -> ServerResult<Arc<dyn LocalStore>> {
    let url = config.local_store_url.as_str();
    if url.starts_with("memory://") {
        tracing::info!("Using in-memory local store");
        return Ok(Arc::new(InMemoryLocalStore::new()));
    }

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        {
            tracing::info!("Using PostgreSQL local store");
            let pg_config = dealflow_state_postgres::PostgresConfig::from_url(url);
            let store = dealflow_state_postgres::connect(&pg_config).await?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err(ServerError::ConfigError(
                "PostgreSQL support is not compiled in".to_string(),
            ));
        }
    }

    Err(ServerError::ConfigError(format!(
        "Unsupported local store URL: {}",
        url
    )))
}
