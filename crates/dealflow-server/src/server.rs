//! Server state and run loop

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use dealflow_core::{Credential, ExternalSystem, LocalStore, Orchestrator};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// State shared by every request handler
#[derive(Clone)]
pub struct DealflowServer {
    /// Configuration
    pub config: ServerConfig,
    orchestrator: Orchestrator,
}

impl DealflowServer {
    /// Create a server over the two stores
    pub fn new(
        config: ServerConfig,
        external: Arc<dyn ExternalSystem>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let orchestrator = Orchestrator::new(external, store, config.orchestrator.clone());
        Self {
            config,
            orchestrator,
        }
    }

    /// The orchestrator the handlers run pipelines on
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Credential for a request: its bearer token, else the configured fallback
    pub fn credential(&self, bearer: Option<&str>) -> ServerResult<Credential> {
        bearer
            .filter(|token| !token.is_empty())
            .map(Credential::bearer)
            .or_else(|| self.config.crm_api_token.clone().map(Credential::bearer))
            .ok_or_else(|| {
                ServerError::Unauthorized("No bearer token and no CRM_API_TOKEN configured".into())
            })
    }

    /// Bind and serve until ctrl-c
    pub async fn run(self) -> ServerResult<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| ServerError::ConfigError(format!("Invalid bind address: {}", e)))?;

        let app = crate::api::build_router(Arc::new(self));
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Dealflow server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Dealflow server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
