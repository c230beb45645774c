use anyhow::{Context, Result};
use dealflow_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load().context("Failed to load configuration")?;

    dealflow_server::run(config).await.context("Server error")?;

    Ok(())
}
