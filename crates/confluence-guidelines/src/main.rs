mod config;
mod error;
mod inject;
mod loader;
mod model;
mod server;
mod store;
mod text;
mod views;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

use confluence_client::confluence::{ConfluenceClient, ConfluenceConfig};

use config::Config;
use inject::ContextEnricher;
use server::GuidelinesServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr (stdout is reserved for MCP JSON-RPC)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting confluence-guidelines MCP server");

    let config = Config::from_env()?;
    info!(
        base_url = %config.base_url,
        root_page_id = %config.root_page_id,
        tcp = config.tcp_listen_addr.is_some(),
        "configuration loaded"
    );

    let confluence_config = ConfluenceConfig::from_env(config.base_url.clone());
    info!(
        timeout_ms = confluence_config.default_timeout.as_millis(),
        max_retries = confluence_config.max_retries,
        authenticated = confluence_config.api_token.is_some(),
        "confluence client configured"
    );
    let client = Arc::new(ConfluenceClient::new(confluence_config)?);

    // One-shot corpus load. A root fetch failure is fatal; partial child
    // failures have already been logged and skipped by the loader.
    let initial = loader::load(client.as_ref(), &config.root_page_id).await?;
    let store = Arc::new(RwLock::new(initial));

    let server = GuidelinesServer::new(Arc::clone(&store), Arc::clone(&client), config.clone());
    let enriched = ContextEnricher::new(server, Arc::clone(&store));

    if let Some(addr) = config.tcp_listen_addr {
        let listener = TcpListener::bind(&addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let enriched = enriched.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = enriched.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = enriched.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
