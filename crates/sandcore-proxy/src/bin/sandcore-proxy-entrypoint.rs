//! Entrypoint binary packaged into the proxy container image.
//!
//! Reads its run configuration from the file named by
//! `SANDCORE_PROXY_CONFIG`, then serves [`sandcore_proxy::server`]'s router
//! on the unix socket `ProxyManager` mounted into the container.

use sandcore_security::MasterKey;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Deserialize)]
struct ProxyContainerConfig {
    upstream_llm_url: String,
    master_key: String,
    end_user_id: String,
    spend_logs_metadata: String,
    run_id: String,
    listen_socket: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config_path = std::env::var("SANDCORE_PROXY_CONFIG")
        .expect("SANDCORE_PROXY_CONFIG must name the mounted config file");
    let raw = tokio::fs::read_to_string(&config_path).await?;
    let config: ProxyContainerConfig = serde_json::from_str(&raw)?;

    let audit_path = config
        .listen_socket
        .parent()
        .unwrap_or_else(|| std::path::Path::new("/run/sandcore"))
        .join("audit.jsonl");

    let state = Arc::new(sandcore_proxy::server::ProxyServerState {
        upstream_base: config.upstream_llm_url,
        master_key: MasterKey::new(config.master_key),
        end_user_id: config.end_user_id,
        spend_logs_metadata: config.spend_logs_metadata,
        run_id: config.run_id,
        audit: Arc::new(sandcore_proxy::AuditWriter::new(audit_path)),
        http: reqwest::Client::new(),
    });

    let _ = tokio::fs::remove_file(&config.listen_socket).await;
    let listener = tokio::net::UnixListener::bind(&config.listen_socket)?;
    tracing::info!(socket = %config.listen_socket.display(), "proxy entrypoint listening");

    axum::serve(listener, sandcore_proxy::server::build_router(state)).await?;
    Ok(())
}
