mod config;

use bollard::Docker;
use clap::Parser;
use config::Config;
use sandcore_billing::BillingIngestor;
use sandcore_gateway::{GatewayClient, GatewayClientConfig};
use sandcore_proxy::{ProxyConfig as ProxyManagerConfig, ProxyManager};
use sandcore_provider::GraphProvider;
use sandcore_provider::provider::ProviderConfig;
use sandcore_sandbox::EphemeralRunner;
use sandcore_security::{IngestToken, MasterKey, RateLimiter};
use sandcore_server::{build_router, AppState};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Sandboxed agent execution core.
#[derive(Parser)]
#[command(name = "sandcore", about = "Sandboxed agent execution core")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "sandcore.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).await?;

    let master_key = Arc::new(MasterKey::new(config.load_master_key().await?));
    let ingest_token = IngestToken::new(config.load_ingest_token()?);
    let database_url = config.database_url()?;

    let docker = Docker::connect_with_local_defaults()?;

    let proxy_manager = Arc::new(ProxyManager::with_client(
        docker.clone(),
        ProxyManagerConfig {
            proxy_image: config.docker.proxy_image.clone(),
            upstream_llm_url: config.upstream.llm_url.clone(),
            base_dir: config.proxy.proxy_base_dir.clone(),
            startup_timeout_secs: config.proxy.startup_timeout_secs,
            network_mode: config.proxy.network_mode.clone(),
        },
    ));

    let runner = Arc::new(EphemeralRunner::with_client(docker.clone()));

    let gateway = Arc::new(GatewayClient::connect(GatewayClientConfig {
        url: config.gateway.url.clone(),
        bearer_token: master_key.clone(),
        ..GatewayClientConfig::default()
    }));

    let provider = Arc::new(GraphProvider::new(
        proxy_manager.clone(),
        runner,
        gateway,
        ProviderConfig {
            workspace_base_dir: config.proxy.workspace_base_dir.clone(),
            sandbox_image: config.docker.sandbox_image.clone(),
            gateway_model_default: config.gateway.model_default.clone(),
            gateway_run_timeout: Duration::from_secs(config.gateway.run_timeout_sec),
            upstream_llm_url: config.upstream.llm_url.clone(),
            master_key,
        },
    ));

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    let billing = Arc::new(BillingIngestor::new(db_pool.clone(), ingest_token));

    // Clean up any proxy containers left behind by an unclean prior exit,
    // then keep sweeping on an interval for as long as the process runs.
    match proxy_manager.sweep().await {
        Ok(removed) if !removed.is_empty() => {
            info!(count = removed.len(), "startup sweep removed orphaned proxies");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "startup sweep failed"),
    }
    proxy_manager
        .clone()
        .spawn_sweeper(Duration::from_secs(config.proxy.sweep_interval_secs));

    let ingest_rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.max_tokens,
        config.rate_limit.refill_per_sec,
    ));

    let state = Arc::new(AppState {
        provider,
        billing,
        ingest_rate_limiter,
        docker,
        db_pool,
        limits_ceiling: config.limits.as_ceiling(),
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "sandcore listening");
    axum::serve(listener, app).await?;

    Ok(())
}
