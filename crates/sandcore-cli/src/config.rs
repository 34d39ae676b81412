//! TOML configuration, loaded the way the teacher's `agentor-cli` loads
//! `agentor.toml`, with `SANDCORE_`-prefixed environment variables
//! overriding select fields — secrets never live in the TOML file itself.

use sandcore_core::identity::Limits;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub docker: DockerConfig,
    pub upstream: UpstreamConfig,
    pub gateway: GatewayConfig,
    pub billing: BillingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DockerConfig {
    pub proxy_image: String,
    pub sandbox_image: String,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    pub llm_url: String,
    /// Path to a file holding the master key. Overridden by `SANDCORE_MASTER_KEY`
    /// when set, which takes precedence so the secret never has to be
    /// committed even as a file path default.
    #[serde(default)]
    pub master_key_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    #[serde(default)]
    pub model_default: Option<String>,
    #[serde(default = "default_gateway_run_timeout_sec")]
    pub run_timeout_sec: u64,
}

fn default_gateway_run_timeout_sec() -> u64 {
    120
}

#[derive(Debug, Deserialize)]
pub struct BillingConfig {
    /// Overridden by `SANDCORE_DATABASE_URL` when set.
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_runtime_sec")]
    pub max_runtime_sec: u32,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_runtime_sec: default_max_runtime_sec(),
            max_memory_mb: default_max_memory_mb(),
        }
    }
}

fn default_max_runtime_sec() -> u32 {
    300
}

fn default_max_memory_mb() -> u32 {
    1024
}

impl LimitsConfig {
    pub fn as_ceiling(&self) -> Limits {
        Limits {
            max_runtime_sec: self.max_runtime_sec,
            max_memory_mb: self.max_memory_mb,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub workspace_base_dir: PathBuf,
    pub proxy_base_dir: PathBuf,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Docker network mode the proxy container runs on. Must have egress to
    /// `upstream.llm_url`; the sandbox container remains fully isolated
    /// regardless of this setting.
    #[serde(default = "default_proxy_network_mode")]
    pub network_mode: String,
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_proxy_network_mode() -> String {
    "bridge".to_string()
}

/// Token-bucket limits for `/internal/billing/ingest`, keyed per
/// `billing_account_id`.
#[derive(Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_max_tokens")]
    pub max_tokens: f64,
    #[serde(default = "default_rate_limit_refill_per_sec")]
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_rate_limit_max_tokens(),
            refill_per_sec: default_rate_limit_refill_per_sec(),
        }
    }
}

fn default_rate_limit_max_tokens() -> f64 {
    20.0
}

fn default_rate_limit_refill_per_sec() -> f64 {
    5.0
}

impl Config {
    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("failed to read config file '{}': {e}", path.display())
        })?;
        let mut config: Config = toml::from_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `SANDCORE_`-prefixed environment overrides. Only the fields a
    /// deployment commonly needs to vary per-environment (and secrets, which
    /// must never be committed to the TOML file at all) are covered.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SANDCORE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Ok(v) = std::env::var("SANDCORE_UPSTREAM_LLM_URL") {
            self.upstream.llm_url = v;
        }
        if let Ok(v) = std::env::var("SANDCORE_GATEWAY_URL") {
            self.gateway.url = v;
        }
        if let Ok(v) = std::env::var("SANDCORE_DATABASE_URL") {
            self.billing.database_url = Some(v);
        }
    }

    /// The upstream LLM master key: `SANDCORE_MASTER_KEY` takes precedence
    /// over `upstream.master_key_file`, which is read from disk if present.
    pub async fn load_master_key(&self) -> anyhow::Result<String> {
        if let Ok(v) = std::env::var("SANDCORE_MASTER_KEY") {
            return Ok(v);
        }
        match &self.upstream.master_key_file {
            Some(path) => Ok(tokio::fs::read_to_string(path).await?.trim().to_string()),
            None => anyhow::bail!(
                "no upstream master key: set SANDCORE_MASTER_KEY or upstream.master_key_file"
            ),
        }
    }

    /// The billing ingest bearer token, always from the environment — never
    /// from the TOML file.
    pub fn load_ingest_token(&self) -> anyhow::Result<String> {
        std::env::var("SANDCORE_INGEST_TOKEN")
            .map_err(|_| anyhow::anyhow!("SANDCORE_INGEST_TOKEN must be set"))
    }

    /// The billing database URL: `SANDCORE_DATABASE_URL` or
    /// `billing.database_url`.
    pub fn database_url(&self) -> anyhow::Result<String> {
        self.billing
            .database_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("database_url not set in config or SANDCORE_DATABASE_URL"))
    }
}
