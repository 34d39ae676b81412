use sandcore_security::MasterKey;
use std::path::PathBuf;

/// Static configuration `ProxyManager` needs to launch a proxy instance,
/// independent of any particular run.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// The pre-built proxy container image to launch.
    pub proxy_image: String,
    /// The upstream LLM base URL every proxy instance forwards to.
    pub upstream_llm_url: String,
    /// Directory under which each run gets its own workspace
    /// (`{base}/{run_id}/`) holding the socket, config, and audit log.
    pub base_dir: PathBuf,
    /// How long `Acquire` waits for the `/health` probe before failing.
    pub startup_timeout_secs: u64,
    /// Docker network mode the proxy container runs on. Must have egress to
    /// `upstream_llm_url`. Unlike the sandbox container (always `none`), the
    /// proxy is the one outbound service an isolated run is allowed to
    /// reach.
    pub network_mode: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_image: String::new(),
            upstream_llm_url: String::new(),
            base_dir: PathBuf::new(),
            startup_timeout_secs: 10,
            network_mode: "bridge".to_string(),
        }
    }
}

/// A running per-run HTTP reverse proxy.
///
/// Created on run start, stopped and removed on run end or sweep. At most
/// one live `ProxyInstance` exists per `run_id` at a time — enforced by
/// `ProxyManager`'s live set, not by this type.
#[derive(Debug, Clone)]
pub struct ProxyInstance {
    /// The run this instance belongs to. Unique among live instances.
    pub run_id: String,
    /// Host-visible path of the instance's unix socket.
    pub unix_socket_path: PathBuf,
    /// The upstream LLM URL this instance forwards to.
    pub upstream_llm_url: String,
    /// The upstream master key, injected on every forwarded request.
    /// Never persisted, never logged.
    pub master_key: MasterKey,
    /// Fixed headers this instance injects on every forwarded request
    /// (everything except `authorization`, which is derived from `master_key`).
    pub end_user_id: String,
    /// Pre-serialized `x-litellm-spend-logs-metadata` value.
    pub spend_logs_metadata: String,
    /// The container id backing this instance, once started.
    pub container_id: Option<String>,
    /// Path of this instance's append-only audit log.
    pub audit_log_path: PathBuf,
}

impl ProxyInstance {
    /// The label filter value `Sweep` uses to find containers it owns.
    pub const OWNER_LABEL: &'static str = "sandcore.owner";
    /// The label value `Sweep` filters on.
    pub const OWNER_LABEL_VALUE: &'static str = "core";
    /// The per-run label name `Sweep` reads to recover the owning `run_id`.
    pub const RUN_ID_LABEL: &'static str = "sandcore.run_id";
}
