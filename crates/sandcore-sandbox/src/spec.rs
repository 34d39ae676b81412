use sandcore_core::identity::Limits;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One additional bind mount beyond the workspace directory.
#[derive(Debug, Clone)]
pub struct Mount {
    /// Host-side path.
    pub host_path: PathBuf,
    /// Path inside the container.
    pub container_path: String,
    /// Mounted `ro` when true, `rw` otherwise.
    pub read_only: bool,
}

/// How (or whether) this run's container reaches its LLM proxy.
#[derive(Debug, Clone)]
pub enum LlmProxyBridge {
    /// No outbound network at all.
    Disabled,
    /// Bridge the host proxy's unix socket to `127.0.0.1:8080` inside the
    /// container via an in-container forwarder; all other network access
    /// remains blocked.
    UnixSocket {
        /// Host-visible path of the proxy's unix socket.
        host_socket_path: PathBuf,
    },
}

/// One `EphemeralRunner::run_once` request.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Correlates this container with its run for logging.
    pub run_id: String,
    /// Pre-built sandbox image; opaque to this crate.
    pub image: String,
    /// Overrides the image's default entrypoint/cmd when set.
    pub command: Option<Vec<String>>,
    /// Host directory bind-mounted read-write at `container_workspace_path`.
    pub workspace_dir: PathBuf,
    /// Container-side path the workspace is mounted at.
    pub container_workspace_path: String,
    /// Additional explicit bind mounts.
    pub extra_mounts: Vec<Mount>,
    /// Explicitly enumerated environment passed into the container. Never
    /// include secrets here — see [`crate::runner::build_env`].
    pub user_env: BTreeMap<String, String>,
    /// Outbound network policy for this run.
    pub llm_proxy: LlmProxyBridge,
    /// Wall-clock and memory ceilings, already clamped by the caller.
    pub limits: Limits,
}
