use thiserror::Error;

/// A convenience `Result` alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for the sandboxed agent execution core.
///
/// Each variant corresponds to one row of the error taxonomy: it names when
/// the error fires, whether the core retries it, and how it is surfaced.
/// See `SPEC_FULL.md` §7 for the authoritative table.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Schema or validation failure on an inbound request. Not retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The per-run proxy container never became healthy within the startup
    /// timeout. Not retried inside `Acquire`.
    #[error("proxy failed to start: {0}")]
    ProxyStartFailed(String),

    /// A second `Acquire` observed a stale instance for a `run_id` that
    /// could not be health-checked in time.
    #[error("duplicate run: a stale proxy instance exists for run {run_id}")]
    DuplicateRun {
        /// The run whose proxy instance already existed.
        run_id: String,
    },

    /// Image, network-attach, or mount problem at container start.
    #[error("sandbox failed to start: {0}")]
    SandboxStartFailed(String),

    /// `maxRuntimeSec` was exceeded; the container was killed.
    #[error("sandbox timed out after {elapsed_secs}s")]
    SandboxTimeout {
        /// Wall-clock seconds elapsed before the kill.
        elapsed_secs: u64,
    },

    /// The agent program exited with a non-zero status.
    #[error("sandbox exited with code {exit_code}: {stderr}")]
    SandboxNonZeroExit {
        /// The process exit code (always > 0 for this variant).
        exit_code: i64,
        /// Captured standard error, attached for the caller's terminal error event.
        stderr: String,
    },

    /// Stdout could not be parsed as a `SandboxProgramContract`.
    #[error("invalid sandbox output envelope: {0}")]
    InvalidEnvelope(String),

    /// The gateway container's WebSocket endpoint is unreachable.
    #[error("gateway unavailable after {attempts} attempt(s): {message}")]
    GatewayUnavailable {
        /// Number of connection attempts made before giving up.
        attempts: u32,
        /// Underlying transport error message.
        message: String,
    },

    /// The caller cancelled the run's outbound stream.
    #[error("run cancelled")]
    Cancelled,

    /// The billing ingest endpoint's bearer token did not match.
    #[error("ingest authentication failed")]
    AuthFailed,

    /// A transient database error (connection, lock, etc.); the upstream
    /// callback's own retry policy is expected to redeliver.
    #[error("transient database error: {0}")]
    TransientDb(String),

    /// A JSON serialization or deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Docker/container engine client.
    #[error("container engine error: {0}")]
    Container(#[from] bollard::errors::Error),

    /// An error from the database client.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error from the gateway WebSocket transport.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The taxonomy row a [`CoreError`] belongs to, used by `sandcore-server` to
/// pick an HTTP status code and a `RunEvent::Error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `invalid_request`
    InvalidRequest,
    /// `proxy_start_failed`
    ProxyStartFailed,
    /// `sandbox_start_failed`
    SandboxStartFailed,
    /// `sandbox_timeout`
    SandboxTimeout,
    /// `sandbox_nonzero_exit`
    SandboxNonzeroExit,
    /// `invalid_envelope`
    InvalidEnvelope,
    /// `gateway_unavailable`
    GatewayUnavailable,
    /// `cancelled`
    Cancelled,
    /// `auth_failed`
    AuthFailed,
    /// `transient_db_error`
    TransientDbError,
    /// A lower-level infrastructure error not named in the taxonomy.
    Internal,
}

impl ErrorKind {
    /// The wire string used in `RunEvent::Error.code` and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ProxyStartFailed => "proxy_start_failed",
            ErrorKind::SandboxStartFailed => "sandbox_start_failed",
            ErrorKind::SandboxTimeout => "sandbox_timeout",
            ErrorKind::SandboxNonzeroExit => "sandbox_nonzero_exit",
            ErrorKind::InvalidEnvelope => "invalid_envelope",
            ErrorKind::GatewayUnavailable => "gateway_unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::TransientDbError => "transient_db_error",
            ErrorKind::Internal => "internal",
        }
    }
}

impl CoreError {
    /// Classify this error into its taxonomy row.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CoreError::ProxyStartFailed(_) => ErrorKind::ProxyStartFailed,
            CoreError::DuplicateRun { .. } => ErrorKind::ProxyStartFailed,
            CoreError::SandboxStartFailed(_) => ErrorKind::SandboxStartFailed,
            CoreError::SandboxTimeout { .. } => ErrorKind::SandboxTimeout,
            CoreError::SandboxNonZeroExit { .. } => ErrorKind::SandboxNonzeroExit,
            CoreError::InvalidEnvelope(_) => ErrorKind::InvalidEnvelope,
            CoreError::GatewayUnavailable { .. } => ErrorKind::GatewayUnavailable,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::AuthFailed => ErrorKind::AuthFailed,
            CoreError::TransientDb(_) => ErrorKind::TransientDbError,
            CoreError::Database(_) => ErrorKind::TransientDbError,
            CoreError::Json(_) | CoreError::Io(_) | CoreError::Container(_) | CoreError::WebSocket(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_sandbox_timeout() {
        let err = CoreError::SandboxTimeout { elapsed_secs: 30 };
        assert_eq!(err.kind().as_str(), "sandbox_timeout");
    }

    #[test]
    fn kind_maps_duplicate_run_to_proxy_start_failed() {
        let err = CoreError::DuplicateRun {
            run_id: "r1".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ProxyStartFailed);
    }

    #[test]
    fn display_includes_stderr_for_nonzero_exit() {
        let err = CoreError::SandboxNonZeroExit {
            exit_code: 7,
            stderr: "boom".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("boom"));
    }
}
