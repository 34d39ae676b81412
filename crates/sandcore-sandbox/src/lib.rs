//! One-shot, network-isolated container execution.
//!
//! `EphemeralRunner` runs a single untrusted program to completion inside a
//! locked-down container and returns its parsed output contract. The
//! container's only outbound path, when enabled, is a unix-socket bridge to
//! a [`sandcore_proxy::ProxyManager`](../sandcore_proxy/struct.ProxyManager.html)
//! instance running on the host — this crate never talks to the proxy
//! directly, it only bind-mounts the socket `sandcore-provider` hands it.

/// Run request shape and the in-container proxy bridge configuration.
pub mod spec;
/// `SandboxOutcome`, the parsed result of one `run_once` call.
pub mod outcome;
/// `EphemeralRunner` itself.
pub mod runner;

pub use outcome::{SandboxFailure, SandboxOutcome};
pub use runner::EphemeralRunner;
pub use spec::{LlmProxyBridge, Mount, RunSpec};
