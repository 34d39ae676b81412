//! Shared types and error taxonomy for the sandboxed agent execution core.
//!
//! This crate has no opinions about containers, proxies, or databases — it
//! defines the vocabulary every other `sandcore-*` crate shares: the
//! identity of a run ([`RunContext`], [`Caller`]), the wire contracts
//! ([`SandboxProgramContract`], [`RunEvent`], [`GatewayAgentEvent`]), and the
//! unified error enum ([`CoreError`]).
//!
//! # Main types
//!
//! - [`CoreError`] / [`CoreResult`] — Unified error enum for all sandcore subsystems.
//! - [`RunContext`] — Identity of one agent execution (`run_id`, `attempt`, `ingress_request_id`).
//! - [`Caller`] — Resolved tenant identity, consumed but never produced by the core.
//! - [`SandboxProgramContract`] — The JSON envelope an ephemeral agent writes to stdout.
//! - [`RunEvent`] — The outbound lifecycle event stream produced by `GraphProvider`.
//! - [`GatewayAgentEvent`] — The tagged union produced by `GatewayClient`.

/// Error taxonomy shared across all sandcore crates.
pub mod error;
/// `RunContext` and `Caller` — the identity carried through one execution.
pub mod identity;
/// The `SandboxProgramContract` envelope and its parsing.
pub mod envelope;
/// `RunEvent`, `GatewayAgentEvent`, and `GatewaySession` wire types.
pub mod events;
/// Billing data model shared between `sandcore-proxy` and `sandcore-billing`.
pub mod billing;

pub use envelope::{Payload, SandboxProgramContract, SandboxProgramMeta};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use events::{GatewayAgentEvent, RunEvent};
pub use identity::{Caller, Limits, RunContext};
