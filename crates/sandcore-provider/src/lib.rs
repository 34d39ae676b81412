//! Entry point: accepts a [`request::GraphRunRequest`], selects ephemeral or
//! gateway execution by `graph_id`, and produces the outbound
//! [`sandcore_core::events::RunEvent`] stream.
//!
//! Grounded in the teacher's `Orchestrator::run`
//! (`crates/agentor-orchestrator/src/engine.rs`): acquire a resource, run a
//! worker, translate its output into events, always release — generalized
//! from the teacher's plan/execute/synthesize phases into acquire-proxy /
//! run-sandbox-or-gateway / emit-usage phases.

/// `GraphRunRequest` and the ephemeral-vs-gateway graph id convention.
pub mod request;
/// `GraphProvider` itself.
pub mod provider;

pub use provider::GraphProvider;
pub use request::GraphRunRequest;
