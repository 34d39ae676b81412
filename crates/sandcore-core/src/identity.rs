use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of one agent execution, created once at `GraphProvider` entry
/// and threaded — immutable — through every subsystem call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunContext {
    /// Globally unique run identifier.
    pub run_id: Arc<str>,
    /// Monotonic attempt counter for this logical request (retries bump it).
    pub attempt: u32,
    /// Correlates this run with the upstream caller's own request tracing.
    pub ingress_request_id: Arc<str>,
}

impl RunContext {
    /// Build a new `RunContext`.
    pub fn new(
        run_id: impl Into<Arc<str>>,
        attempt: u32,
        ingress_request_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            attempt,
            ingress_request_id: ingress_request_id.into(),
        }
    }

    /// The `sourceReference` composite key used by billing:
    /// `"{run_id}/{attempt}/{litellm_call_id}"`.
    pub fn source_reference(&self, litellm_call_id: &str) -> String {
        format!("{}/{}/{litellm_call_id}", self.run_id, self.attempt)
    }
}

/// Resolved tenant identity. Consumed but never produced by the core — every
/// field here must originate from a prior authentication step, never from
/// data carried on the wire by an untrusted sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    /// The billing account this run's usage is charged against.
    pub billing_account_id: Arc<str>,
    /// The virtual API key used to authorize this run.
    pub virtual_key_id: Arc<str>,
    /// The end user on whose behalf this run executes.
    pub user_id: Arc<str>,
    /// The upstream request id, for cross-system correlation.
    pub request_id: Arc<str>,
    /// The distributed trace id, for cross-system correlation.
    pub trace_id: Arc<str>,
}

/// Caller-supplied resource ceilings for the ephemeral path. Always clamped
/// by `sandcore-server` against configured ceilings before reaching the
/// runner — a caller cannot request unbounded resources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    /// Hard wall-clock kill, in seconds.
    pub max_runtime_sec: u32,
    /// Memory limit, in megabytes.
    pub max_memory_mb: u32,
}

impl Limits {
    /// Clamp caller-requested limits to the given ceilings.
    pub fn clamp_to(self, ceiling: Limits) -> Limits {
        Limits {
            max_runtime_sec: self.max_runtime_sec.min(ceiling.max_runtime_sec),
            max_memory_mb: self.max_memory_mb.min(ceiling.max_memory_mb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_reference_format() {
        let ctx = RunContext::new("r1", 0, "ingress-1");
        assert_eq!(ctx.source_reference("c-1"), "r1/0/c-1");
    }

    #[test]
    fn limits_clamp_never_exceeds_ceiling() {
        let requested = Limits {
            max_runtime_sec: 600,
            max_memory_mb: 4096,
        };
        let ceiling = Limits {
            max_runtime_sec: 120,
            max_memory_mb: 1024,
        };
        let clamped = requested.clamp_to(ceiling);
        assert_eq!(clamped.max_runtime_sec, 120);
        assert_eq!(clamped.max_memory_mb, 1024);
    }

    #[test]
    fn limits_clamp_preserves_smaller_request() {
        let requested = Limits {
            max_runtime_sec: 30,
            max_memory_mb: 256,
        };
        let ceiling = Limits {
            max_runtime_sec: 120,
            max_memory_mb: 1024,
        };
        let clamped = requested.clamp_to(ceiling);
        assert_eq!(clamped.max_runtime_sec, 30);
        assert_eq!(clamped.max_memory_mb, 256);
    }
}
