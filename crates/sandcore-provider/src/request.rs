use sandcore_core::identity::{Caller, Limits};
use serde::Deserialize;

/// One inbound request to run a graph, either as a one-shot sandboxed
/// program or as a turn against a long-running gateway session.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphRunRequest {
    pub run_id: String,
    pub attempt: u32,
    /// Selects the execution path: graph ids starting with `sandbox:` run
    /// ephemeral; anything else runs against the gateway.
    pub graph_id: String,
    pub model: Option<String>,
    pub message: Option<String>,
    pub caller: Caller,
    /// Only enforced on the ephemeral path.
    pub limits: Limits,
}

impl GraphRunRequest {
    /// Ephemeral graphs are conventionally named `sandbox:{agent}`;
    /// everything else is routed to the gateway.
    pub fn is_ephemeral(&self) -> bool {
        self.graph_id.starts_with("sandbox:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> Caller {
        Caller {
            billing_account_id: "b1".into(),
            virtual_key_id: "vk1".into(),
            user_id: "u1".into(),
            request_id: "req1".into(),
            trace_id: "trace1".into(),
        }
    }

    #[test]
    fn sandbox_prefixed_graph_id_is_ephemeral() {
        let req = GraphRunRequest {
            run_id: "r1".into(),
            attempt: 0,
            graph_id: "sandbox:agent".into(),
            model: None,
            message: None,
            caller: caller(),
            limits: Limits {
                max_runtime_sec: 30,
                max_memory_mb: 256,
            },
        };
        assert!(req.is_ephemeral());
    }

    #[test]
    fn other_graph_id_routes_to_gateway() {
        let req = GraphRunRequest {
            run_id: "r1".into(),
            attempt: 0,
            graph_id: "gateway:chat".into(),
            model: None,
            message: None,
            caller: caller(),
            limits: Limits {
                max_runtime_sec: 30,
                max_memory_mb: 256,
            },
        };
        assert!(!req.is_ephemeral());
    }
}
