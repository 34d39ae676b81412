use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outbound lifecycle event stream produced by `GraphProvider`.
///
/// For any single run: `Accepted` is emitted exactly once and first;
/// exactly one of `Final`/`Error` terminates the stream; `UsageReport`
/// events may arrive after `Final` (billing delivery is independent of
/// content delivery — see the open question in `SPEC_FULL.md` §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run has been accepted and is executing.
    Accepted {
        /// Echoes the run's identifier.
        run_id: String,
    },
    /// An incremental chunk of assistant text.
    TextDelta {
        /// Echoes the run's identifier.
        run_id: String,
        /// The text chunk.
        text: String,
    },
    /// The run completed successfully; terminal.
    Final {
        /// Echoes the run's identifier.
        run_id: String,
        /// The full combined output text.
        text: String,
    },
    /// One billable LLM call observed for this run.
    UsageReport {
        /// Echoes the run's identifier.
        run_id: String,
        /// The upstream LLM's call identifier.
        litellm_call_id: String,
        /// Authoritative cost in USD for this call.
        cost_usd: Decimal,
        /// The model that served this call, if known.
        model: Option<String>,
        /// The graph that produced this call.
        graph_id: String,
    },
    /// The run failed; terminal.
    Error {
        /// Echoes the run's identifier.
        run_id: String,
        /// Human-readable error message.
        message: String,
        /// Taxonomy code, when the failure maps to a known `ErrorKind`.
        code: Option<String>,
    },
}

impl RunEvent {
    /// The `run_id` every variant carries.
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::Accepted { run_id }
            | RunEvent::TextDelta { run_id, .. }
            | RunEvent::Final { run_id, .. }
            | RunEvent::UsageReport { run_id, .. }
            | RunEvent::Error { run_id, .. } => run_id,
        }
    }

    /// Whether this variant terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Final { .. } | RunEvent::Error { .. })
    }
}

/// Tagged union produced by `GatewayClient`, strictly ordered per session:
/// `Accepted` → `TextDelta`* → exactly one of `ChatFinal`/`ChatError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayAgentEvent {
    /// The gateway accepted the run and assigned it a `run_id`.
    Accepted {
        /// The session this event belongs to.
        session_key: String,
        /// The gateway-assigned run identifier.
        run_id: String,
    },
    /// An incremental chunk of assistant text.
    TextDelta {
        /// The session this event belongs to.
        session_key: String,
        /// The text chunk.
        text: String,
    },
    /// The chat completed successfully; terminal for this session's run.
    ChatFinal {
        /// The session this event belongs to.
        session_key: String,
        /// The full assistant response text.
        text: String,
    },
    /// The chat failed; terminal for this session's run.
    ChatError {
        /// The session this event belongs to.
        session_key: String,
        /// Human-readable error message.
        message: String,
    },
}

impl GatewayAgentEvent {
    /// The `session_key` every variant carries — the WS_EVENT_CAUSALITY demux key.
    pub fn session_key(&self) -> &str {
        match self {
            GatewayAgentEvent::Accepted { session_key, .. }
            | GatewayAgentEvent::TextDelta { session_key, .. }
            | GatewayAgentEvent::ChatFinal { session_key, .. }
            | GatewayAgentEvent::ChatError { session_key, .. } => session_key,
        }
    }

    /// Whether this variant terminates the logical run on its session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayAgentEvent::ChatFinal { .. } | GatewayAgentEvent::ChatError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_event_terminal_classification() {
        assert!(!RunEvent::Accepted {
            run_id: "r1".into()
        }
        .is_terminal());
        assert!(RunEvent::Final {
            run_id: "r1".into(),
            text: "hi".into()
        }
        .is_terminal());
        assert!(RunEvent::Error {
            run_id: "r1".into(),
            message: "oops".into(),
            code: None
        }
        .is_terminal());
    }

    #[test]
    fn gateway_event_session_key_accessor() {
        let ev = GatewayAgentEvent::TextDelta {
            session_key: "s1".into(),
            text: "chunk".into(),
        };
        assert_eq!(ev.session_key(), "s1");
        assert!(!ev.is_terminal());
    }

    #[test]
    fn run_event_serializes_with_type_tag() {
        let ev = RunEvent::UsageReport {
            run_id: "r1".into(),
            litellm_call_id: "c-1".into(),
            cost_usd: Decimal::new(3, 3),
            model: Some("test-model".into()),
            graph_id: "sandbox:agent".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "usage_report");
        assert_eq!(json["litellm_call_id"], "c-1");
    }
}
