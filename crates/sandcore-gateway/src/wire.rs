use std::collections::BTreeMap;

/// Frames sent from the client to the gateway over the shared WebSocket.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Start (or resume) a logical run on `session_key`.
    Run {
        session_key: String,
        message: String,
        outbound_headers: BTreeMap<String, String>,
    },
    /// Pin the model for `session_key` before the next `run`.
    Configure {
        session_key: String,
        model: String,
        outbound_headers: BTreeMap<String, String>,
    },
    /// Abandon `session_key`'s in-flight run without closing the socket.
    Cancel { session_key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_frame_serializes_with_type_tag() {
        let frame = OutboundFrame::Run {
            session_key: "s1".to_string(),
            message: "hello".to_string(),
            outbound_headers: BTreeMap::new(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "run");
        assert_eq!(json["session_key"], "s1");
    }

    #[test]
    fn cancel_frame_carries_only_session_key() {
        let frame = OutboundFrame::Cancel {
            session_key: "s1".to_string(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "cancel");
        assert_eq!(json["session_key"], "s1");
    }
}
