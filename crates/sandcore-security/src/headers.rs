//! The header injection/stripping rules shared by `sandcore-proxy`'s
//! ephemeral path and `sandcore-gateway`'s long-running path — both must
//! inject the same billing/metadata headers and strip the same
//! client-spoofable ones.

use serde::Serialize;

/// `x-litellm-spend-logs-metadata` payload.
///
/// This is the only channel that survives the round trip through the
/// upstream LLM and back into its billing callback, so it carries `attempt`
/// even though nothing else about forwarding a request needs it — billing's
/// `sourceReference` composite key requires it on the way back in.
#[derive(Debug, Clone, Serialize)]
pub struct SpendLogsMetadata {
    /// The run this metadata belongs to.
    pub run_id: String,
    /// The attempt within that run.
    pub attempt: u32,
    /// The graph that produced this run.
    pub graph_id: String,
}

/// The full set of headers injected on every request forwarded to the
/// upstream LLM, minus `authorization` (owned by `MasterKey` and rendered
/// separately so it never needs to be cloned into this struct).
#[derive(Debug, Clone)]
pub struct InjectedHeaders {
    /// `x-litellm-end-user-id`.
    pub end_user_id: String,
    /// `x-litellm-spend-logs-metadata`, pre-serialized.
    pub spend_logs_metadata: String,
    /// `x-cogni-run-id`.
    pub run_id: String,
}

impl InjectedHeaders {
    /// Build the injected header set for one run.
    pub fn new(billing_account_id: &str, run_id: &str, attempt: u32, graph_id: &str) -> Self {
        let metadata = SpendLogsMetadata {
            run_id: run_id.to_string(),
            attempt,
            graph_id: graph_id.to_string(),
        };
        Self {
            end_user_id: billing_account_id.to_string(),
            spend_logs_metadata: serde_json::to_string(&metadata)
                .unwrap_or_else(|_| "{}".to_string()),
            run_id: run_id.to_string(),
        }
    }

    /// `(header name, header value)` pairs ready to attach to an outbound request.
    pub fn as_pairs(&self) -> [(&'static str, String); 3] {
        [
            ("x-litellm-end-user-id", self.end_user_id.clone()),
            (
                "x-litellm-spend-logs-metadata",
                self.spend_logs_metadata.clone(),
            ),
            ("x-cogni-run-id", self.run_id.clone()),
        ]
    }
}

/// Whether an inbound header name must be stripped before forwarding to the
/// upstream LLM — any client-supplied `authorization` or `x-litellm-*` /
/// `x-cogni-*` header, which would otherwise let a caller spoof billing
/// identity.
pub fn must_strip(header_name: &str) -> bool {
    let lower = header_name.to_ascii_lowercase();
    lower == "authorization" || lower.starts_with("x-litellm-") || lower.starts_with("x-cogni-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_authorization_case_insensitively() {
        assert!(must_strip("Authorization"));
        assert!(must_strip("AUTHORIZATION"));
    }

    #[test]
    fn strips_litellm_and_cogni_prefixed_headers() {
        assert!(must_strip("x-litellm-end-user-id"));
        assert!(must_strip("X-LiteLLM-Spend-Logs-Metadata"));
        assert!(must_strip("x-cogni-run-id"));
    }

    #[test]
    fn leaves_unrelated_headers_alone() {
        assert!(!must_strip("content-type"));
        assert!(!must_strip("x-request-id"));
    }

    #[test]
    fn injected_headers_carry_run_and_graph_metadata() {
        let headers = InjectedHeaders::new("b1", "r1", 0, "sandbox:agent");
        let pairs = headers.as_pairs();
        assert_eq!(pairs[0], ("x-litellm-end-user-id", "b1".to_string()));
        assert!(pairs[1].1.contains("\"run_id\":\"r1\""));
        assert!(pairs[1].1.contains("\"graph_id\":\"sandbox:agent\""));
        assert_eq!(pairs[2], ("x-cogni-run-id", "r1".to_string()));
    }
}
