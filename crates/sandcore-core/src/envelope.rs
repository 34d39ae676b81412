use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// The JSON envelope an ephemeral agent program writes to its standard
/// output before exiting. Parsed once, after the container exits.
///
/// Per the design notes, a dynamic JSON envelope becomes a tagged sum type
/// with exhaustive matching at the parse boundary rather than a bag of
/// optional fields: a payload is either [`Payload::Text`] or carries no
/// recognizable content, and `meta.error` distinguishes a clean run from one
/// the agent itself reported as failed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxProgramContract {
    /// Ordered output payloads produced by the agent.
    pub payloads: Vec<Payload>,
    /// Metadata about how the run concluded.
    pub meta: SandboxProgramMeta,
}

/// One output payload emitted by the agent program.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Payload {
    /// The payload's textual content.
    pub text: String,
}

/// Metadata attached to a [`SandboxProgramContract`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxProgramMeta {
    /// Set by the agent program itself when it considers the run to have
    /// failed, even though it still produced a well-formed envelope.
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock duration the agent reports spending on its work.
    #[serde(default)]
    pub duration_ms: u64,
}

impl SandboxProgramContract {
    /// Parse raw stdout bytes as a `SandboxProgramContract`.
    ///
    /// Accepts either a single JSON document or a single line of JSON,
    /// trimming surrounding whitespace first. Any parse failure is mapped to
    /// [`CoreError::InvalidEnvelope`] — the caller is expected to surface
    /// this as `error{code: "invalid_envelope"}` per the wire contract,
    /// never to retry.
    pub fn parse(stdout: &str) -> Result<Self, CoreError> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidEnvelope(
                "stdout was empty, expected a SandboxProgramContract".to_string(),
            ));
        }
        serde_json::from_str(trimmed)
            .map_err(|e| CoreError::InvalidEnvelope(format!("{e}")))
    }

    /// Concatenate all text payloads into the single string a `final`
    /// `RunEvent` carries. Payloads are joined with no separator — the
    /// agent program is responsible for its own formatting.
    pub fn combined_text(&self) -> String {
        self.payloads.iter().map(|p| p.text.as_str()).collect()
    }

    /// Whether the agent itself reported an error in `meta.error`.
    pub fn reported_error(&self) -> Option<&str> {
        self.meta.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_envelope() {
        let raw = r#"{"payloads":[{"text":"hello"}],"meta":{"error":null,"durationMs":42}}"#;
        let envelope = SandboxProgramContract::parse(raw).unwrap();
        assert_eq!(envelope.combined_text(), "hello");
        assert_eq!(envelope.meta.duration_ms, 42);
        assert!(envelope.reported_error().is_none());
    }

    #[test]
    fn parses_multi_payload_envelope_in_order() {
        let raw = r#"{"payloads":[{"text":"foo"},{"text":"bar"}],"meta":{"durationMs":1}}"#;
        let envelope = SandboxProgramContract::parse(raw).unwrap();
        assert_eq!(envelope.combined_text(), "foobar");
    }

    #[test]
    fn surfaces_agent_reported_error() {
        let raw = r#"{"payloads":[],"meta":{"error":"tool_failed","durationMs":5}}"#;
        let envelope = SandboxProgramContract::parse(raw).unwrap();
        assert_eq!(envelope.reported_error(), Some("tool_failed"));
    }

    #[test]
    fn rejects_empty_stdout() {
        let err = SandboxProgramContract::parse("   ").unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid_envelope");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = SandboxProgramContract::parse("not json at all").unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid_envelope");
    }

    #[test]
    fn rejects_missing_required_fields() {
        let raw = r#"{"payloads":[{"text":"hi"}]}"#;
        let err = SandboxProgramContract::parse(raw).unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid_envelope");
    }
}
