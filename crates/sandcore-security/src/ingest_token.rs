use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// The billing ingest endpoint's expected bearer token.
///
/// Comparison happens in constant time so that timing differences cannot
/// be used to recover the token byte-by-byte.
#[derive(Clone)]
pub struct IngestToken(SecretString);

impl IngestToken {
    /// Wrap the configured token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Compare a bearer token presented on an inbound request against this
    /// token. Length differences are not constant-time (comparing to a
    /// mismatched-length buffer short-circuits), which leaks only the
    /// token's length — never its content.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.expose_secret().as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected.ct_eq(presented).into()
    }
}

impl std::fmt::Debug for IngestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IngestToken(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_identical_token() {
        let token = IngestToken::new("ingest-secret");
        assert!(token.matches("ingest-secret"));
    }

    #[test]
    fn rejects_mismatched_token() {
        let token = IngestToken::new("ingest-secret");
        assert!(!token.matches("wrong-value"));
    }

    #[test]
    fn rejects_different_length_token() {
        let token = IngestToken::new("ingest-secret");
        assert!(!token.matches("short"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = IngestToken::new("ingest-secret");
        assert_eq!(format!("{token:?}"), "IngestToken(<redacted>)");
    }
}
