use secrecy::{ExposeSecret, SecretString};

/// The upstream LLM's signed master key.
///
/// Never implements `Debug`/`Display`; the only way to read the underlying
/// bytes is [`MasterKey::expose`], whose call sites are exactly the two
/// places this secret is allowed to flow to: the proxy's outbound
/// `Authorization` header, and nowhere else. In particular it must never be
/// passed to container environment assembly — `sandcore-sandbox`'s env
/// builder takes this type by reference only to assert (in tests) that its
/// value never appears in the env list it produces.
#[derive(Clone)]
pub struct MasterKey(SecretString);

impl MasterKey {
    /// Wrap a raw secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the raw secret bytes. Call sites are intentionally rare and
    /// should be grep-able.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Render the `Authorization: Bearer {master_key}` header value.
    pub fn bearer_header_value(&self) -> String {
        format!("Bearer {}", self.expose())
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_never_contains_the_secret() {
        let key = MasterKey::new("sk-super-secret-value");
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("sk-super-secret-value"));
        assert_eq!(rendered, "MasterKey(<redacted>)");
    }

    #[test]
    fn bearer_header_value_wraps_the_secret() {
        let key = MasterKey::new("abc123");
        assert_eq!(key.bearer_header_value(), "Bearer abc123");
    }
}
