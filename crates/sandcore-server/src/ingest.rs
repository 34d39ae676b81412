use axum::http::HeaderMap;

/// Read the billing account id the upstream LLM echoes back on its ingest
/// callback. Per spec, this value comes from the `x-litellm-end-user-id`
/// header — the same header the proxy injected on the way out — never from
/// the JSON body, so a forged body can't redirect a charge to another tenant.
pub fn billing_account_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-litellm-end-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_billing_account_id_from_end_user_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-litellm-end-user-id", HeaderValue::from_static("b1"));
        assert_eq!(
            billing_account_id_from_headers(&headers),
            Some("b1".to_string())
        );
    }

    #[test]
    fn missing_header_returns_none() {
        let headers = HeaderMap::new();
        assert_eq!(billing_account_id_from_headers(&headers), None);
    }

    #[test]
    fn empty_header_returns_none() {
        let mut headers = HeaderMap::new();
        headers.insert("x-litellm-end-user-id", HeaderValue::from_static(""));
        assert_eq!(billing_account_id_from_headers(&headers), None);
    }
}
