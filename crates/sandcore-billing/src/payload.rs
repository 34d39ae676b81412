use sandcore_core::error::{CoreError, CoreResult};
use sandcore_security::headers::SpendLogsMetadata;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Token usage as reported by the upstream LLM's billing callback.
#[derive(Debug, Clone, Deserialize)]
pub struct UsagePayload {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
}

/// The LLM-native callback body posted to `/internal/billing/ingest`.
///
/// `billing_account_id` is deliberately absent here — it arrives on the
/// `x-litellm-end-user-id` header the upstream LLM echoes back, not in the
/// JSON body, so it is threaded into [`crate::BillingIngestor::ingest`] as a
/// separate argument rather than deserialized.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestPayload {
    pub litellm_call_id: String,
    pub response_cost: Option<Decimal>,
    pub model: String,
    #[serde(default)]
    pub usage: UsagePayload,
    #[serde(default)]
    pub latency_ms: i64,
    pub spend_logs_metadata: SpendLogsMetadata,
}

impl IngestPayload {
    /// `RECEIPT_WRITES_REQUIRE_CALL_ID_AND_COST`: both fields are required,
    /// and the cost must be a real, positive charge.
    pub fn validate(&self) -> CoreResult<Decimal> {
        if self.litellm_call_id.trim().is_empty() {
            return Err(CoreError::InvalidRequest(
                "litellm_call_id must be non-empty".to_string(),
            ));
        }
        match self.response_cost {
            Some(cost) if cost > Decimal::ZERO => Ok(cost),
            Some(_) => Err(CoreError::InvalidRequest(
                "response_cost must be > 0".to_string(),
            )),
            None => Err(CoreError::InvalidRequest(
                "response_cost is required".to_string(),
            )),
        }
    }

    /// `"{run_id}/{attempt}/{litellm_call_id}"`, the idempotency key.
    pub fn source_reference(&self) -> String {
        format!(
            "{}/{}/{}",
            self.spend_logs_metadata.run_id,
            self.spend_logs_metadata.attempt,
            self.litellm_call_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(response_cost: Option<&str>, litellm_call_id: &str) -> IngestPayload {
        IngestPayload {
            litellm_call_id: litellm_call_id.to_string(),
            response_cost: response_cost.map(|v| v.parse().unwrap()),
            model: "gpt-4o".to_string(),
            usage: UsagePayload {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
            latency_ms: 120,
            spend_logs_metadata: SpendLogsMetadata {
                run_id: "r1".to_string(),
                attempt: 0,
                graph_id: "sandbox:agent".to_string(),
            },
        }
    }

    #[test]
    fn validates_positive_cost_and_nonempty_call_id() {
        let p = payload(Some("0.003"), "c-1");
        assert_eq!(p.validate().unwrap().to_string(), "0.003");
    }

    #[test]
    fn rejects_missing_cost() {
        let p = payload(None, "c-1");
        let err = p.validate().unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid_request");
    }

    #[test]
    fn rejects_zero_cost() {
        let p = payload(Some("0"), "c-1");
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_empty_call_id() {
        let p = payload(Some("0.01"), "");
        assert!(p.validate().is_err());
    }

    #[test]
    fn source_reference_composes_run_attempt_and_call_id() {
        let p = payload(Some("0.01"), "c-1");
        assert_eq!(p.source_reference(), "r1/0/c-1");
    }
}
