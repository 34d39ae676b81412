use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One entry read from a `ProxyInstance`'s per-run audit log: the cost and
/// call identifier copied from an upstream LLM response by the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// `x-litellm-call-id` observed on the LLM response.
    pub litellm_call_id: String,
    /// `x-litellm-response-cost` observed on the LLM response.
    pub cost_usd: Decimal,
    /// When the proxy observed and recorded this response.
    pub timestamp: DateTime<Utc>,
}

/// One row of the `charge_receipts` relation (see `SPEC_FULL.md` §6.7).
///
/// Uniqueness on `(billing_account_id, source_reference)` is what makes
/// repeated ingest deliveries idempotent — this struct only models the
/// shape; the uniqueness is enforced by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChargeReceipt {
    /// Generated primary key.
    pub id: uuid::Uuid,
    /// The run this charge belongs to.
    pub run_id: String,
    /// The attempt within that run.
    pub attempt: i32,
    /// The tenant charged.
    pub billing_account_id: String,
    /// Always `"litellm"` for receipts this core writes.
    pub source_system: String,
    /// `"{run_id}/{attempt}/{litellm_call_id}"`.
    pub source_reference: String,
    /// The upstream LLM's call identifier.
    pub litellm_call_id: String,
    /// Authoritative cost in USD; always `> 0` for a receipt this core writes.
    pub response_cost_usd: Decimal,
    /// `response_cost_usd` converted to integer credits.
    pub charged_credits: i64,
    /// Always `"llm_usage"` for receipts this core writes.
    pub charge_reason: String,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

/// One row of the `llm_charge_details` relation, one-to-one with a
/// [`ChargeReceipt`] via `charge_receipt_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LlmChargeDetails {
    /// Generated primary key.
    pub id: uuid::Uuid,
    /// Foreign key to `charge_receipts.id`.
    pub charge_receipt_id: uuid::Uuid,
    /// The model that served the call.
    pub model: String,
    /// The LLM provider that served the call.
    pub provider: String,
    /// Prompt token count.
    pub tokens_in: i64,
    /// Completion token count.
    pub tokens_out: i64,
    /// Observed latency in milliseconds.
    pub latency_ms: i64,
    /// The graph that produced this call.
    pub graph_id: String,
    /// The upstream LLM's call identifier (`= litellm_call_id`).
    pub provider_call_id: String,
}

/// Fixed integer ratio used to convert authoritative USD cost into charged
/// credits. Decimal arithmetic only — never floating point — to avoid drift
/// across millions of conversions.
pub const CREDITS_PER_USD: i64 = 1_000_000;

/// `chargedCredits = round_half_up(responseCostUsd * CREDITS_PER_USD)`.
///
/// Uses `rust_decimal`'s midpoint-away-from-zero rounding, which matches
/// "round half up" for the non-negative costs this function is defined for.
pub fn usd_to_credits(cost_usd: Decimal) -> i64 {
    use rust_decimal::RoundingStrategy;

    let credits = cost_usd * Decimal::from(CREDITS_PER_USD);
    let rounded = credits.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.try_into().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn converts_simple_cost_to_credits() {
        let cost = Decimal::from_str("0.003").unwrap();
        assert_eq!(usd_to_credits(cost), 3000);
    }

    #[test]
    fn rounds_half_up_at_the_boundary() {
        // 0.0000015 * 1_000_000 = 1.5 -> rounds away from zero to 2.
        let cost = Decimal::from_str("0.0000015").unwrap();
        assert_eq!(usd_to_credits(cost), 2);
    }

    #[test]
    fn rounds_down_below_the_boundary() {
        let cost = Decimal::from_str("0.0000014").unwrap();
        assert_eq!(usd_to_credits(cost), 1);
    }

    #[test]
    fn zero_cost_converts_to_zero_credits() {
        assert_eq!(usd_to_credits(Decimal::ZERO), 0);
    }
}
