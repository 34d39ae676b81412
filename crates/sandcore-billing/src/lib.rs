//! Ingestion of authenticated upstream LLM billing callbacks into
//! idempotent, tenant-scoped `ChargeReceipt` rows.
//!
//! This crate is the only one in the workspace that writes to Postgres. The
//! upstream LLM, not the in-container agent or the proxy's own audit log, is
//! the trust anchor for cost: this module exists to receive its callback,
//! validate it, and persist it exactly once per `(billing_account_id,
//! source_reference)`.
//!
//! # Main types
//!
//! - [`BillingIngestor`] — Validates and writes one ingest callback under RLS.
//! - [`IngestPayload`] — The LLM-native callback body this endpoint accepts.
//! - [`IngestOutcome`] — Whether the callback inserted a new receipt or was a no-op.

/// The LLM-native callback body and its validation rules.
pub mod payload;
/// `BillingIngestor` and its write algorithm.
pub mod ingestor;

pub use ingestor::{BillingIngestor, IngestOutcome};
pub use payload::{IngestPayload, UsagePayload};
