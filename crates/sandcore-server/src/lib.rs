//! The core's HTTP surface: `POST /v1/runs` (SSE `RunEvent` stream),
//! `POST /internal/billing/ingest`, and `/healthz`/`/readyz`.
//!
//! Everything here is a thin axum layer over [`sandcore_provider::GraphProvider`]
//! and [`sandcore_billing::BillingIngestor`] — no business logic lives in this
//! crate beyond request/response translation, limit clamping, and the
//! billing-account-id header extraction the ingest endpoint needs.

/// `AppState` and `build_router`.
pub mod server;
/// Header extraction helpers for the billing ingest endpoint.
pub mod ingest;

pub use server::{build_router, AppState};
