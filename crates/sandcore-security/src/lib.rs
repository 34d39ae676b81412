//! Secret handling and request-hardening primitives for the sandboxed agent
//! execution core.
//!
//! # Main types
//!
//! - [`MasterKey`] — The upstream LLM master key, wrapped so it can never be
//!   logged, displayed, or accidentally copied into a container's environment.
//! - [`IngestToken`] — The billing ingest endpoint's bearer token, compared
//!   in constant time.
//! - [`headers`] — The injected/stripped header rules shared by every proxy path.
//! - [`RateLimiter`] — Token-bucket limiter guarding the ingest endpoint.

/// The `MasterKey` secret wrapper.
pub mod master_key;
/// Injected and stripped header rules.
pub mod headers;
/// Token-bucket rate limiting.
pub mod rate_limit;
/// Constant-time bearer token comparison.
pub mod ingest_token;

pub use ingest_token::IngestToken;
pub use master_key::MasterKey;
pub use rate_limit::RateLimiter;
