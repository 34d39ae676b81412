//! WebSocket client for long-running gateway agent containers.
//!
//! Unlike the teacher's own `agentor-gateway` crate (an inbound WS
//! *server*), this is a WS *client*: one physical connection multiplexes
//! many logical runs, demultiplexed by `session_key`, the way
//! `tokio-tungstenite` is already used client-side in the teacher's own
//! `agentor-gateway` integration tests.

/// Outbound wire frames (`run`/`configure`/`cancel`).
pub mod wire;
/// `GatewayClient` itself.
pub mod client;

pub use client::{GatewayClient, GatewayClientConfig};
pub use wire::OutboundFrame;
