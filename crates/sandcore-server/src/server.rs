//! The core's own HTTP surface: run submission, billing ingest, and the
//! liveness/readiness endpoints a real external-dependency-having service
//! needs. Grounded on `sandcore-proxy`'s own `server.rs` (a plain, testable
//! axum `Router` over an injectable `State`) and the teacher's
//! `agentor-gateway/src/server.rs` `AppState`/`build`/`health_handler` shape.

use crate::ingest::billing_account_id_from_headers;
use async_stream::stream;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bollard::Docker;
use futures_util::{Stream, StreamExt};
use sandcore_billing::{BillingIngestor, IngestOutcome, IngestPayload};
use sandcore_core::events::RunEvent;
use sandcore_core::identity::Limits;
use sandcore_provider::{GraphProvider, GraphRunRequest};
use sandcore_security::RateLimiter;
use sqlx::PgPool;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared application state for the core's HTTP surface.
pub struct AppState {
    pub provider: Arc<GraphProvider>,
    pub billing: Arc<BillingIngestor>,
    /// Guards `/internal/billing/ingest` from abusive redelivery storms,
    /// keyed per `billing_account_id`.
    pub ingest_rate_limiter: Arc<RateLimiter>,
    /// Used only by `/readyz` to confirm the container engine is reachable.
    pub docker: Docker,
    /// Used only by `/readyz` to confirm the database is reachable.
    pub db_pool: PgPool,
    /// Ceiling every caller-requested `Limits` is clamped to before a run starts.
    pub limits_ceiling: Limits,
}

/// Build the core's HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/runs", post(submit_run))
        .route("/internal/billing/ingest", post(ingest_billing_callback))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.docker.ping().await {
        warn!(error = %e, "readyz: container engine unreachable");
        return (StatusCode::SERVICE_UNAVAILABLE, "container engine unreachable").into_response();
    }
    if let Err(e) = sqlx::query("SELECT 1").execute(&state.db_pool).await {
        warn!(error = %e, "readyz: database unreachable");
        return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
    }
    StatusCode::OK.into_response()
}

/// Drops `cancel` (signaling the in-flight run to stop) when the SSE body
/// stream is dropped, e.g. because the client disconnected. Per the
/// cancellation contract, the provider still performs teardown and still
/// persists any billing receipt for calls that already completed.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn submit_run(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<GraphRunRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    request.limits = request.limits.clamp_to(state.limits_ceiling);

    info!(run_id = %request.run_id, graph_id = %request.graph_id, "run submitted");

    let cancel = CancellationToken::new();
    let provider = state.provider.clone();
    let run_events = provider.run(request, cancel.clone());

    let body = stream! {
        let _guard = CancelOnDrop(cancel);
        futures_util::pin_mut!(run_events);
        while let Some(event) = run_events.next().await {
            yield Ok::<_, Infallible>(to_sse_event(&event));
        }
    };

    Sse::new(body).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &RunEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

async fn ingest_billing_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IngestPayload>,
) -> Response {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let Some(billing_account_id) = billing_account_id_from_headers(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing x-litellm-end-user-id").into_response();
    };

    if !state.ingest_rate_limiter.check(&billing_account_id).await {
        warn!(%billing_account_id, "billing ingest: rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    match state
        .billing
        .ingest(payload, &billing_account_id, bearer)
        .await
    {
        Ok(IngestOutcome::Inserted { source_reference, .. }) => {
            info!(%source_reference, "billing ingest: receipt written");
            StatusCode::OK.into_response()
        }
        Ok(IngestOutcome::AlreadyIngested { source_reference }) => {
            info!(%source_reference, "billing ingest: idempotent replay");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            let status = match e.kind() {
                sandcore_core::error::ErrorKind::AuthFailed => StatusCode::UNAUTHORIZED,
                sandcore_core::error::ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(error = %e, "billing ingest failed");
            (status, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_returns_200() {
        let app = Router::new().route("/healthz", get(healthz));
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
