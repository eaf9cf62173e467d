//! Aggregation endpoint
//!
//! Stateless HTTP service computing one batch summary per request:
//!
//! - `POST /api/analyze` with a non-empty JSON array of events → `200` and a
//!   [`WireSummary`]
//! - body that is not a non-empty JSON array, or has no valid event → `400`
//! - any other method → `405`
//! - fault while computing the summary → `500`
//!
//! Error bodies are `{"error": "<message>"}`.

use crate::analyzer::analyze;
use crate::error::AnalysisError;
use crate::models::{BatchSummary, ListeningEvent};
use crate::wire::{ErrorBody, WireSummary};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub const ANALYZE_PATH: &str = "/api/analyze";

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn router() -> Router {
    Router::new()
        .route(ANALYZE_PATH, post(submit_batch).fallback(method_not_allowed))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Bind `bind_address` and serve until Ctrl-C
pub async fn serve(bind_address: &str) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!(
        address = %listener.local_addr()?,
        path = ANALYZE_PATH,
        "Aggregation endpoint listening"
    );

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Aggregation endpoint failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

async fn submit_batch(body: Bytes) -> Response {
    match handle_submission(&body).await {
        Ok(summary) => {
            debug!(plays = summary.total_plays, "Answered batch submission");
            (StatusCode::OK, Json(WireSummary::from(&summary))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody {
            error: "Method not allowed".to_string(),
        }),
    )
        .into_response()
}

fn error_response(err: AnalysisError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.is_client_error() {
        warn!(error = %err, "Rejected batch submission");
    } else {
        error!(error = %err, "Batch submission failed");
    }
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Decode and analyze one request body
pub async fn handle_submission(body: &[u8]) -> Result<BatchSummary, AnalysisError> {
    let events = parse_request(body)?;
    tokio::task::spawn_blocking(move || analyze(&events))
        .await
        .map_err(|e| AnalysisError::Internal(format!("analysis task failed: {e}")))?
}

/// A request is a non-empty JSON array; its elements are decoded leniently
pub fn parse_request(body: &[u8]) -> Result<Vec<ListeningEvent>, AnalysisError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AnalysisError::MalformedRequest(format!("body is not valid JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(AnalysisError::MalformedRequest(
            "expected a JSON array of listening events".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(AnalysisError::MalformedRequest(
            "request contains no listening events".to_string(),
        ));
    }

    Ok(items.into_iter().map(ListeningEvent::from_value).collect())
}
