use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::engine::ScanEngine;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
}

pub fn router(engine: Arc<ScanEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .with_state(engine)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 400 only for fatal-to-scan rejections (bad input, SSRF, unresolvable
/// host); everything else comes back 200 with the degraded report.
async fn analyze(
    State(engine): State<Arc<ScanEngine>>,
    Json(req): Json<AnalyzeRequest>,
) -> Response {
    let url = req.url.clone();
    // Spawned so an unexpected panic inside the engine becomes a 500
    // instead of tearing down the connection.
    let outcome = tokio::spawn(async move { engine.run(&url).await }).await;
    match outcome {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(rejection)) => {
            tracing::info!(url = %req.url, kind = rejection.kind(), "scan rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "status": "failed",
                    "error": rejection.kind(),
                    "detail": rejection.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(url = %req.url, error = %e, "scan crashed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "ScanEngineFailure"})),
            )
                .into_response()
        }
    }
}
