use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::application::actors::telemetry_actor::{TelemetryHandle, TelemetryStats};
use crate::application::services::trading_engine::EngineStats;

/// Shared state behind the health endpoint
#[derive(Clone)]
pub struct HealthState {
    pub engine: Arc<RwLock<EngineStats>>,
    pub telemetry: TelemetryHandle,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "running", "degraded" or "stopped"
    pub status: &'static str,
    pub engine: EngineStats,
    pub telemetry: TelemetryStats,
}

fn status_label(stats: &EngineStats) -> &'static str {
    if !stats.running {
        "stopped"
    } else if stats.consecutive_failures > 0 {
        "degraded"
    } else {
        "running"
    }
}

/// Report engine and telemetry counters
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let engine = state.engine.read().await.clone();
    Json(HealthResponse {
        status: status_label(&engine),
        telemetry: state.telemetry.stats(),
        engine,
    })
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(|| async { "sentinel is running" }))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label() {
        let mut stats = EngineStats::default();
        assert_eq!(status_label(&stats), "stopped");

        stats.running = true;
        assert_eq!(status_label(&stats), "running");

        stats.consecutive_failures = 2;
        assert_eq!(status_label(&stats), "degraded");
    }
}
