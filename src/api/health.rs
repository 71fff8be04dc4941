use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::api::middleware::session::AppState;
use crate::services::BackendRoute;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub backend: BackendHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendHealth {
    /// `remote` or `mock`
    pub route: String,
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_latency_ms: Option<u128>,
    pub decided_secs_ago: u64,
}

/// Health check endpoint
/// Always 200: falling back to the mock keeps the app usable
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let start = Instant::now();
    let route = state.data_source.status().await;

    let response = HealthResponse {
        status: match route.route {
            BackendRoute::Remote => "healthy".to_string(),
            BackendRoute::Mock => "degraded".to_string(),
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: BackendHealth {
            route: match route.route {
                BackendRoute::Remote => "remote".to_string(),
                BackendRoute::Mock => "mock".to_string(),
            },
            api_base: state.data_source.api_base().to_string(),
            probe_latency_ms: route.probe_latency_ms,
            decided_secs_ago: route.decided_secs_ago,
        },
    };

    tracing::info!(
        status = %response.status,
        route = %response.backend.route,
        duration_ms = start.elapsed().as_millis(),
        "Health check completed"
    );

    Json(response)
}
