use axum::{extract::State, Json};

use crate::api::{state::AppState, types::HealthResponse};

/// GET /health -- liveness check with registry counts
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.shutdown.is_shutdown_requested() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_seconds(),
        agents: state.agents.len(),
        connections: state.subscriptions.connection_count(),
    })
}
