use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{auth, handlers, state::AppState, websocket::websocket_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Agent endpoints
        .route(
            "/agents",
            get(handlers::list_agents).post(handlers::create_agent),
        )
        .route(
            "/agents/:agent_id",
            get(handlers::get_agent).delete(handlers::delete_agent),
        )
        .route(
            "/agents/:agent_id/config",
            get(handlers::get_agent_config).put(handlers::update_agent_config),
        )
        .route("/agents/:agent_id/message", post(handlers::send_message))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        // System endpoints
        .route("/health", get(handlers::health_handler))
        // WebSocket endpoint
        .route("/ws/:agent_id", get(websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
