//! Bearer-token gate for the agent endpoints

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::config::ServerConfig;

/// Resolved bearer policy
#[derive(Debug, Clone, Default)]
pub struct ApiAuth {
    required: bool,
    token: Option<String>,
}

impl ApiAuth {
    pub fn from_config(config: &ServerConfig) -> Self {
        let token = config
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self {
            required: config.require_bearer || token.is_some(),
            token,
        }
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Check the request headers against the policy
    pub fn authorize(&self, headers: &HeaderMap) -> std::result::Result<(), (StatusCode, String)> {
        if !self.required {
            return Ok(());
        }

        let provided = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .filter(|t| !t.is_empty());

        match (provided, self.token.as_deref()) {
            (None, _) => Err((
                StatusCode::UNAUTHORIZED,
                "missing bearer token".to_string(),
            )),
            (Some(provided), Some(expected)) if provided != expected => Err((
                StatusCode::UNAUTHORIZED,
                "invalid bearer token".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

/// Middleware rejecting requests that fail the bearer policy
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Err(rejection) = state.auth.authorize(request.headers()) {
        debug!(path = %request.uri().path(), "Rejected request: {}", rejection.1);
        return rejection.into_response();
    }
    next.run(request).await
}
