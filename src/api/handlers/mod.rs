use axum::http::StatusCode;

use crate::error::RunecastError;

pub mod agents;
pub mod system;

pub use agents::*;
pub use system::*;

pub type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

/// Map a domain error to the status code a caller sees
pub fn api_error(e: RunecastError) -> (StatusCode, String) {
    let status = match &e {
        RunecastError::AgentNotFound(_) => StatusCode::NOT_FOUND,
        RunecastError::SupervisorAlreadyStarted(_) => StatusCode::CONFLICT,
        _ if e.is_caller_error() => StatusCode::BAD_REQUEST,
        RunecastError::Dispatch(_) | RunecastError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            api_error(RunecastError::AgentNotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            api_error(RunecastError::InvalidAgentConfig("bad".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            api_error(RunecastError::Internal("boom".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
