use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use tracing::info;

use super::{api_error, ApiResult};
use crate::agent::AgentInfo;
use crate::api::{state::AppState, types::*};
use crate::domain::{AgentConfig, AgentId, DispatchResult};

/// POST /agents
pub async fn create_agent(
    State(state): State<AppState>,
    Json(config): Json<AgentConfig>,
) -> ApiResult<(StatusCode, Json<AgentResponse>)> {
    let agent = state.agents.create(config).map_err(api_error)?;
    let data = serde_json::to_value(agent.config()).ok();

    Ok((
        StatusCode::CREATED,
        Json(AgentResponse::success(
            agent.id().clone(),
            "Agent created successfully",
            data,
        )),
    ))
}

/// GET /agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    let agents: Vec<AgentSummary> = state
        .agents
        .list()
        .into_iter()
        .map(|agent| AgentSummary {
            agent_id: agent.id().clone(),
            config: agent.config(),
        })
        .collect();

    Json(AgentListResponse {
        total: agents.len(),
        agents,
    })
}

/// GET /agents/:agent_id
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<AgentInfo>> {
    let agent = state.agents.require(&agent_id).map_err(api_error)?;
    Ok(Json(agent.info().await))
}

/// GET /agents/:agent_id/config
pub async fn get_agent_config(
    State(state): State<AppState>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<AgentConfig>> {
    let agent = state.agents.require(&agent_id).map_err(api_error)?;
    Ok(Json(agent.config()))
}

/// PUT /agents/:agent_id/config
pub async fn update_agent_config(
    State(state): State<AppState>,
    Path(agent_id): Path<AgentId>,
    Json(config): Json<AgentConfig>,
) -> ApiResult<Json<AgentResponse>> {
    let agent = state.agents.require(&agent_id).map_err(api_error)?;
    agent.update_config(config).map_err(api_error)?;

    Ok(Json(AgentResponse::success(
        agent_id,
        "Agent configuration updated",
        serde_json::to_value(agent.config()).ok(),
    )))
}

/// POST /agents/:agent_id/message
pub async fn send_message(
    State(state): State<AppState>,
    Path(agent_id): Path<AgentId>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<Json<DispatchResult>> {
    let agent = state.agents.require(&agent_id).map_err(api_error)?;
    Ok(Json(agent.process_message(&req.message).await))
}

/// DELETE /agents/:agent_id
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<AgentResponse>> {
    let report = state.agents.remove(&agent_id).await.map_err(api_error)?;
    info!(agent = %agent_id, "Agent deleted via API");

    Ok(Json(AgentResponse::success(
        agent_id.clone(),
        format!("Agent {} deleted", agent_id),
        Some(json!({
            "monitor_loops_stopped": report.stopped,
            "monitor_loops_aborted": report.aborted,
        })),
    )))
}
