//! Agent discovery handlers.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};

use agentry_types::action::{ActionSummary, AgentSummary};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/agents - Registered agents and their action names.
pub async fn list_agents(State(state): State<AppState>) -> Json<ApiResponse<Vec<AgentSummary>>> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let agents = state.orchestrator.agents();
    let elapsed = start.elapsed().as_millis() as u64;

    Json(ApiResponse::success(agents, request_id, elapsed).with_link("self", "/api/v1/agents"))
}

/// GET /api/v1/agents/{agent}/actions - Actions with gating states and schemas.
pub async fn list_actions(
    State(state): State<AppState>,
    Path(agent): Path<String>,
) -> Result<Json<ApiResponse<Vec<ActionSummary>>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let actions = state.orchestrator.actions(&agent)?;
    let elapsed = start.elapsed().as_millis() as u64;

    let resp = ApiResponse::success(actions, request_id, elapsed)
        .with_link("self", &format!("/api/v1/agents/{agent}/actions"))
        .with_link("processes", &format!("/api/v1/agents/{agent}/processes"));
    Ok(Json(resp))
}
