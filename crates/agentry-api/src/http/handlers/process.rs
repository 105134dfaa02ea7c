//! Process handlers: dispatch, status and listing.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};

use agentry_types::error::DispatchError;
use agentry_types::process::{DispatchOutcome, DispatchRequest, ProcessId, ProcessSnapshot, ProcessSummary};

use crate::http::error::AppError;
use crate::http::extractors::dispatch::DispatchHeaders;
use crate::http::extractors::query::ProcessListQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of a process listing.
#[derive(Debug, Serialize)]
pub struct ProcessList {
    pub total: u64,
    pub processes: Vec<ProcessSummary>,
    /// Link to the following page, absent on the last one.
    pub next: Option<String>,
}

fn status_href(agent: &str, process_id: ProcessId) -> String {
    format!("/api/v1/agents/{agent}/processes/{process_id}/status")
}

/// An unparsable process id can never match a process.
fn parse_process_id(raw: &str) -> Result<ProcessId, AppError> {
    raw.parse()
        .map_err(|_| AppError::Dispatch(DispatchError::process_not_found(raw)))
}

/// Dispatch bodies are optional; an empty body is a null input.
fn parse_body(body: &Bytes) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}

/// Render a snapshot: `http_error` answers with its recorded status and
/// `{detail}`, `unhandled_error` with 500, anything else with 200.
fn snapshot_response(
    snapshot: &ProcessSnapshot,
    request_id: String,
    elapsed: u64,
) -> Result<ApiResponse<Value>, AppError> {
    let resp = if let Some((status_code, detail)) = snapshot.user_failure() {
        let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        ApiResponse::success(json!({ "detail": detail }), request_id, elapsed)
            .with_error("ACTION_FAILED", &detail)
            .with_status(status)
    } else if let Some(message) = snapshot.unhandled_failure() {
        ApiResponse::success(snapshot.data.clone(), request_id, elapsed)
            .with_error("UNHANDLED_ERROR", &message)
            .with_status(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        ApiResponse::success(to_json(snapshot)?, request_id, elapsed)
    };
    Ok(resp.with_link("self", &status_href(&snapshot.agent, snapshot.process_id)))
}

fn outcome_response(
    agent: &str,
    outcome: DispatchOutcome,
    request_id: String,
    elapsed: u64,
) -> Result<ApiResponse<Value>, AppError> {
    match outcome {
        DispatchOutcome::Completed(snapshot) => snapshot_response(&snapshot, request_id, elapsed),
        DispatchOutcome::Accepted(ack) => Ok(ApiResponse::success(to_json(&ack)?, request_id, elapsed)
            .with_status(StatusCode::ACCEPTED)
            .with_link("status", &status_href(agent, ack.process_id))),
    }
}

async fn dispatch(
    state: &AppState,
    request: DispatchRequest,
    headers: DispatchHeaders,
    body: &Bytes,
) -> Result<ApiResponse<Value>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let mut request = request.input(parse_body(body)?);
    request.mode = headers.mode;
    request.callback_url = headers.callback_url;
    let agent = request.agent.clone();

    let outcome = state.orchestrator.dispatch(request).await?;
    let elapsed = start.elapsed().as_millis() as u64;
    outcome_response(&agent, outcome, request_id, elapsed)
}

/// POST /api/v1/agents/{agent}/programs/{action} - Start a process.
pub async fn start_process(
    State(state): State<AppState>,
    Path((agent, action)): Path<(String, String)>,
    headers: DispatchHeaders,
    body: Bytes,
) -> Result<ApiResponse<Value>, AppError> {
    dispatch(&state, DispatchRequest::new(agent, action), headers, &body).await
}

/// POST /api/v1/agents/{agent}/processes/{process_id}/actions/{action} - Resume a process.
pub async fn resume_process(
    State(state): State<AppState>,
    Path((agent, process_id, action)): Path<(String, String, String)>,
    headers: DispatchHeaders,
    body: Bytes,
) -> Result<ApiResponse<Value>, AppError> {
    let process_id = parse_process_id(&process_id)?;
    let request = DispatchRequest::new(agent, action).process(process_id);
    dispatch(&state, request, headers, &body).await
}

/// GET /api/v1/agents/{agent}/processes/{process_id}/status - Current snapshot.
pub async fn process_status(
    State(state): State<AppState>,
    Path((agent, process_id)): Path<(String, String)>,
) -> Result<ApiResponse<Value>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let process_id = parse_process_id(&process_id)?;
    let snapshot = state.orchestrator.status(&agent, process_id).await?;
    let elapsed = start.elapsed().as_millis() as u64;
    snapshot_response(&snapshot, request_id, elapsed)
}

/// GET /api/v1/agents/{agent}/processes - One page of an agent's processes.
pub async fn list_processes(
    State(state): State<AppState>,
    Path(agent): Path<String>,
    Query(query): Query<ProcessListQuery>,
) -> Result<ApiResponse<ProcessList>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let request = query.page_request()?;
    let page = state.orchestrator.list(&agent, request).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let base = format!("/api/v1/agents/{agent}/processes");
    let next = page.has_next.then(|| {
        let next = request.clamped(state.config.dispatch.max_page_size).next();
        format!("{base}?limit={}&skip={}&sort={}", next.limit, next.skip, next.sort)
    });

    let mut resp = ApiResponse::success(
        ProcessList {
            total: page.total_count,
            processes: page.items,
            next: next.clone(),
        },
        request_id,
        elapsed,
    )
    .with_link("self", &base);
    if let Some(next) = &next {
        resp = resp.with_link("next", next);
    }
    Ok(resp)
}
