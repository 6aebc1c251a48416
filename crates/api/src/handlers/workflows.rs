use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use super::AppState;
use engine::{EngineError, GraphRequest, RunHandle, RunStatusReport};

type ApiError = (StatusCode, Json<Value>);

fn error_response(err: &EngineError) -> ApiError {
    let status = match err {
        EngineError::RunNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::RunNotSettled { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

pub async fn run(
    State(state): State<AppState>,
    Json(graph): Json<GraphRequest>,
) -> Json<RunHandle> {
    Json(state.service.start_run(graph))
}

pub async fn status(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RunStatusReport>, ApiError> {
    match state.service.run_status(&run_id) {
        Ok(report) => Ok(Json(report)),
        Err(e) => Err(error_response(&e)),
    }
}

pub async fn evict(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    match state.service.evict_run(&run_id) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(error_response(&e)),
    }
}
