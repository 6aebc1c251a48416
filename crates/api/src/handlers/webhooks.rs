use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use super::AppState;

/// Deliver an external callback. The raw request body is the payload.
///
/// Always answers 200: unknown and repeated callback ids are reported in
/// `outcome` rather than as errors, so senders that retry on failure stop.
pub async fn handle_callback(
    Path(callback_id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Json<Value> {
    let payload = String::from_utf8_lossy(&body).into_owned();
    let outcome = state.service.resume_callback(&callback_id, payload);

    Json(json!({ "callbackId": callback_id, "outcome": outcome }))
}
