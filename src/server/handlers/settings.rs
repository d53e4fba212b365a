//! Settings, offsets and label size.

use axum::{Json, extract::State, response::Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::printer::LabelSize;

use super::super::state::AppState;
use super::{bad_request, error_response, success_response};

/// GET /api/settings
pub async fn get(State(state): State<Arc<AppState>>) -> Response {
    let settings = state.service.settings().get().await;
    success_response(json!({ "settings": settings }))
}

/// POST /api/settings - partial update, all fields validated together.
pub async fn update(State(state): State<Arc<AppState>>, Json(patch): Json<Value>) -> Response {
    match state.service.settings().update_json(patch).await {
        Ok(settings) => success_response(json!({ "settings": settings })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/reset-offsets
pub async fn reset_offsets(State(state): State<Arc<AppState>>) -> Response {
    match state.service.settings().reset_offsets().await {
        Ok(settings) => success_response(json!({
            "settings": { "x_offset": settings.x_offset, "y_offset": settings.y_offset }
        })),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LabelSizeRequest {
    pub label_size: String,
}

/// POST /api/label-size
pub async fn set_label_size(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LabelSizeRequest>,
) -> Response {
    let Some(size) = LabelSize::from_key(&req.label_size) else {
        return bad_request(format!("unknown label size '{}'", req.label_size));
    };
    match state
        .service
        .settings()
        .update_json(json!({ "label_size": size.key() }))
        .await
    {
        Ok(settings) => success_response(json!({
            "label_size": settings.label_size.key(),
            "dimensions": settings.label_size.dims(),
        })),
        Err(e) => error_response(&e),
    }
}
