//! Status, queue and reference data.

use axum::{extract::State, response::Response};
use serde_json::json;
use std::sync::Arc;

use crate::printer::LabelSize;

use super::super::state::AppState;
use super::success_response;

/// GET /api/status
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    let status = state.service.status().await;
    let label = status.settings.label_size;
    success_response(json!({
        "connection": status.connection,
        "queue_size": status.queue_size,
        "stats": status.stats,
        "settings": status.settings,
        "label": {
            "size": label.key(),
            "dimensions": label.dims(),
        },
    }))
}

/// GET /api/queue-status
pub async fn queue_status(State(state): State<Arc<AppState>>) -> Response {
    let queue = state.service.queue_status();
    success_response(json!({
        "queue_size": queue.queue_size,
        "jobs": queue.jobs,
        "stats": queue.stats,
    }))
}

/// POST /api/clear-queue
pub async fn clear_queue(State(state): State<Arc<AppState>>) -> Response {
    let cleared = state.service.clear_queue();
    success_response(json!({ "cleared_jobs": cleared }))
}

/// GET /api/label-sizes
pub async fn label_sizes(State(state): State<Arc<AppState>>) -> Response {
    let active = state.service.settings().get().await.label_size;
    let sizes: Vec<_> = LabelSize::ALL
        .iter()
        .map(|size| {
            json!({
                "key": size.key(),
                "name": size.display_name(),
                "dimensions": size.dims(),
                "active": *size == active,
            })
        })
        .collect();
    success_response(json!({ "sizes": sizes, "active": active.key() }))
}

/// GET /api/code-syntax-help
pub async fn code_syntax_help() -> Response {
    success_response(json!({
        "syntax_help": "#qr#content#qr#  QR code\n\
                        #qr:SIZE#content#qr#  QR code SIZE dots wide\n\
                        #bar#content#bar#  Code 128 barcode\n\
                        #bar:HEIGHT#content#bar#  barcode HEIGHT dots tall\n\
                        # Heading / ## Subheading  bold heading lines\n\
                        $TIME$  current time",
        "examples": [
            "#qr#https://example.com#qr#",
            "#qr:60#Larger QR code#qr#",
            "#bar#1234567890#bar#",
            "#bar:40#Taller barcode#bar#",
        ],
    }))
}
