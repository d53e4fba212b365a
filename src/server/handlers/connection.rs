//! Manual control of the printer link.

use axum::{extract::State, response::Response};
use serde_json::json;
use std::sync::Arc;

use crate::supervisor::ConnectionState;

use super::super::state::AppState;
use super::outcome_response;

/// POST /api/force-reconnect
pub async fn force_reconnect(State(state): State<Arc<AppState>>) -> Response {
    let supervisor = state.service.supervisor();
    let ok = supervisor.connect(true).await;
    outcome_response(
        ok,
        json!({
            "message": if ok { "reconnected" } else { "reconnect failed" },
            "connection": supervisor.snapshot(),
        }),
    )
}

/// POST /api/manual-connect - force a connect, then probe with a heartbeat.
pub async fn manual_connect(State(state): State<Arc<AppState>>) -> Response {
    let supervisor = state.service.supervisor();
    let ok = supervisor.connect(true).await;
    let heartbeat_ok = ok && supervisor.heartbeat().await;
    let snapshot = supervisor.snapshot();
    outcome_response(
        ok,
        json!({
            "message": if ok { "manual connection successful" } else { "connection failed" },
            "heartbeat_ok": heartbeat_ok,
            "device_exists": snapshot.device_exists,
            "process_running": snapshot.helper_running,
        }),
    )
}

/// POST /api/test-connection - reconnect if needed, otherwise send `ESC @`.
pub async fn test_connection(State(state): State<Arc<AppState>>) -> Response {
    let supervisor = state.service.supervisor();
    if supervisor.state() != ConnectionState::Connected {
        let ok = supervisor.connect(false).await;
        return outcome_response(
            ok,
            json!({
                "message": if ok { "reconnected" } else { "failed to connect" },
                "diagnostics": {
                    "device_exists": supervisor.snapshot().device_exists,
                    "can_write": ok,
                },
            }),
        );
    }

    let ok = supervisor.heartbeat().await;
    outcome_response(
        ok,
        json!({
            "message": if ok { "command sent" } else { "failed to send command" },
            "diagnostics": { "device_exists": supervisor.snapshot().device_exists, "can_write": ok },
        }),
    )
}
