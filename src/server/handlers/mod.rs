//! HTTP handlers for the server.
//!
//! Every response is a JSON object with a `success` flag; failures add an
//! `error` string of the form `"Kind: reason"`.

pub mod connection;
pub mod print;
pub mod settings;
pub mod status;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::error::{ErrorKind, PrintError};

/// `{"success": true, ...fields}`.
pub(crate) fn success_response(fields: Value) -> Response {
    let mut body = json!({ "success": true });
    if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), fields) {
        obj.extend(extra);
    }
    Json(body).into_response()
}

/// Probe-style response: `success` mirrors `ok`, failures answer 503.
pub(crate) fn outcome_response(ok: bool, fields: Value) -> Response {
    let mut body = json!({ "success": ok });
    if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), fields) {
        obj.extend(extra);
    }
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// `{"success": false, "error": ..., "kind": ...}` with a status matching
/// the error kind.
pub(crate) fn error_response(err: &PrintError) -> Response {
    let status = match err.kind() {
        ErrorKind::Invariant => StatusCode::BAD_REQUEST,
        ErrorKind::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::IoTransient | ErrorKind::IoFatal => StatusCode::BAD_GATEWAY,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
    };
    let body = json!({
        "success": false,
        "error": err.to_string(),
        "kind": err.kind(),
    });
    (status, Json(body)).into_response()
}

/// Shorthand for bad-request errors raised by the handlers themselves.
pub(crate) fn bad_request(reason: impl Into<String>) -> Response {
    error_response(&PrintError::Invariant(reason.into()))
}
