//! # HTTP Server
//!
//! JSON REST surface over the print [`Service`].
//!
//! ## Usage
//!
//! ```bash
//! phomemo serve --listen 0.0.0.0:8080 --mac DC:0D:30:90:23:C7
//! ```
//!
//! Every endpoint answers with a JSON object carrying `success`. Failures
//! add `error` (`"Kind: reason"`) and `kind`, with a status code picked from
//! the kind.

mod handlers;
mod state;

pub use state::{AppState, ServerConfig};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::render::photo::MAX_UPLOAD_BYTES;
use crate::service::Service;

/// Multipart overhead on top of the raw image cap.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 2 * 1024 * 1024;

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Status and queue
        .route("/api/status", get(handlers::status::status))
        .route("/api/queue-status", get(handlers::status::queue_status))
        .route("/api/clear-queue", post(handlers::status::clear_queue))
        .route("/api/label-sizes", get(handlers::status::label_sizes))
        .route("/api/code-syntax-help", get(handlers::status::code_syntax_help))
        // Settings
        .route(
            "/api/settings",
            get(handlers::settings::get).post(handlers::settings::update),
        )
        .route("/api/reset-offsets", post(handlers::settings::reset_offsets))
        .route("/api/label-size", post(handlers::settings::set_label_size))
        // Printing
        .route("/api/print-text", post(handlers::print::print_text))
        .route(
            "/api/print-text-with-codes",
            post(handlers::print::print_text_with_codes),
        )
        .route("/api/preview-text", post(handlers::print::preview_text))
        .route(
            "/api/preview-text-with-codes",
            post(handlers::print::preview_text_with_codes),
        )
        .route(
            "/api/print-image",
            post(handlers::print::print_image).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/preview-image",
            post(handlers::print::preview_image).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/print-calibration",
            post(handlers::print::print_calibration),
        )
        .route("/api/test-offsets", post(handlers::print::test_offsets))
        .route("/api/init-printer", post(handlers::print::init_printer))
        // Connection control
        .route(
            "/api/force-reconnect",
            post(handlers::connection::force_reconnect),
        )
        .route(
            "/api/manual-connect",
            post(handlers::connection::manual_connect),
        )
        .route(
            "/api/test-connection",
            post(handlers::connection::test_connection),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve<F>(config: ServerConfig, service: Arc<Service>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(
        listen = %config.listen_addr,
        device = %service.printer().device_path,
        "http server listening"
    );

    let app = router(Arc::new(AppState::new(config, service)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
