//! Print and preview handlers.
//!
//! Print endpoints only enqueue. With `immediate` set they also wait for the
//! job's final outcome, so the worker stays the only writer to the printer.

use axum::{
    Json,
    extract::{Multipart, State},
    response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PrintError, Result};
use crate::protocol::commands::Alignment;
use crate::queue::{CalibrationJob, JobKind, TextJob, job::DEFAULT_FONT_SIZE};
use crate::raster::Bitmap;
use crate::render::photo::{self, MAX_UPLOAD_BYTES};
use crate::render::{CalibrationPattern, ImageOptions, ScalingMode, blocking, check_font_size};
use crate::settings::Settings;

use super::super::state::AppState;
use super::{error_response, success_response};

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

fn default_alignment() -> String {
    "center".to_string()
}

fn default_pattern() -> String {
    "grid".to_string()
}

fn default_true() -> bool {
    true
}

/// Body of the text print and preview endpoints.
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_alignment")]
    pub alignment: String,
    #[serde(default)]
    pub immediate: bool,
}

impl TextRequest {
    fn job(&self) -> Result<TextJob> {
        if self.text.trim().is_empty() {
            return Err(PrintError::Invariant("no text".into()));
        }
        check_font_size(self.font_size)?;
        Ok(TextJob::new(self.text.clone())
            .font_size(self.font_size)
            .alignment(Alignment::parse(&self.alignment)))
    }
}

#[derive(Debug, Deserialize)]
pub struct CalibrationRequest {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    pub width: Option<usize>,
    pub height: Option<usize>,
    #[serde(default = "default_true")]
    pub immediate: bool,
}

impl CalibrationRequest {
    fn job(&self) -> Result<JobKind> {
        let kind = JobKind::Calibration(CalibrationJob {
            pattern: CalibrationPattern::parse(&self.pattern)?,
            width: self.width,
            height: self.height,
        });
        kind.validate()?;
        Ok(kind)
    }
}

/// Enqueue, or enqueue and wait.
async fn submit(state: &AppState, kind: JobKind, immediate: bool) -> Response {
    let name = kind.name();
    if immediate {
        match state.service.submit_and_wait(kind).await {
            Ok(job_id) => success_response(json!({ "job_id": job_id, "printed": true })),
            Err(e) => {
                warn!(kind = name, error = %e, "immediate print failed");
                error_response(&e)
            }
        }
    } else {
        let job_id = state.service.submit(kind);
        success_response(json!({ "job_id": job_id, "queued": true }))
    }
}

/// Preview body: base64 PNG plus dimensions. Offsets are never applied.
fn preview_response(bitmap: &Bitmap, extra: serde_json::Value) -> Response {
    match bitmap.to_png() {
        Ok(png) => {
            let mut info = json!({
                "width": bitmap.width(),
                "height": bitmap.height(),
                "x_offset": 0,
                "y_offset": 0,
            });
            if let (Some(obj), serde_json::Value::Object(extra)) = (info.as_object_mut(), extra) {
                obj.extend(extra);
            }
            success_response(json!({
                "preview_base64": BASE64.encode(png),
                "info": info,
            }))
        }
        Err(e) => error_response(&e),
    }
}

fn has_code_markers(text: &str) -> bool {
    text.contains("#qr") || text.contains("#bar")
}

/// POST /api/print-text
pub async fn print_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextRequest>,
) -> Response {
    match req.job() {
        Ok(job) => submit(&state, JobKind::Text(job), req.immediate).await,
        Err(e) => error_response(&e),
    }
}

/// POST /api/print-text-with-codes
pub async fn print_text_with_codes(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextRequest>,
) -> Response {
    match req.job() {
        Ok(job) => submit(&state, JobKind::TextWithCodes(job), req.immediate).await,
        Err(e) => error_response(&e),
    }
}

async fn preview(state: &AppState, req: TextRequest, with_codes: bool) -> Response {
    let job = match req.job() {
        Ok(job) => job,
        Err(e) => return error_response(&e),
    };
    let label = state.service.settings().get().await.label_size.dims();
    let renderer = state.service.renderer().clone();

    let rendered = blocking(move || {
        if with_codes {
            renderer.text_with_codes(&job.text, job.font_size, job.alignment, label)
        } else {
            renderer.text(&job.text, job.font_size, job.alignment, label)
        }
    })
    .await;

    match rendered {
        Ok(bitmap) => preview_response(&bitmap, json!({ "has_codes": with_codes })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/preview-text - switches to the code renderer when markers are present.
pub async fn preview_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextRequest>,
) -> Response {
    let with_codes = has_code_markers(&req.text);
    preview(&state, req, with_codes).await
}

/// POST /api/preview-text-with-codes
pub async fn preview_text_with_codes(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextRequest>,
) -> Response {
    preview(&state, req, true).await
}

/// Parsed multipart image upload.
#[derive(Debug)]
struct ImageUpload {
    bytes: Vec<u8>,
    immediate: bool,
    options: ImageOptions,
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        _ => Err(PrintError::Invariant(format!("{} must be true or false", name))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PrintError::Invariant(format!("invalid {}: '{}'", name, value)))
}

async fn read_upload(mut multipart: Multipart, settings: &Settings) -> Result<ImageUpload> {
    let mut bytes = None;
    let mut immediate = false;
    let mut fit_to_label = settings.fit_to_label_default;
    let mut maintain_aspect = settings.maintain_aspect_default;
    let mut scaling_mode = None;
    let mut options = ImageOptions::from_settings(settings);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PrintError::Invariant(format!("multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "image" {
            let data = field
                .bytes()
                .await
                .map_err(|e| PrintError::Invariant(format!("failed to read image: {}", e)))?;
            if data.len() > MAX_UPLOAD_BYTES {
                return Err(PrintError::Invariant(format!(
                    "image too large, maximum {} MiB",
                    MAX_UPLOAD_BYTES / (1024 * 1024)
                )));
            }
            bytes = Some(data.to_vec());
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| PrintError::Invariant(format!("failed to read {}: {}", name, e)))?;
        match name.as_str() {
            "immediate" => immediate = parse_flag(&name, &value)?,
            "fit_to_label" => fit_to_label = parse_flag(&name, &value)?,
            "maintain_aspect" => maintain_aspect = parse_flag(&name, &value)?,
            "enable_dither" => options.dither = parse_flag(&name, &value)?,
            "dither_threshold" => options.threshold = parse_number(&name, &value)?,
            "dither_strength" => options.strength = parse_number(&name, &value)?,
            "scaling_mode" => {
                scaling_mode = Some(ScalingMode::parse(&value).ok_or_else(|| {
                    PrintError::Invariant(format!("unknown scaling_mode '{}'", value))
                })?)
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| PrintError::Invariant("no image uploaded".into()))?;
    if !(0.1..=2.0).contains(&options.strength) {
        return Err(PrintError::Invariant(
            "dither_strength must be between 0.1 and 2.0".into(),
        ));
    }
    options.scaling = match (fit_to_label, scaling_mode) {
        (false, _) => None,
        (true, Some(mode)) => Some(mode),
        (true, None) => photo::scaling_for(true, maintain_aspect),
    };

    Ok(ImageUpload {
        bytes,
        immediate,
        options,
    })
}

async fn process_upload(state: &AppState, multipart: Multipart) -> Result<(Bitmap, ImageUpload)> {
    let settings = state.service.settings().get().await;
    let upload = read_upload(multipart, &settings).await?;
    let label = settings.label_size.dims();

    let bytes = upload.bytes.clone();
    let options = upload.options.clone();
    let bitmap = blocking(move || photo::process(&bytes, &options, label)).await?;
    Ok((bitmap, upload))
}

/// POST /api/preview-image
pub async fn preview_image(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    match process_upload(&state, multipart).await {
        Ok((bitmap, upload)) => preview_response(
            &bitmap,
            json!({
                "dithered": upload.options.dither,
                "scaling_mode": upload.options.scaling,
                "source_bytes": upload.bytes.len(),
            }),
        ),
        Err(e) => error_response(&e),
    }
}

/// POST /api/print-image
pub async fn print_image(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    match process_upload(&state, multipart).await {
        Ok((bitmap, upload)) => {
            info!(
                width = bitmap.width(),
                height = bitmap.height(),
                immediate = upload.immediate,
                "image upload accepted"
            );
            submit(&state, JobKind::Image(bitmap), upload.immediate).await
        }
        Err(e) => error_response(&e),
    }
}

/// POST /api/print-calibration
pub async fn print_calibration(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CalibrationRequest>,
) -> Response {
    match req.job() {
        Ok(kind) => submit(&state, kind, req.immediate).await,
        Err(e) => error_response(&e),
    }
}

/// POST /api/init-printer
pub async fn init_printer(State(state): State<Arc<AppState>>) -> Response {
    let job_id = state.service.submit(JobKind::Init);
    success_response(json!({ "job_id": job_id, "queued": true }))
}

/// POST /api/test-offsets - print the full calibration pattern with the
/// current offsets and wait for it.
pub async fn test_offsets(State(state): State<Arc<AppState>>) -> Response {
    let settings = state.service.settings().get().await;
    let job = CalibrationJob {
        pattern: CalibrationPattern::Full,
        width: None,
        height: None,
    };
    match state
        .service
        .submit_and_wait(JobKind::Calibration(job))
        .await
    {
        Ok(job_id) => success_response(json!({
            "job_id": job_id,
            "current_offsets": { "x": settings.x_offset, "y": settings.y_offset },
        })),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_markers_detected() {
        assert!(has_code_markers("see #qr#https://x#qr#"));
        assert!(has_code_markers("#bar:40#123#bar#"));
        assert!(!has_code_markers("# Heading"));
    }

    #[test]
    fn test_text_request_validation() {
        let req: TextRequest = serde_json::from_value(json!({ "text": "  " })).unwrap();
        assert_eq!(req.job().unwrap_err().kind(), crate::error::ErrorKind::Invariant);

        let req: TextRequest =
            serde_json::from_value(json!({ "text": "Hi", "alignment": "RIGHT" })).unwrap();
        let job = req.job().unwrap();
        assert_eq!(job.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(job.alignment, Alignment::Right);
        assert!(!req.immediate);
    }

    #[test]
    fn test_text_request_font_bounds() {
        for size in [0, 201, 200_000] {
            let req: TextRequest =
                serde_json::from_value(json!({ "text": "Hi", "font_size": size })).unwrap();
            assert_eq!(req.job().unwrap_err().kind(), crate::error::ErrorKind::Invariant);
        }
        let req: TextRequest =
            serde_json::from_value(json!({ "text": "Hi", "font_size": 200 })).unwrap();
        assert_eq!(req.job().unwrap().font_size, 200);
    }

    #[test]
    fn test_calibration_request_bounds() {
        let req = |body| serde_json::from_value::<CalibrationRequest>(body).unwrap();

        assert!(req(json!({})).job().is_ok());
        assert!(req(json!({ "width": 384, "height": 65535 })).job().is_ok());
        for body in [
            json!({ "width": 10 }),
            json!({ "height": 19 }),
            json!({ "width": 1537 }),
            json!({ "height": 65536 }),
            json!({ "width": 1_000_000_000u64, "height": 1_000_000_000u64 }),
            json!({ "pattern": "spiral" }),
        ] {
            let err = req(body).job().unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Invariant);
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("immediate", "True").unwrap());
        assert!(!parse_flag("immediate", "false").unwrap());
        assert!(parse_flag("immediate", "maybe").is_err());
    }
}
