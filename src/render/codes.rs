//! Inline QR codes and Code 128 barcodes.
//!
//! ```text
//! #qr#https://example.com#qr#      QR code, default size
//! #qr:60#payload#qr#               QR code, 60 dots wide
//! #bar#ART-12345#bar#              Code 128, default height
//! #bar:40#ART-12345#bar#           Code 128, 40 dots tall
//! ```
//!
//! Sizes are clamped to what fits on the label. Everything outside the
//! markers is rendered as text.

use barcoders::sym::code128::Code128;
use qrcode::{EcLevel, QrCode};
use tracing::{debug, warn};

use super::check_font_size;
use super::text::{CODE_HEADINGS, LINE_GAP, TextLine};
use crate::error::{PrintError, Result};
use crate::printer::LabelDimensions;
use crate::protocol::commands::Alignment;
use crate::raster::Bitmap;

/// Quiet zone around QR codes, in modules.
const QR_BORDER: usize = 2;
/// Dots per Code 128 module.
const BAR_MODULE: usize = 2;
const CODE_GAP: usize = 6;
const TOP: usize = 10;
const BOTTOM_GUARD: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Qr { data: String, size: Option<usize> },
    Barcode { data: String, height: Option<usize> },
}

/// Split `text` into text runs and code markers. An unterminated marker is
/// kept as literal text.
pub fn parse_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = text;
    let mut literal = String::new();

    while let Some(start) = rest.find('#') {
        literal.push_str(&rest[..start]);
        let tail = &rest[start..];
        match parse_marker(tail) {
            Some((segment, consumed)) => {
                if !literal.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut literal)));
                }
                segments.push(segment);
                rest = &tail[consumed..];
            }
            None => {
                literal.push('#');
                rest = &tail[1..];
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }
    segments
}

/// Try to read `#tag(:N)?#content#tag#` at the start of `s`.
fn parse_marker(s: &str) -> Option<(Segment, usize)> {
    let (tag, after_tag) = if let Some(r) = s.strip_prefix("#qr") {
        ("qr", r)
    } else if let Some(r) = s.strip_prefix("#bar") {
        ("bar", r)
    } else {
        return None;
    };

    let (param, body) = match after_tag.strip_prefix(':') {
        Some(r) => {
            let end = r.find('#')?;
            let digits = &r[..end];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (digits.parse::<usize>().ok(), &r[end..])
        }
        None => (None, after_tag),
    };
    let body = body.strip_prefix('#')?;

    let close = format!("#{}#", tag);
    let end = body.find(&close)?;
    let data = body[..end].trim().to_string();
    let consumed = s.len() - body.len() + end + close.len();

    let segment = match tag {
        "qr" => Segment::Qr { data, size: param },
        _ => Segment::Barcode {
            data,
            height: param,
        },
    };
    Some((segment, consumed))
}

/// QR side length for a label: default and upper bound.
pub fn qr_size_bounds(label: LabelDimensions) -> (usize, usize) {
    let default = 70.min(label.width_px / 6);
    let max = (label.width_px / 4).min(label.height_px / 4);
    (default.min(max), max)
}

/// Barcode height for a label: default and upper bound.
pub fn barcode_height_bounds(label: LabelDimensions) -> (usize, usize) {
    let default = 30.min(label.height_px / 8);
    let max = (label.height_px / 6).min(50);
    (default.min(max), max)
}

/// Render a QR code close to `size` dots square, using whole-dot modules.
pub fn qr_bitmap(data: &str, size: usize) -> Result<Bitmap> {
    let code = QrCode::with_error_correction_level(data, EcLevel::M)
        .map_err(|e| PrintError::Invariant(format!("QR code generation failed: {}", e)))?;
    let modules = code.width();
    let span = modules + 2 * QR_BORDER;
    let cell = (size / span).max(1);

    let mut bmp = Bitmap::new(span * cell, span * cell);
    for qy in 0..modules {
        for qx in 0..modules {
            if code[(qx, qy)] == qrcode::Color::Dark {
                bmp.fill_rect((qx + QR_BORDER) * cell, (qy + QR_BORDER) * cell, cell, cell);
            }
        }
    }
    Ok(bmp)
}

/// Render a Code 128 (set B) barcode `height` dots tall, at most
/// `max_width` dots wide.
pub fn barcode_bitmap(data: &str, height: usize, max_width: usize) -> Result<Bitmap> {
    if data.is_empty() {
        let mut bmp = Bitmap::new(100, height);
        bmp.fill_rect(10, (height / 2).saturating_sub(2), 80, 5);
        return Ok(bmp);
    }

    let barcode = Code128::new(&format!("\u{0181}{}", data))
        .map_err(|e| PrintError::Invariant(format!("barcode encoding failed: {}", e)))?;
    let modules = barcode.encode();

    let module = if modules.len() * BAR_MODULE <= max_width {
        BAR_MODULE
    } else {
        1
    };
    if modules.len() * module > max_width {
        return Err(PrintError::Invariant(format!(
            "barcode needs {} dots, label allows {}",
            modules.len(),
            max_width
        )));
    }

    let mut bmp = Bitmap::new(modules.len() * module, height);
    for (i, &m) in modules.iter().enumerate() {
        if m == 1 {
            bmp.fill_rect(i * module, 0, module, height);
        }
    }
    Ok(bmp)
}

/// Lay out text with inline codes on a label-sized canvas. Codes are
/// centered on their own row; layout stops when the next row would run off
/// the bottom of the label.
pub fn render_with_codes(
    text: &str,
    font_size: u32,
    alignment: Alignment,
    label: LabelDimensions,
) -> Result<Bitmap> {
    check_font_size(font_size)?;
    let mut canvas = Bitmap::new(label.width_px, label.height_px);
    let (qr_default, qr_max) = qr_size_bounds(label);
    let (bar_default, bar_max) = barcode_height_bounds(label);
    let limit = label.height_px.saturating_sub(BOTTOM_GUARD);
    let mut y = TOP;

    for segment in parse_segments(text) {
        if y > limit {
            warn!(y, limit, "label full, dropping remaining content");
            break;
        }
        match segment {
            Segment::Text(run) => {
                for raw in run.split('\n') {
                    let line = TextLine::parse(raw, font_size, CODE_HEADINGS);
                    if line.is_blank() {
                        continue;
                    }
                    line.draw(&mut canvas, y, alignment)?;
                    y += line.height() + LINE_GAP;
                }
            }
            Segment::Qr { data, size } => {
                let size = size.unwrap_or(qr_default).min(qr_max);
                let code = qr_bitmap(&data, size)?;
                debug!(size, width = code.width(), "qr placed");
                canvas.blit(&code, label.width_px.saturating_sub(code.width()) / 2, y);
                y += code.height() + CODE_GAP;
            }
            Segment::Barcode { data, height } => {
                let height = height.unwrap_or(bar_default).min(bar_max);
                let code = barcode_bitmap(&data, height, label.width_px.saturating_sub(20))?;
                canvas.blit(&code, label.width_px.saturating_sub(code.width()) / 2, y);
                y += code.height() + CODE_GAP;
            }
        }
    }
    Ok(canvas)
}
