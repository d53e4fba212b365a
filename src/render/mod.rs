//! # Label Rendering
//!
//! Everything that turns user content into a 1-bit [`Bitmap`] before it
//! reaches the raster converter.
//!
//! - [`text`]: plain text with headings
//! - [`codes`]: text with inline `#qr#` / `#bar#` markers
//! - [`calibration`]: offset calibration patterns
//! - [`photo`]: uploaded images, scaled and dithered
//!
//! The queue only sees the [`Renderer`] trait, so the text path can be
//! swapped out (tests use a stub that never touches fonts).
//!
//! ```
//! use phomemo::printer::LabelSize;
//! use phomemo::protocol::commands::Alignment;
//! use phomemo::render::{LabelRenderer, Renderer};
//!
//! let label = LabelSize::Mm40x30.dims();
//! let bitmap = LabelRenderer
//!     .text("Hello\n# M110", 22, Alignment::Center, label)
//!     .unwrap();
//! assert_eq!(bitmap.width(), label.width_px);
//! ```

pub mod calibration;
pub mod codes;
pub mod font;
pub mod photo;
pub mod text;

use chrono::Local;

use crate::error::{PrintError, Result};
use crate::printer::LabelDimensions;
use crate::printer::config::HEAD_WIDTH_DOTS;
use crate::protocol::commands::Alignment;
use crate::raster::Bitmap;

pub use calibration::{CalibrationPattern, render_calibration};
pub use photo::{ImageOptions, ScalingMode};

/// Largest accepted font size in dots.
pub const MAX_FONT_SIZE: u32 = 200;

/// Tallest canvas a renderer will allocate. The raster header cannot
/// address more lines.
pub const MAX_CANVAS_HEIGHT: usize = u16::MAX as usize;

/// Reject font sizes outside `1..=MAX_FONT_SIZE`.
pub fn check_font_size(size: u32) -> Result<()> {
    if size == 0 || size > MAX_FONT_SIZE {
        return Err(PrintError::Invariant(format!(
            "font_size {} outside 1..={}",
            size, MAX_FONT_SIZE
        )));
    }
    Ok(())
}

/// Run CPU-bound rendering on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PrintError::Invariant(format!("render task failed: {}", e)))?
}

/// Turns text jobs into bitmaps.
pub trait Renderer: Send + Sync {
    fn text(
        &self,
        text: &str,
        font_size: u32,
        alignment: Alignment,
        label: LabelDimensions,
    ) -> Result<Bitmap>;

    fn text_with_codes(
        &self,
        text: &str,
        font_size: u32,
        alignment: Alignment,
        label: LabelDimensions,
    ) -> Result<Bitmap>;
}

/// Spleen fonts, qrcode and barcoders.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelRenderer;

impl LabelRenderer {
    fn prepare(text: &str) -> String {
        text::expand_time(&text::normalize(text), Local::now().time())
    }
}

impl Renderer for LabelRenderer {
    fn text(
        &self,
        text: &str,
        font_size: u32,
        alignment: Alignment,
        label: LabelDimensions,
    ) -> Result<Bitmap> {
        text::render_text(&Self::prepare(text), font_size, alignment, label.width_px)
    }

    fn text_with_codes(
        &self,
        text: &str,
        font_size: u32,
        alignment: Alignment,
        label: LabelDimensions,
    ) -> Result<Bitmap> {
        codes::render_with_codes(&Self::prepare(text), font_size, alignment, label)
    }
}

/// Place `bitmap` on a head-wide canvas shifted by the calibration offsets.
///
/// X is clamped so the image stays on the head. A positive Y adds blank
/// rows on top; the canvas always grows by `|y_offset|` rows. Images wider
/// than the head are returned unchanged and get resized by the converter.
pub fn apply_offsets(bitmap: &Bitmap, x_offset: i32, y_offset: i32) -> Bitmap {
    let head = HEAD_WIDTH_DOTS as usize;
    if bitmap.width() > head {
        return bitmap.clone();
    }

    let max_x = (head - bitmap.width()) as i32;
    let paste_x = x_offset.clamp(0, max_x) as usize;
    let paste_y = y_offset.max(0) as usize;
    let height = bitmap.height() + y_offset.unsigned_abs() as usize;

    let mut canvas = Bitmap::new(head, height);
    canvas.blit(bitmap, paste_x, paste_y);
    canvas
}
