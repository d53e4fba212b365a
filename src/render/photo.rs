//! Photo uploads: decode, scale to the label, reduce to 1 bit.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PrintError, Result};
use crate::printer::LabelDimensions;
use crate::raster::Bitmap;
use crate::settings::Settings;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// Shrink or grow to fit inside the label, keeping proportions.
    FitAspect,
    /// Fill the label exactly, distorting if needed.
    StretchFull,
    /// Fill the label, cropping the overflow around the center.
    CropCenter,
    /// Fit inside the label and center on a white label-sized canvas.
    PadCenter,
}

impl ScalingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fit_aspect" => Some(ScalingMode::FitAspect),
            "stretch_full" => Some(ScalingMode::StretchFull),
            "crop_center" => Some(ScalingMode::CropCenter),
            "pad_center" => Some(ScalingMode::PadCenter),
            _ => None,
        }
    }
}

/// Per-upload processing knobs. Defaults come from [`Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    /// `None` keeps the source size.
    pub scaling: Option<ScalingMode>,
    pub dither: bool,
    pub threshold: u8,
    pub strength: f64,
    pub contrast: f64,
}

impl ImageOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scaling: scaling_for(settings.fit_to_label_default, settings.maintain_aspect_default),
            dither: settings.dither_enabled,
            threshold: settings.dither_threshold,
            strength: settings.dither_strength,
            contrast: settings.contrast_boost,
        }
    }
}

/// Map the two upload checkboxes onto a scaling mode.
pub fn scaling_for(fit_to_label: bool, maintain_aspect: bool) -> Option<ScalingMode> {
    match (fit_to_label, maintain_aspect) {
        (false, _) => None,
        (true, true) => Some(ScalingMode::PadCenter),
        (true, false) => Some(ScalingMode::StretchFull),
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(PrintError::Invariant("empty image upload".into()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(PrintError::Invariant(format!(
            "image is {} bytes, limit is {}",
            bytes.len(),
            MAX_UPLOAD_BYTES
        )));
    }
    image::load_from_memory(bytes)
        .map_err(|e| PrintError::Invariant(format!("cannot decode image: {}", e)))
}

/// Scale `img` to the label according to `mode` and convert to grayscale.
pub fn fit(img: &DynamicImage, mode: Option<ScalingMode>, label: LabelDimensions) -> GrayImage {
    let (w, h) = (label.width_px as u32, label.height_px as u32);
    match mode {
        None => img.to_luma8(),
        Some(ScalingMode::FitAspect) => img.resize(w, h, FilterType::Lanczos3).to_luma8(),
        Some(ScalingMode::StretchFull) => img.resize_exact(w, h, FilterType::Lanczos3).to_luma8(),
        Some(ScalingMode::CropCenter) => img.resize_to_fill(w, h, FilterType::Lanczos3).to_luma8(),
        Some(ScalingMode::PadCenter) => {
            let inner = img.resize(w, h, FilterType::Lanczos3).to_luma8();
            let mut canvas = GrayImage::from_pixel(w, h, Luma([255]));
            let x = (w - inner.width()) / 2;
            let y = (h - inner.height()) / 2;
            imageops::overlay(&mut canvas, &inner, x as i64, y as i64);
            canvas
        }
    }
}

/// Stretch luma around mid-gray by `factor`.
pub fn adjust_contrast(gray: &mut GrayImage, factor: f64) {
    if (factor - 1.0).abs() < f64::EPSILON {
        return;
    }
    for p in gray.pixels_mut() {
        let v = (p.0[0] as f64 - 128.0) * factor + 128.0;
        p.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
}

/// Apply gamma `1 / strength`: strengths above 1 lighten midtones, below 1
/// darken them.
pub fn apply_gamma(gray: &mut GrayImage, strength: f64) {
    if strength <= 0.0 || (strength - 1.0).abs() < f64::EPSILON {
        return;
    }
    let gamma = 1.0 / strength;
    for p in gray.pixels_mut() {
        let v = (p.0[0] as f64 / 255.0).powf(gamma) * 255.0;
        p.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
}

/// Floyd-Steinberg error diffusion around `threshold`.
///
/// ```text
///        X   7/16
/// 3/16  5/16  1/16
/// ```
pub fn floyd_steinberg(gray: &GrayImage, threshold: u8) -> Bitmap {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let mut buf: Vec<f32> = gray.pixels().map(|p| p.0[0] as f32).collect();
    let mut out = Bitmap::new(w, h);
    let cut = threshold as f32;

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let old = buf[i];
            let black = old < cut;
            let new = if black { 0.0 } else { 255.0 };
            out.set(x, y, black);

            let err = old - new;
            if x + 1 < w {
                buf[i + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < h {
                if x > 0 {
                    buf[i + w - 1] += err * 3.0 / 16.0;
                }
                buf[i + w] += err * 5.0 / 16.0;
                if x + 1 < w {
                    buf[i + w + 1] += err * 1.0 / 16.0;
                }
            }
        }
    }
    out
}

/// Full upload path: decode, scale, tone, 1-bit.
pub fn process(bytes: &[u8], options: &ImageOptions, label: LabelDimensions) -> Result<Bitmap> {
    let img = decode(bytes)?;
    let mut gray = fit(&img, options.scaling, label);
    adjust_contrast(&mut gray, options.contrast);

    let bitmap = if options.dither {
        apply_gamma(&mut gray, options.strength);
        floyd_steinberg(&gray, 128)
    } else {
        Bitmap::from_gray(&gray, options.threshold)
    };

    debug!(
        source_w = img.width(),
        source_h = img.height(),
        width = bitmap.width(),
        height = bitmap.height(),
        dither = options.dither,
        "image processed"
    );
    Ok(bitmap)
}
