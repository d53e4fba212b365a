//! Bitmap → raster payload.
//!
//! Every line the M110 receives is exactly 48 bytes. Input of any other
//! width is first resized to 384 dots with nearest-neighbour sampling,
//! keeping the height. Partial-width transfers are never produced.

use crate::error::{PrintError, Result};
use crate::printer::config::{BYTES_PER_LINE, HEAD_WIDTH_DOTS};

use super::Bitmap;

const HEAD: usize = HEAD_WIDTH_DOTS as usize;

/// Packed scanlines ready to follow a `GS v 0` header.
///
/// Construction enforces `data.len() == height × 48` and `0 < height ≤ 65535`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPayload {
    data: Vec<u8>,
    height: u16,
}

impl RasterPayload {
    pub fn new(data: Vec<u8>, height: usize) -> Result<Self> {
        if height == 0 || height > u16::MAX as usize {
            return Err(PrintError::Invariant(format!(
                "raster height {} outside 1..=65535",
                height
            )));
        }
        if data.len() != height * BYTES_PER_LINE {
            return Err(PrintError::Invariant(format!(
                "payload is {} bytes, expected {} lines × {} = {}",
                data.len(),
                height,
                BYTES_PER_LINE,
                height * BYTES_PER_LINE
            )));
        }
        Ok(Self {
            data,
            height: height as u16,
        })
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Source column sampled for head column `x` when squeezing or stretching
/// `src_width` columns onto the head (pixel-centre mapping).
#[inline]
pub fn source_column(x: usize, src_width: usize) -> usize {
    (((2 * x + 1) * src_width) / (2 * HEAD)).min(src_width.saturating_sub(1))
}

/// Resize to exactly 384 dots wide, keeping the height.
pub fn resize_to_head(bitmap: &Bitmap) -> Bitmap {
    if bitmap.width() == HEAD {
        return bitmap.clone();
    }
    let columns: Vec<usize> = (0..HEAD)
        .map(|x| source_column(x, bitmap.width()))
        .collect();
    Bitmap::from_fn(HEAD, bitmap.height(), |x, y| bitmap.get(columns[x], y))
}

/// Pack a head-width row: bit `7 - (x mod 8)` of byte `x / 8`, 1 = black.
fn pack_line(row: &[bool], out: &mut Vec<u8>) {
    let start = out.len();
    out.resize(start + BYTES_PER_LINE, 0);
    for (x, &black) in row.iter().enumerate().take(HEAD) {
        if black {
            out[start + x / 8] |= 1 << (7 - (x % 8));
        }
    }
}

/// Convert a 1-bit image of any width into a payload of `height × 48` bytes.
pub fn to_payload(bitmap: &Bitmap) -> Result<RasterPayload> {
    if bitmap.width() == 0 {
        return Err(PrintError::Invariant("bitmap has zero width".to_string()));
    }
    let resized = resize_to_head(bitmap);

    let mut data = Vec::with_capacity(resized.height() * BYTES_PER_LINE);
    for y in 0..resized.height() {
        pack_line(resized.row(y), &mut data);
    }
    RasterPayload::new(data, resized.height())
}
