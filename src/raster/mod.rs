//! # Raster Conversion
//!
//! Turns 1-bit images into the byte stream the `GS v 0` command expects.
//!
//! ```text
//! Bitmap (W × H)
//!     │  W ≠ 384: nearest-neighbour resize to 384 × H
//!     ▼
//! Bitmap (384 × H)
//!     │  pack: byte x/8, bit 7 - x%8, 1 = black
//!     ▼
//! RasterPayload (H × 48 bytes)
//! ```
//!
//! ## Example
//!
//! ```
//! use phomemo::raster::{Bitmap, to_payload};
//!
//! let mut bmp = Bitmap::new(384, 2);
//! bmp.set(0, 0, true);
//! let payload = to_payload(&bmp).unwrap();
//! assert_eq!(payload.len(), 96);
//! assert_eq!(payload.data()[0], 0x80);
//! ```

mod bitmap;
mod convert;

pub use bitmap::Bitmap;
pub use convert::{RasterPayload, resize_to_head, source_column, to_payload};
