//! # Raster Bitmap Command (GS v 0)
//!
//! The M110 prints images through a single raster command: an 8-byte header
//! followed by `x × y` bytes of packed scanlines.
//!
//! ## Bit Packing
//!
//! - Bit 7 (MSB) = leftmost dot
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```
//!
//! Scanlines run top to bottom. The M110 only accepts full-width lines of
//! 48 bytes; narrower transfers desynchronize every following line.

use super::commands::{GS, u16_le};

/// Raster header length in bytes.
pub const RASTER_HEADER_LEN: usize = 8;

/// # Print Raster Bit Image (GS v 0 m xL xH yL yH)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH d1...dk |
/// | Hex     | 1D 76 30 m xL xH yL yH d1...dk |
///
/// ## Parameters
///
/// - `m`: mode, always 0 (normal density)
/// - `xL xH`: bytes per line, must be 48 on the M110
/// - `yL yH`: number of lines
///
/// ## Example
///
/// ```
/// use phomemo::protocol::graphics;
///
/// let header = graphics::raster_header(48, 3);
/// assert_eq!(header, [0x1D, 0x76, 0x30, 0x00, 0x30, 0x00, 0x03, 0x00]);
/// ```
pub fn raster_header(width_bytes: u16, height: u16) -> [u8; RASTER_HEADER_LEN] {
    let [xl, xh] = u16_le(width_bytes);
    let [yl, yh] = u16_le(height);
    [GS, b'v', b'0', 0, xl, xh, yl, yh]
}

/// Decode `(width_bytes, height)` from a raster header.
///
/// Returns `None` if the slice is not a `GS v 0` header.
pub fn parse_raster_header(bytes: &[u8]) -> Option<(u16, u16)> {
    match bytes {
        [GS, b'v', b'0', _, xl, xh, yl, yh, ..] => Some((
            u16::from_le_bytes([*xl, *xh]),
            u16::from_le_bytes([*yl, *yh]),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        assert_eq!(
            raster_header(48, 0x0203),
            [0x1D, 0x76, 0x30, 0x00, 0x30, 0x00, 0x03, 0x02]
        );
    }

    #[test]
    fn test_parse_header() {
        let header = raster_header(48, 240);
        assert_eq!(parse_raster_header(&header), Some((48, 240)));
        assert_eq!(parse_raster_header(&[0x1B, 0x40]), None);
    }
}
