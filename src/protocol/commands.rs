//! # M110 Protocol Commands
//!
//! The M110 understands a small ESC/POS subset. Only the commands the print
//! pipeline emits are implemented here.
//!
//! | Command | Hex | Purpose |
//! |---------|-----|---------|
//! | `ESC @` | `1B 40` | reset / heartbeat |
//! | `ESC 3 n` | `1B 33 n` | line spacing |
//! | `ESC a n` | `1B 61 n` | alignment |
//! | `GS v 0` | `1D 76 30` | raster bitmap, see [`super::graphics`] |
//!
//! ## Byte Order
//!
//! Multi-byte integers are **little-endian**: `u16` 0x1234 goes out as
//! `[0x34, 0x12]`.

use serde::{Deserialize, Serialize};

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Graphics command prefix
pub const GS: u8 = 0x1D;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Resets the printer to its power-on state. Sent at the start of every
/// raster job and used on its own as the connection heartbeat.
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
///
/// ```
/// use phomemo::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Set Line Spacing (ESC 3 n)
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC 3 n |
/// | Hex     | 1B 33 n |
#[inline]
pub fn line_spacing(n: u8) -> Vec<u8> {
    vec![ESC, b'3', n]
}

/// Horizontal alignment for `ESC a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

impl Alignment {
    pub fn code(self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Center => 1,
            Self::Right => 2,
        }
    }

    /// Parse a form value; unknown values fall back to center.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Self::Left,
            "right" => Self::Right,
            _ => Self::Center,
        }
    }
}

/// # Select Justification (ESC a n)
///
/// | n | Alignment |
/// |---|-----------|
/// | 0 | left |
/// | 1 | center |
/// | 2 | right |
#[inline]
pub fn align(alignment: Alignment) -> Vec<u8> {
    vec![ESC, b'a', alignment.code()]
}

/// The command sequence of an explicit `init` job.
///
/// Each element is written separately with a pause in between:
/// `ESC @`, `ESC 3 00`, `ESC a 01`.
pub fn init_sequence() -> [Vec<u8>; 3] {
    [init(), line_spacing(0), align(Alignment::Center)]
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes.
///
/// ```
/// use phomemo::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x0130), [0x30, 0x01]);
/// assert_eq!(u16_le(48), [48, 0]);
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert_eq!(init(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_line_spacing() {
        assert_eq!(line_spacing(0), vec![0x1B, 0x33, 0x00]);
        assert_eq!(line_spacing(30), vec![0x1B, 0x33, 30]);
    }

    #[test]
    fn test_align() {
        assert_eq!(align(Alignment::Left), vec![0x1B, 0x61, 0]);
        assert_eq!(align(Alignment::Center), vec![0x1B, 0x61, 1]);
        assert_eq!(align(Alignment::Right), vec![0x1B, 0x61, 2]);
    }

    #[test]
    fn test_init_sequence() {
        let seq = init_sequence();
        assert_eq!(seq[0], vec![0x1B, 0x40]);
        assert_eq!(seq[1], vec![0x1B, 0x33, 0x00]);
        assert_eq!(seq[2], vec![0x1B, 0x61, 0x01]);
    }

    #[test]
    fn test_alignment_parse() {
        assert_eq!(Alignment::parse("LEFT"), Alignment::Left);
        assert_eq!(Alignment::parse("right"), Alignment::Right);
        assert_eq!(Alignment::parse("middle"), Alignment::Center);
    }

    #[test]
    fn test_u16_le() {
        assert_eq!(u16_le(0), [0, 0]);
        assert_eq!(u16_le(255), [255, 0]);
        assert_eq!(u16_le(256), [0, 1]);
        assert_eq!(u16_le(0xFFFF), [0xFF, 0xFF]);
    }
}
