//! # Printer Configuration
//!
//! Hardware specifications for the Phomemo M110 and the label media it takes.
//!
//! | Model | Head width | Bytes/line | Resolution |
//! |-------|------------|------------|------------|
//! | M110 | 384 dots | 48 | 203 DPI |
//!
//! ## Usage
//!
//! ```
//! use phomemo::printer::{LabelSize, PrinterConfig};
//!
//! let config = PrinterConfig::m110("AA:BB:CC:DD:EE:FF", "/dev/rfcomm0");
//! assert_eq!(config.bytes_per_line, 48);
//!
//! let label = LabelSize::Mm40x30.dims();
//! assert_eq!((label.width_px, label.height_px), (319, 239));
//! ```

use serde::{Deserialize, Serialize};

/// Head resolution in dots per inch.
pub const DPI: u16 = 203;

/// Printable dots across the head.
pub const HEAD_WIDTH_DOTS: u16 = 384;

/// Raster bytes per scanline (`HEAD_WIDTH_DOTS / 8`).
pub const BYTES_PER_LINE: usize = 48;

/// Default RFCOMM device node.
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Placeholder address used when none is configured.
pub const DEFAULT_MAC: &str = "00:00:00:00:00:00";

/// Convert millimetres to dots at 203 DPI, truncating.
///
/// ```text
/// px = floor(mm / 25.4 × 203)
/// 25mm → 199, 30mm → 239, 40mm → 319, 50mm → 399, 80mm → 639
/// ```
#[inline]
pub fn mm_to_dots(mm: u16) -> u16 {
    (mm as u32 * DPI as u32 * 10 / 254) as u16
}

/// # Label Size
///
/// Closed set of label media. Keys match the `label_size` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LabelSize {
    #[serde(rename = "25x25")]
    Mm25x25,
    #[default]
    #[serde(rename = "40x30")]
    Mm40x30,
    #[serde(rename = "50x30")]
    Mm50x30,
    #[serde(rename = "30x50")]
    Mm30x50,
    #[serde(rename = "50x80")]
    Mm50x80,
    #[serde(rename = "80x50")]
    Mm80x50,
}

/// Physical and pixel dimensions of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelDimensions {
    pub width_mm: u16,
    pub height_mm: u16,
    pub width_px: usize,
    pub height_px: usize,
}

impl LabelSize {
    pub const ALL: [LabelSize; 6] = [
        Self::Mm25x25,
        Self::Mm40x30,
        Self::Mm50x30,
        Self::Mm30x50,
        Self::Mm50x80,
        Self::Mm80x50,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Mm25x25 => "25x25",
            Self::Mm40x30 => "40x30",
            Self::Mm50x30 => "50x30",
            Self::Mm30x50 => "30x50",
            Self::Mm50x80 => "50x80",
            Self::Mm80x50 => "80x50",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    fn mm(self) -> (u16, u16) {
        match self {
            Self::Mm25x25 => (25, 25),
            Self::Mm40x30 => (40, 30),
            Self::Mm50x30 => (50, 30),
            Self::Mm30x50 => (30, 50),
            Self::Mm50x80 => (50, 80),
            Self::Mm80x50 => (80, 50),
        }
    }

    /// Nominal size in millimetres and dots.
    ///
    /// Widths above the head (50mm and 80mm media) are reported as-is; the
    /// raster converter squeezes them to 384 dots.
    pub fn dims(self) -> LabelDimensions {
        let (width_mm, height_mm) = self.mm();
        LabelDimensions {
            width_mm,
            height_mm,
            width_px: mm_to_dots(width_mm) as usize,
            height_px: mm_to_dots(height_mm) as usize,
        }
    }

    /// Human-readable name, e.g. `40×30mm`.
    pub fn display_name(self) -> String {
        let (w, h) = self.mm();
        format!("{}×{}mm", w, h)
    }
}

/// # Printer Configuration
///
/// Immutable after construction. Describes one physical M110 reachable
/// through one RFCOMM node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Bluetooth address, `XX:XX:XX:XX:XX:XX`
    pub mac_address: String,

    /// Character device the printer is bound to
    pub device_path: String,

    /// N in `/dev/rfcommN`
    pub rfcomm_index: u8,

    /// RFCOMM channel (SPP is 1)
    pub rfcomm_channel: u8,

    pub head_width: u16,
    pub bytes_per_line: usize,
    pub dpi: u16,
}

impl PrinterConfig {
    /// Configuration for a Phomemo M110.
    pub fn m110(mac_address: impl Into<String>, device_path: impl Into<String>) -> Self {
        let device_path = device_path.into();
        Self {
            mac_address: mac_address.into().to_uppercase(),
            rfcomm_index: rfcomm_index_of(&device_path).unwrap_or(0),
            device_path,
            rfcomm_channel: 1,
            head_width: HEAD_WIDTH_DOTS,
            bytes_per_line: BYTES_PER_LINE,
            dpi: DPI,
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.rfcomm_channel = channel;
        self
    }

    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::m110(DEFAULT_MAC, DEFAULT_DEVICE)
    }
}

/// Extract N from a `/dev/rfcommN` path.
fn rfcomm_index_of(path: &str) -> Option<u8> {
    path.rsplit('/')
        .next()?
        .strip_prefix("rfcomm")?
        .parse()
        .ok()
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}
