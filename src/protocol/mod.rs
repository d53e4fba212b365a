//! # M110 Protocol Implementation
//!
//! Low-level command builders for the ESC/POS subset the Phomemo M110
//! understands.
//!
//! ## Module Structure
//!
//! - [`commands`]: reset, line spacing, alignment
//! - [`graphics`]: the `GS v 0` raster header
//!
//! ## Usage Example
//!
//! ```
//! use phomemo::protocol::{commands, graphics};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(graphics::raster_header(48, 2));
//! data.extend(vec![0x00; 48 * 2]);
//! assert_eq!(data.len(), 2 + 8 + 96);
//! ```

pub mod commands;
pub mod graphics;
