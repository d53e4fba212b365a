//! # Printer Module
//!
//! Hardware specifications for the M110 and its label media.
//!
//! ## Modules
//!
//! - [`config`]: Printer and label specifications

pub mod config;

pub use config::{LabelDimensions, LabelSize, PrinterConfig, is_valid_mac};
