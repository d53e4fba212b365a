//! # Adaptive Transmission
//!
//! The M110 has a small input buffer. Dense rasters sent too fast overrun it,
//! and the symptom is horizontal drift on every following line. Pacing is
//! chosen per payload:
//!
//! 1. [`analyzer`] measures the payload's complexity (non-zero byte ratio)
//!    and picks a [`SpeedClass`].
//! 2. [`plan`] turns the class into block size and delays, scaled by
//!    `timing_multiplier`.
//! 3. [`engine`] writes `ESC @`, the `GS v 0` header and the payload blocks
//!    with those pauses, holding the link for the whole sequence.
//!
//! | Class | Lines/block | Block delay |
//! |-------|-------------|-------------|
//! | UltraFast | 50 | 5ms |
//! | Fast | 30 | 10ms |
//! | Normal | 20 | 20ms |
//! | Slow | 10 | 50ms |
//! | UltraSlow | 5 | 100ms |
//!
//! Payloads of at most 1024 bytes in the two fastest classes go out in a
//! single write.

pub mod analyzer;
pub mod engine;
pub mod plan;

pub use analyzer::{SpeedClass, classify, complexity};
pub use engine::{TransmissionReport, Transmitter};
pub use plan::{Delays, PlanSummary, TransmissionPlan};
