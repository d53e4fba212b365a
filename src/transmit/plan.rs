//! Delay table and block sizing per speed class.

use std::time::Duration;

use serde::Serialize;

use super::analyzer::{SpeedClass, classify, complexity};
use crate::printer::config::BYTES_PER_LINE;
use crate::raster::RasterPayload;
use crate::settings::Settings;

/// Payloads up to this size may go out in a single write.
pub const DIRECT_WRITE_LIMIT: usize = 1024;

/// Minimum pause between the end of one job and the start of the next.
pub const MIN_JOB_GAP: Duration = Duration::from_millis(150);

const fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Pauses around each stage of a raster transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delays {
    pub init: Duration,
    pub header: Duration,
    pub block: Duration,
    pub line: Duration,
    pub post: Duration,
}

impl Delays {
    /// Base delays before `timing_multiplier`.
    ///
    /// | Class | init | header | block | line | post |
    /// |-------|------|--------|-------|------|------|
    /// | UltraFast | 10ms | 5ms | 5ms | 1ms | 10ms |
    /// | Fast | 20ms | 10ms | 10ms | 2ms | 20ms |
    /// | Normal | 20ms | 10ms | 20ms | 5ms | 20ms |
    /// | Slow | 50ms | 20ms | 50ms | 10ms | 50ms |
    /// | UltraSlow | 100ms | 50ms | 100ms | 20ms | 100ms |
    pub const fn base(class: SpeedClass) -> Self {
        let (init, header, block, line, post) = match class {
            SpeedClass::UltraFast => (10, 5, 5, 1, 10),
            SpeedClass::Fast => (20, 10, 10, 2, 20),
            SpeedClass::Normal => (20, 10, 20, 5, 20),
            SpeedClass::Slow => (50, 20, 50, 10, 50),
            SpeedClass::UltraSlow => (100, 50, 100, 20, 100),
        };
        Self {
            init: ms(init),
            header: ms(header),
            block: ms(block),
            line: ms(line),
            post: ms(post),
        }
    }

    fn scaled(self, factor: f64) -> Self {
        Self {
            init: self.init.mul_f64(factor),
            header: self.header.mul_f64(factor),
            block: self.block.mul_f64(factor),
            line: self.line.mul_f64(factor),
            post: self.post.mul_f64(factor),
        }
    }
}

/// Everything the engine needs to pace one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionPlan {
    pub class: SpeedClass,
    pub complexity: f64,
    pub delays: Delays,
    pub lines_per_block: usize,
    /// Always a multiple of 48.
    pub block_size: usize,
}

impl TransmissionPlan {
    /// Effective plan for `class`: base delays × `timing_multiplier`, with
    /// UltraFast block and line delays halved in aggressive mode.
    pub fn new(class: SpeedClass, complexity: f64, settings: &Settings) -> Self {
        let mut delays = Delays::base(class).scaled(settings.timing_multiplier);
        if settings.adaptive_speed_aggressive && class == SpeedClass::UltraFast {
            delays.block /= 2;
            delays.line /= 2;
        }
        let lines_per_block = class.lines_per_block();
        Self {
            class,
            complexity,
            delays,
            lines_per_block,
            block_size: lines_per_block * BYTES_PER_LINE,
        }
    }

    /// Measure `payload` and build its plan.
    pub fn for_payload(payload: &RasterPayload, settings: &Settings) -> Self {
        let complexity = complexity(payload.data());
        Self::new(classify(complexity, settings), complexity, settings)
    }

    /// Whether a payload of `len` bytes goes out in one write.
    pub fn direct_write(&self, len: usize) -> bool {
        len <= DIRECT_WRITE_LIMIT && self.class.allows_direct_write()
    }

    /// `max(150ms, 2 × post_delay)`.
    pub fn job_gap(&self) -> Duration {
        MIN_JOB_GAP.max(self.delays.post * 2)
    }
}

/// Plan summary for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub class: SpeedClass,
    pub complexity: f64,
    pub block_size: usize,
    pub block_delay_ms: f64,
    pub post_delay_ms: f64,
}

impl From<&TransmissionPlan> for PlanSummary {
    fn from(plan: &TransmissionPlan) -> Self {
        Self {
            class: plan.class,
            complexity: plan.complexity,
            block_size: plan.block_size,
            block_delay_ms: plan.delays.block.as_secs_f64() * 1000.0,
            post_delay_ms: plan.delays.post.as_secs_f64() * 1000.0,
        }
    }
}
