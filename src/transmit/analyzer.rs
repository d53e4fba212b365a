//! Payload density → speed class.
//!
//! Complexity is the fraction of non-zero bytes in the packed payload, not
//! the fraction of black dots: a single stray dot makes a whole byte count.
//! That is what loads the printer's input buffer.

use serde::Serialize;

use crate::settings::Settings;

/// Boundary between Fast and Normal.
pub const FAST_CEILING: f64 = 0.05;

/// Boundary between Slow and the dense tail.
pub const SLOW_CEILING: f64 = 0.12;

/// Transmission speed class, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SpeedClass {
    UltraFast,
    Fast,
    Normal,
    Slow,
    UltraSlow,
}

impl SpeedClass {
    pub const ALL: [SpeedClass; 5] = [
        Self::UltraFast,
        Self::Fast,
        Self::Normal,
        Self::Slow,
        Self::UltraSlow,
    ];

    /// Scanlines per block on the chunked path.
    pub fn lines_per_block(self) -> usize {
        match self {
            Self::UltraFast => 50,
            Self::Fast => 30,
            Self::Normal => 20,
            Self::Slow => 10,
            Self::UltraSlow => 5,
        }
    }

    /// Classes allowed to send small payloads in one write.
    pub fn allows_direct_write(self) -> bool {
        matches!(self, Self::UltraFast | Self::Fast)
    }
}

/// `nonzero_bytes / len`, in `[0, 1]`. Empty input is 0.
pub fn complexity(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let nonzero = data.iter().filter(|&&b| b != 0).count();
    nonzero as f64 / data.len() as f64
}

/// Pick a speed class for a payload of the given complexity.
///
/// | Complexity | Class |
/// |------------|-------|
/// | < `max_complexity_for_fast` | UltraFast |
/// | < 0.05 | Fast |
/// | < `min_complexity_for_slow` | Normal |
/// | < 0.12 | Slow |
/// | ≥ 0.12 | UltraSlow if `force_slow_for_complex`, else Slow |
///
/// With `adaptive_speed_enabled = false` the answer is always Normal.
pub fn classify(complexity: f64, settings: &Settings) -> SpeedClass {
    if !settings.adaptive_speed_enabled {
        return SpeedClass::Normal;
    }
    if complexity < settings.max_complexity_for_fast {
        SpeedClass::UltraFast
    } else if complexity < FAST_CEILING {
        SpeedClass::Fast
    } else if complexity < settings.min_complexity_for_slow {
        SpeedClass::Normal
    } else if complexity < SLOW_CEILING {
        SpeedClass::Slow
    } else if settings.force_slow_for_complex {
        SpeedClass::UltraSlow
    } else {
        SpeedClass::Slow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1000 bytes with `permille` of them non-zero.
    fn payload(permille: usize) -> Vec<u8> {
        let mut data = vec![0u8; 1000];
        data[..permille].fill(0x10);
        data
    }

    #[test]
    fn test_complexity() {
        assert_eq!(complexity(&[]), 0.0);
        assert_eq!(complexity(&[0, 0, 0, 0]), 0.0);
        assert_eq!(complexity(&[0xFF; 144]), 1.0);
        assert_eq!(complexity(&[0, 1, 0, 0x80]), 0.5);
    }

    #[test]
    fn test_default_plan_selection() {
        let settings = Settings::default();
        let classes: Vec<SpeedClass> = [0, 30, 60, 100, 150]
            .iter()
            .map(|&p| classify(complexity(&payload(p)), &settings))
            .collect();
        assert_eq!(classes, SpeedClass::ALL.to_vec());
    }

    #[test]
    fn test_dense_without_force_is_slow() {
        let settings = Settings {
            force_slow_for_complex: false,
            ..Settings::default()
        };
        assert_eq!(classify(0.9, &settings), SpeedClass::Slow);
    }

    #[test]
    fn test_adaptive_disabled_is_normal() {
        let settings = Settings {
            adaptive_speed_enabled: false,
            ..Settings::default()
        };
        assert_eq!(classify(0.0, &settings), SpeedClass::Normal);
        assert_eq!(classify(1.0, &settings), SpeedClass::Normal);
    }

    #[test]
    fn test_monotonic_in_black_bytes() {
        for settings in [
            Settings::default(),
            Settings {
                force_slow_for_complex: false,
                ..Settings::default()
            },
        ] {
            let mut previous = SpeedClass::UltraFast;
            for permille in 0..=1000 {
                let class = classify(complexity(&payload(permille)), &settings);
                assert!(class >= previous, "dropped at {}‰", permille);
                previous = class;
            }
        }
    }
}
