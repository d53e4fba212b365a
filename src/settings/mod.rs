//! # Printer Settings
//!
//! Mutable, persisted configuration read by every pipeline stage.
//!
//! | Key | Type | Range | Default |
//! |-----|------|-------|---------|
//! | `x_offset` | int | 0..=100 | 0 |
//! | `y_offset` | int | -50..=50 | 0 |
//! | `dither_enabled` | bool | | true |
//! | `dither_threshold` | int | 0..=255 | 128 |
//! | `dither_strength` | float | 0.1..=2.0 | 1.0 |
//! | `contrast_boost` | float | 0.5..=2.0 | 1.0 |
//! | `fit_to_label_default` | bool | | true |
//! | `maintain_aspect_default` | bool | | true |
//! | `auto_connect` | bool | | true |
//! | `adaptive_speed_enabled` | bool | | true |
//! | `adaptive_speed_aggressive` | bool | | false |
//! | `timing_multiplier` | float | > 0 | 1.0 |
//! | `max_complexity_for_fast` | float | 0..=1 | 0.02 |
//! | `min_complexity_for_slow` | float | 0..=1 | 0.08 |
//! | `force_slow_for_complex` | bool | | true |
//! | `label_size` | key | see [`LabelSize`] | `40x30` |
//!
//! Updates arrive as a [`SettingsPatch`]. A patch is validated as a whole:
//! one bad field rejects it and nothing changes.

mod store;

pub use store::{JsonFileBackend, MemoryBackend, SettingsBackend, SettingsStore};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{PrintError, Result};
use crate::printer::LabelSize;

pub const MIN_X_OFFSET: i32 = 0;
pub const MAX_X_OFFSET: i32 = 100;
pub const MIN_Y_OFFSET: i32 = -50;
pub const MAX_Y_OFFSET: i32 = 50;

/// Upper bound accepted for `timing_multiplier`.
pub const MAX_TIMING_MULTIPLIER: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub x_offset: i32,
    pub y_offset: i32,
    pub dither_enabled: bool,
    pub dither_threshold: u8,
    pub dither_strength: f64,
    pub contrast_boost: f64,
    pub fit_to_label_default: bool,
    pub maintain_aspect_default: bool,
    pub auto_connect: bool,
    pub adaptive_speed_enabled: bool,
    pub adaptive_speed_aggressive: bool,
    pub timing_multiplier: f64,
    pub max_complexity_for_fast: f64,
    pub min_complexity_for_slow: f64,
    pub force_slow_for_complex: bool,
    pub label_size: LabelSize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            x_offset: 0,
            y_offset: 0,
            dither_enabled: true,
            dither_threshold: 128,
            dither_strength: 1.0,
            contrast_boost: 1.0,
            fit_to_label_default: true,
            maintain_aspect_default: true,
            auto_connect: true,
            adaptive_speed_enabled: true,
            adaptive_speed_aggressive: false,
            timing_multiplier: 1.0,
            max_complexity_for_fast: 0.02,
            min_complexity_for_slow: 0.08,
            force_slow_for_complex: true,
            label_size: LabelSize::default(),
        }
    }
}

/// Partial update. Absent fields stay as they are; unknown keys are an error.
///
/// Numeric fields are read wide (`i64`) so out-of-range values reach
/// validation instead of failing deserialization with a less useful message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    pub x_offset: Option<i64>,
    pub y_offset: Option<i64>,
    pub dither_enabled: Option<bool>,
    pub dither_threshold: Option<i64>,
    pub dither_strength: Option<f64>,
    pub contrast_boost: Option<f64>,
    pub fit_to_label_default: Option<bool>,
    pub maintain_aspect_default: Option<bool>,
    pub auto_connect: Option<bool>,
    pub adaptive_speed_enabled: Option<bool>,
    pub adaptive_speed_aggressive: Option<bool>,
    pub timing_multiplier: Option<f64>,
    pub max_complexity_for_fast: Option<f64>,
    pub min_complexity_for_slow: Option<f64>,
    pub force_slow_for_complex: Option<bool>,
    pub label_size: Option<LabelSize>,
}

fn int_in(name: &str, value: i64, min: i64, max: i64) -> Result<i64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(PrintError::Invariant(format!(
            "{} = {} outside [{}, {}]",
            name, value, min, max
        )))
    }
}

fn float_in(name: &str, value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(PrintError::Invariant(format!(
            "{} = {} outside [{}, {}]",
            name, value, min, max
        )))
    }
}

impl SettingsPatch {
    /// Parse a JSON object into a patch. Unknown keys and wrong types are
    /// `Invariant` errors.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| PrintError::Invariant(format!("invalid settings patch: {}", e)))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validate every present field and produce the updated record.
    /// `base` is never modified; on error no field of the result exists.
    pub fn apply(&self, base: &Settings) -> Result<Settings> {
        let mut next = base.clone();

        if let Some(v) = self.x_offset {
            next.x_offset =
                int_in("x_offset", v, MIN_X_OFFSET as i64, MAX_X_OFFSET as i64)? as i32;
        }
        if let Some(v) = self.y_offset {
            next.y_offset =
                int_in("y_offset", v, MIN_Y_OFFSET as i64, MAX_Y_OFFSET as i64)? as i32;
        }
        if let Some(v) = self.dither_threshold {
            next.dither_threshold = int_in("dither_threshold", v, 0, 255)? as u8;
        }
        if let Some(v) = self.dither_strength {
            next.dither_strength = float_in("dither_strength", v, 0.1, 2.0)?;
        }
        if let Some(v) = self.contrast_boost {
            next.contrast_boost = float_in("contrast_boost", v, 0.5, 2.0)?;
        }
        if let Some(v) = self.timing_multiplier {
            if v <= 0.0 {
                return Err(PrintError::Invariant(format!(
                    "timing_multiplier = {} must be > 0",
                    v
                )));
            }
            next.timing_multiplier = float_in("timing_multiplier", v, 0.0, MAX_TIMING_MULTIPLIER)?;
        }
        if let Some(v) = self.max_complexity_for_fast {
            next.max_complexity_for_fast = float_in("max_complexity_for_fast", v, 0.0, 1.0)?;
        }
        if let Some(v) = self.min_complexity_for_slow {
            next.min_complexity_for_slow = float_in("min_complexity_for_slow", v, 0.0, 1.0)?;
        }

        if let Some(v) = self.dither_enabled {
            next.dither_enabled = v;
        }
        if let Some(v) = self.fit_to_label_default {
            next.fit_to_label_default = v;
        }
        if let Some(v) = self.maintain_aspect_default {
            next.maintain_aspect_default = v;
        }
        if let Some(v) = self.auto_connect {
            next.auto_connect = v;
        }
        if let Some(v) = self.adaptive_speed_enabled {
            next.adaptive_speed_enabled = v;
        }
        if let Some(v) = self.adaptive_speed_aggressive {
            next.adaptive_speed_aggressive = v;
        }
        if let Some(v) = self.force_slow_for_complex {
            next.force_slow_for_complex = v;
        }
        if let Some(v) = self.label_size {
            next.label_size = v;
        }

        Ok(next)
    }
}

impl Settings {
    /// Build settings from a stored JSON object, key by key.
    ///
    /// A key with a bad type or out-of-range value keeps its default and is
    /// logged; unknown keys are ignored. Only a non-object document fails.
    pub fn from_stored(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(PrintError::Invariant(
                "settings file is not a JSON object".to_string(),
            ));
        };

        let mut settings = Self::default();
        for (key, value) in map {
            let mut single = Map::new();
            single.insert(key.clone(), value);
            let applied = SettingsPatch::from_json(Value::Object(single))
                .and_then(|patch| patch.apply(&settings));
            match applied {
                Ok(next) => settings = next,
                Err(e) => warn!(key = %key, error = %e, "ignoring stored setting"),
            }
        }
        Ok(settings)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_out_of_range_rejects_whole_patch() {
        let base = Settings::default();
        let patch = SettingsPatch::from_json(json!({
            "dither_threshold": 200,
            "x_offset": 9999
        }))
        .unwrap();

        let err = patch.apply(&base).unwrap_err();
        assert!(err.to_string().starts_with("Invariant: x_offset"));
    }

    #[test]
    fn test_valid_patch_changes_only_named_fields() {
        let base = Settings::default();
        let patch = SettingsPatch::from_json(json!({
            "x_offset": 12,
            "y_offset": -20,
            "timing_multiplier": 1.5,
            "label_size": "50x30"
        }))
        .unwrap();

        let next = patch.apply(&base).unwrap();
        assert_eq!(next.x_offset, 12);
        assert_eq!(next.y_offset, -20);
        assert_eq!(next.timing_multiplier, 1.5);
        assert_eq!(next.label_size, LabelSize::Mm50x30);
        assert_eq!(next.dither_threshold, base.dither_threshold);
    }

    #[test]
    fn test_range_edges() {
        let base = Settings::default();
        let ok = |v: Value| SettingsPatch::from_json(v).unwrap().apply(&base).is_ok();

        assert!(ok(json!({"x_offset": 0})));
        assert!(ok(json!({"x_offset": 100})));
        assert!(!ok(json!({"x_offset": -1})));
        assert!(ok(json!({"y_offset": -50})));
        assert!(!ok(json!({"y_offset": 51})));
        assert!(ok(json!({"dither_strength": 0.1})));
        assert!(!ok(json!({"dither_strength": 2.5})));
        assert!(!ok(json!({"contrast_boost": 0.4})));
        assert!(!ok(json!({"timing_multiplier": 0.0})));
        assert!(ok(json!({"timing_multiplier": 20.0})));
        assert!(!ok(json!({"max_complexity_for_fast": 1.5})));
        assert!(!ok(json!({"dither_threshold": 256})));
    }

    #[test]
    fn test_unknown_key_and_bad_type_rejected() {
        assert!(SettingsPatch::from_json(json!({"x_ofset": 1})).is_err());
        assert!(SettingsPatch::from_json(json!({"auto_connect": "yes"})).is_err());
        assert!(SettingsPatch::from_json(json!({"label_size": "10x10"})).is_err());
    }

    #[test]
    fn test_from_stored_is_lenient_per_key() {
        let settings = Settings::from_stored(json!({
            "x_offset": 40,
            "y_offset": 500,
            "dither_enabled": "maybe",
            "debug_mode": true
        }))
        .unwrap();

        assert_eq!(settings.x_offset, 40);
        assert_eq!(settings.y_offset, 0);
        assert!(settings.dither_enabled);

        assert!(Settings::from_stored(json!([1, 2])).is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let settings = Settings {
            x_offset: 7,
            label_size: LabelSize::Mm25x25,
            ..Settings::default()
        };
        let restored = Settings::from_stored(settings.to_json()).unwrap();
        assert_eq!(restored, settings);
    }
}
