//! Engine-wide defaults

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::OutputConfig;
use crate::engine::{TrackSettings, BASELINE_PCT, DEFAULT_VOLUME_RAMP};
use crate::graph::PitchQuality;

/// Default transport jump in seconds
pub const DEFAULT_JUMP_SECONDS: f64 = 10.0;

/// Engine configuration, usually read from `engine.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output device and stream settings
    pub output: OutputConfig,
    /// Stretcher preset for the pitch stage
    pub pitch_quality: PitchQuality,
    /// Length of volume ramps in milliseconds
    pub volume_ramp_ms: u64,
    /// Starting and reset volume of every stem, in percent
    pub baseline_pct: f64,
    /// Step used by the player's jump commands when none is given
    pub jump_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            pitch_quality: PitchQuality::default(),
            volume_ramp_ms: DEFAULT_VOLUME_RAMP.as_millis() as u64,
            baseline_pct: BASELINE_PCT,
            jump_seconds: DEFAULT_JUMP_SECONDS,
        }
    }
}

impl EngineConfig {
    /// Per-track settings derived from this config
    pub fn track_settings(&self) -> TrackSettings {
        TrackSettings {
            baseline_pct: self.baseline_pct.clamp(0.0, 100.0),
            volume_ramp: Duration::from_millis(self.volume_ramp_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_constants() {
        let config = EngineConfig::default();
        let settings = config.track_settings();
        assert_eq!(settings, TrackSettings::default());
        assert_eq!(config.jump_seconds, DEFAULT_JUMP_SECONDS);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str("pitch_quality: cheaper\nvolume_ramp_ms: 250\n").unwrap();
        assert_eq!(config.pitch_quality, PitchQuality::Cheaper);
        assert_eq!(config.track_settings().volume_ramp, Duration::from_millis(250));
        assert_eq!(config.baseline_pct, BASELINE_PCT);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_baseline_is_clamped() {
        let config = EngineConfig {
            baseline_pct: 180.0,
            ..Default::default()
        };
        assert_eq!(config.track_settings().baseline_pct, 100.0);
    }
}
