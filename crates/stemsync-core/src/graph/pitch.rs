//! Post-sum pitch shifting via signalsmith-stretch
//!
//! The stage runs with equal input and output lengths, so it never changes
//! tempo; it only transposes. Tempo comes from varispeed playback upstream,
//! and the semitone shift set here is what cancels (or adds to) the pitch
//! side effect of that varispeed.

use serde::{Deserialize, Serialize};
use signalsmith_stretch::Stretch;

/// Number of channels (stereo)
const CHANNELS: u32 = 2;

/// Largest shift accepted, in semitones either way
pub const MAX_PITCH_SEMITONES: f64 = 24.0;

/// Stretcher preset used for the pitch stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchQuality {
    /// signalsmith's default preset
    #[default]
    Default,
    /// 30-50% faster, slightly lower quality
    Cheaper,
}

/// Pitch shifter for one graph
pub struct PitchStage {
    stretcher: Stretch,
    semitones: f64,
}

impl PitchStage {
    /// Create a pitch stage at the given sample rate
    pub fn new(sample_rate: u32, quality: PitchQuality) -> Self {
        let stretcher = match quality {
            PitchQuality::Default => Stretch::preset_default(CHANNELS, sample_rate),
            PitchQuality::Cheaper => Stretch::preset_cheaper(CHANNELS, sample_rate),
        };

        Self {
            stretcher,
            semitones: 0.0,
        }
    }

    /// Set pitch shift in semitones (positive = up, negative = down)
    ///
    /// Clamped to two octaves either way; a 4x tempo ratio already needs 24.
    pub fn set_semitones(&mut self, semitones: f64) {
        self.semitones = semitones.clamp(-MAX_PITCH_SEMITONES, MAX_PITCH_SEMITONES);
        self.stretcher
            .set_transpose_factor_semitones(self.semitones as f32, None);
    }

    /// Current pitch shift in semitones
    pub fn semitones(&self) -> f64 {
        self.semitones
    }

    /// Total latency in frames
    pub fn latency(&self) -> usize {
        self.stretcher.input_latency() + self.stretcher.output_latency()
    }

    /// Reset the stretcher state
    pub fn reset(&mut self) {
        self.stretcher.reset();
    }

    /// Transpose an interleaved stereo block into an output block of the
    /// same length
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let len = input.len().min(output.len());
        output[..len].fill(0.0);
        self.stretcher.process(&input[..len], &mut output[..len]);
    }
}
