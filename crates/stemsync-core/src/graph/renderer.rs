//! Audio-side half of a stem graph
//!
//! ```text
//!  stem 0 ─► varispeed read ─► gain/mute ─┐
//!  stem 1 ─► varispeed read ─► gain/mute ─┼─► sum ─► pitch stage ─► output
//!  stem N ─► varispeed read ─► gain/mute ─┘
//! ```
//!
//! The renderer owns everything it touches while rendering. It is driven
//! either by a cpal output callback or, offline, by whoever holds the shared
//! renderer (bounces and tests).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use super::command::GraphCommand;
use super::pitch::{PitchQuality, PitchStage};
use crate::backend::StemLevel;
use crate::types::{Sample, StereoBuffer, StereoSample};

/// Largest block rendered in one pass; longer requests are split
pub const MAX_BLOCK_SIZE: usize = 8192;

/// Convert decibels to a linear gain factor
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Lock-free state published by the renderer
///
/// The rendered frame count is the graph's engine clock. The control side
/// reads it with relaxed loads; only visibility matters.
pub struct GraphAtomics {
    frames_rendered: AtomicU64,
    sample_rate: u32,
}

impl GraphAtomics {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames_rendered: AtomicU64::new(0),
            sample_rate,
        }
    }

    /// Frames rendered so far (lock-free)
    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Engine time in seconds (lock-free)
    #[inline]
    pub fn now(&self) -> f64 {
        self.frames_rendered() as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Linear-in-decibels gain ramp
///
/// Ramping in dB rather than in amplitude keeps a fade perceptually even.
#[derive(Debug, Clone)]
pub struct GainRamp {
    current_db: f32,
    target_db: f32,
    step_db: f32,
    remaining: u32,
    linear: f32,
}

impl GainRamp {
    pub fn new(db: f32) -> Self {
        Self {
            current_db: db,
            target_db: db,
            step_db: 0.0,
            remaining: 0,
            linear: db_to_linear(db),
        }
    }

    /// Start a ramp from the current level to `target_db` over `frames`
    pub fn ramp_to(&mut self, target_db: f32, frames: u32) {
        self.target_db = target_db;
        if frames == 0 {
            self.current_db = target_db;
            self.remaining = 0;
            self.linear = db_to_linear(target_db);
        } else {
            self.step_db = (target_db - self.current_db) / frames as f32;
            self.remaining = frames;
        }
    }

    /// Advance one frame and return the linear gain for it
    #[inline]
    pub fn next_gain(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current_db = if self.remaining == 0 {
                self.target_db
            } else {
                self.current_db + self.step_db
            };
            self.linear = db_to_linear(self.current_db);
        }
        self.linear
    }

    /// Current level in dB
    pub fn current_db(&self) -> f32 {
        self.current_db
    }

    /// Whether a ramp is still in progress
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

/// Read cursor of a started stem voice
#[derive(Debug, Clone, Copy, PartialEq)]
struct VoiceCursor {
    /// Engine frame at which the voice becomes audible
    start_frame: u64,
    /// Fractional frame position in the stem's audio
    read_pos: f64,
}

/// One stem's playback state
struct StemVoice {
    audio: Shared<StereoBuffer>,
    gain: GainRamp,
    muted: bool,
    cursor: Option<VoiceCursor>,
}

impl StemVoice {
    fn set_level(&mut self, level: StemLevel, ramp_frames: u32) {
        match level {
            StemLevel::Muted => self.muted = true,
            StemLevel::Db(db) => {
                self.muted = false;
                self.gain.ramp_to(db, ramp_frames);
            }
        }
    }

    /// Add this voice's contribution for one block into `mix`
    fn render_into(&mut self, mix: &mut [StereoSample], block_start: u64, rate: f64) {
        for (i, slot) in mix.iter_mut().enumerate() {
            let gain: Sample = self.gain.next_gain();
            let Some(cursor) = self.cursor.as_mut() else {
                continue;
            };
            if block_start + (i as u64) < cursor.start_frame {
                continue;
            }
            if !self.muted {
                *slot += self.audio.sample_at(cursor.read_pos) * gain;
            }
            cursor.read_pos += rate;
        }
    }
}

/// The audio-side renderer of a stem graph
pub struct GraphRenderer {
    command_rx: rtrb::Consumer<GraphCommand>,
    voices: Vec<StemVoice>,
    rate: f64,
    pitch: PitchStage,
    /// Pre-allocated stem sum, capacity MAX_BLOCK_SIZE
    mix: StereoBuffer,
    /// Next frame to render
    frame: u64,
    atomics: Arc<GraphAtomics>,
}

impl GraphRenderer {
    /// Create a renderer over decoded stems, all at `initial_db`
    pub fn new(
        stems: Vec<Shared<StereoBuffer>>,
        initial_db: f32,
        quality: PitchQuality,
        command_rx: rtrb::Consumer<GraphCommand>,
        atomics: Arc<GraphAtomics>,
    ) -> Self {
        let voices = stems
            .into_iter()
            .map(|audio| StemVoice {
                audio,
                gain: GainRamp::new(initial_db),
                muted: false,
                cursor: None,
            })
            .collect();

        Self {
            command_rx,
            voices,
            rate: 1.0,
            pitch: PitchStage::new(atomics.sample_rate(), quality),
            mix: StereoBuffer::silence(MAX_BLOCK_SIZE),
            frame: 0,
            atomics,
        }
    }

    /// Number of stems in the graph
    pub fn stem_count(&self) -> usize {
        self.voices.len()
    }

    /// Current playback rate
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Current pitch shift
    pub fn pitch_semitones(&self) -> f64 {
        self.pitch.semitones()
    }

    /// Whether a stem currently has a started voice
    pub fn is_stem_active(&self, stem: usize) -> bool {
        self.voices.get(stem).is_some_and(|v| v.cursor.is_some())
    }

    /// Read position of a stem voice in frames, if started
    pub fn read_position(&self, stem: usize) -> Option<f64> {
        self.voices.get(stem)?.cursor.map(|c| c.read_pos)
    }

    /// Current gain of a stem in dB and whether it is muted
    pub fn stem_gain(&self, stem: usize) -> Option<(f32, bool)> {
        self.voices
            .get(stem)
            .map(|v| (v.gain.current_db(), v.muted))
    }

    /// Apply all pending commands
    fn process_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.pop() {
            self.apply(cmd);
        }
    }

    /// Apply queued commands without rendering
    ///
    /// For the control side, when nothing is rendering and the queue is full.
    pub(crate) fn apply_pending(&mut self) {
        self.process_commands();
    }

    fn apply(&mut self, cmd: GraphCommand) {
        match cmd {
            GraphCommand::StartAll {
                at_frame,
                offset_frames,
            } => {
                let cursor = VoiceCursor {
                    start_frame: at_frame,
                    read_pos: offset_frames.max(0.0),
                };
                for voice in &mut self.voices {
                    voice.cursor = Some(cursor);
                }
            }
            GraphCommand::StopAll => {
                for voice in &mut self.voices {
                    voice.cursor = None;
                }
            }
            GraphCommand::SetLevel {
                stem: Some(stem),
                level,
                ramp_frames,
            } => {
                if let Some(voice) = self.voices.get_mut(stem) {
                    voice.set_level(level, ramp_frames);
                }
            }
            GraphCommand::SetLevel {
                stem: None,
                level,
                ramp_frames,
            } => {
                for voice in &mut self.voices {
                    voice.set_level(level, ramp_frames);
                }
            }
            GraphCommand::SetRate(rate) => {
                if rate.is_finite() && rate > 0.0 {
                    self.rate = rate;
                }
            }
            GraphCommand::SetPitch(semitones) => {
                self.pitch.set_semitones(semitones);
            }
        }
    }

    /// Render the next `output.len()` frames
    pub fn render(&mut self, output: &mut [StereoSample]) {
        self.process_commands();
        for block in output.chunks_mut(MAX_BLOCK_SIZE) {
            self.render_block(block);
        }
    }

    fn render_block(&mut self, output: &mut [StereoSample]) {
        let len = output.len();
        self.mix.set_len_from_capacity(len);
        self.mix.fill_silence();

        let block_start = self.frame;
        let rate = self.rate;
        let mix = self.mix.as_mut_slice();
        for voice in &mut self.voices {
            voice.render_into(mix, block_start, rate);
        }

        self.pitch
            .process(self.mix.as_interleaved(), bytemuck::cast_slice_mut(output));

        self.frame += len as u64;
        self.atomics
            .frames_rendered
            .store(self.frame, Ordering::Relaxed);
    }
}
