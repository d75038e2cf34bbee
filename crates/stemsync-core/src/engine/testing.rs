//! Test doubles for the engine: a recording backend and a bare handle

use std::time::Duration;

use super::handle::MixerHandle;
use crate::backend::{BackendError, BackendResult, RenderBackend, StemLevel};

/// One instruction received by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Resume,
    StartAll { when: f64, offset: f64 },
    StopAll,
    /// `stem: None` is every stem
    Level { stem: Option<usize>, level: StemLevel, ramp: Duration },
    Rate(f64),
    Pitch(f64),
    Dispose,
}

/// Backend that records instructions and has a hand-driven clock
///
/// With `slots` set, each queued instruction uses one slot and instructions
/// past the last one are rejected with `QueueFull`, like a stalled renderer.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub clock: f64,
    pub calls: Vec<BackendCall>,
    pub slots: Option<usize>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, seconds: f64) {
        self.clock += seconds;
    }

    /// Every start instruction since the last `clear`, as `(when, offset)`
    pub fn starts(&self) -> Vec<(f64, f64)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::StartAll { when, offset } => Some((*when, *offset)),
                _ => None,
            })
            .collect()
    }

    fn queue(&mut self, call: BackendCall) -> BackendResult<()> {
        match &mut self.slots {
            Some(0) => return Err(BackendError::QueueFull),
            Some(n) => *n -= 1,
            None => {}
        }
        self.calls.push(call);
        Ok(())
    }

    pub fn last_rate(&self) -> Option<f64> {
        self.calls.iter().rev().find_map(|c| match c {
            BackendCall::Rate(r) => Some(*r),
            _ => None,
        })
    }

    pub fn last_pitch(&self) -> Option<f64> {
        self.calls.iter().rev().find_map(|c| match c {
            BackendCall::Pitch(p) => Some(*p),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl RenderBackend for RecordingBackend {
    fn now(&self) -> f64 {
        self.clock
    }

    fn resume(&mut self) -> BackendResult<()> {
        self.calls.push(BackendCall::Resume);
        Ok(())
    }

    fn start_all(&mut self, when: f64, offset: f64) -> BackendResult<()> {
        self.queue(BackendCall::StartAll { when, offset })
    }

    fn stop_all(&mut self) -> BackendResult<()> {
        self.queue(BackendCall::StopAll)
    }

    fn set_stem_level(&mut self, stem: usize, level: StemLevel, ramp: Duration) -> BackendResult<()> {
        self.queue(BackendCall::Level {
            stem: Some(stem),
            level,
            ramp,
        })
    }

    fn set_all_levels(&mut self, level: StemLevel, ramp: Duration) -> BackendResult<()> {
        self.queue(BackendCall::Level { stem: None, level, ramp })
    }

    fn set_playback_rate(&mut self, rate: f64) -> BackendResult<()> {
        self.queue(BackendCall::Rate(rate))
    }

    fn set_pitch_shift(&mut self, semitones: f64) -> BackendResult<()> {
        self.queue(BackendCall::Pitch(semitones))
    }

    fn dispose(&mut self) {
        self.calls.push(BackendCall::Dispose);
    }
}

/// Bare [`MixerHandle`] recording what the registry and sync ask of it
#[derive(Debug, Clone, Default)]
pub struct FakeHandle {
    pub tempo: f64,
    pub tonic: u8,
    pub playing: bool,
    pub position: f64,
    pub rate: f64,
    pub pitch: f64,
    pub rate_calls: Vec<f64>,
    pub pitch_calls: Vec<f64>,
}

impl FakeHandle {
    pub fn new(tempo: f64, tonic: u8) -> Self {
        Self {
            tempo,
            tonic,
            rate: 1.0,
            ..Default::default()
        }
    }
}

impl MixerHandle for FakeHandle {
    fn label(&self) -> &str {
        "fake"
    }

    fn play_all(&mut self) {
        self.playing = true;
    }

    fn pause_all(&mut self) {
        self.playing = false;
    }

    fn jump(&mut self, delta_seconds: f64) {
        self.position = (self.position + delta_seconds).max(0.0);
    }

    fn set_volume_pct(&mut self, _stem: &str, _pct: f64) {}

    fn reset_volumes(&mut self) {}

    fn set_playback_rate(&mut self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
            self.rate_calls.push(rate);
        }
    }

    fn set_pitch_shift(&mut self, semitones: f64) {
        self.pitch = semitones;
        self.pitch_calls.push(semitones);
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn tonic(&self) -> u8 {
        self.tonic
    }

    fn tempo(&self) -> f64 {
        self.tempo
    }

    fn current_position(&self) -> f64 {
        self.position
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn pitch_shift(&self) -> f64 {
        self.pitch
    }
}
