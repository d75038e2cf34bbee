//! One track's stems, transport and mix
//!
//! A [`TrackEngine`] owns a track's rendering backend, its [`AudioClock`] and
//! the per-stem volume state. Every transport operation reads the backend
//! clock once and uses that single reading for all stems, so the stems of a
//! track always start on the same engine instant from the same position.
//!
//! ```text
//!  Unloaded ──begin_load──► Loading ──complete_load──► Ready ⇄ Playing/Paused
//!     ▲                       ▲                          │
//!     └────── teardown ───────┴──────── begin_load ──────┘
//! ```

use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use super::error::{MixerError, MixerResult};
use crate::backend::{RenderBackend, StemLevel};
use crate::clock::AudioClock;
use crate::graph::{db_to_linear, MAX_PITCH_SEMITONES};
use crate::music::TrackMetadata;
use crate::types::TransportState;

/// Volume every stem starts at, in percent
pub const BASELINE_PCT: f64 = 50.0;

/// Default length of a volume ramp
pub const DEFAULT_VOLUME_RAMP: Duration = Duration::from_millis(100);

/// Convert a volume percentage to decibels
///
/// Zero percent is a hard mute rather than a level, so it has no decibel
/// value and maps to `None`.
pub fn pct_to_db(pct: f64) -> Option<f32> {
    if pct <= 0.0 {
        None
    } else {
        Some((20.0 * (pct / 100.0).log10()) as f32)
    }
}

/// Backend level for a volume percentage
fn pct_to_level(pct: f64) -> StemLevel {
    pct_to_db(pct).map_or(StemLevel::Muted, StemLevel::Db)
}

/// Transport changes published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A load started; the track is not playable until `Ready`
    Loading,
    /// All stems decoded and the graph is in place
    Ready,
    Playing { position: f64 },
    Paused { position: f64 },
    Seeked { position: f64 },
    Unloaded,
}

/// Proof of a started load, redeemed by [`TrackEngine::complete_load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Tunables shared by every track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSettings {
    /// Starting and reset volume for every stem, in percent
    pub baseline_pct: f64,
    /// Ramp length for nonzero volume changes
    pub volume_ramp: Duration,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            baseline_pct: BASELINE_PCT,
            volume_ramp: DEFAULT_VOLUME_RAMP,
        }
    }
}

/// Mixer state of one stem
#[derive(Debug, Clone, PartialEq)]
pub struct StemState {
    pub name: String,
    /// Volume in percent, 0-100
    pub pct: f64,
    pub muted: bool,
}

/// One track's playback engine
pub struct TrackEngine<B: RenderBackend> {
    label: String,
    metadata: TrackMetadata,
    settings: TrackSettings,
    state: TransportState,
    graph: Option<B>,
    clock: AudioClock,
    stems: Vec<StemState>,
    rate: f64,
    pitch: f64,
    generation: u64,
    subscribers: Vec<Sender<TransportEvent>>,
}

impl<B: RenderBackend> TrackEngine<B> {
    /// A new, unloaded track
    pub fn new(label: impl Into<String>, metadata: TrackMetadata, settings: TrackSettings) -> Self {
        Self {
            label: label.into(),
            metadata,
            settings,
            state: TransportState::Unloaded,
            graph: None,
            clock: AudioClock::new(),
            stems: Vec::new(),
            rate: 1.0,
            pitch: 0.0,
            generation: 0,
            subscribers: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────

    /// Start a (re)load with new metadata
    ///
    /// Any existing graph is disposed first. The clock returns to zero and
    /// rate/pitch return to neutral, matching the fresh graph to come.
    pub fn begin_load(&mut self, metadata: TrackMetadata) -> LoadTicket {
        self.dispose_graph();
        self.clock.reset();
        self.stems.clear();
        self.rate = 1.0;
        self.pitch = 0.0;
        self.metadata = metadata;
        self.generation += 1;
        self.state = TransportState::Loading;
        log::debug!("{}: load generation {} started", self.label, self.generation);
        self.emit(TransportEvent::Loading);
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Install the graph for a finished load
    ///
    /// `stem_names[i]` names the graph's stem `i`. A ticket from a superseded
    /// load is refused and its graph disposed.
    pub fn complete_load(&mut self, ticket: LoadTicket, mut graph: B, stem_names: Vec<String>) -> MixerResult<()> {
        if ticket.generation != self.generation || self.state != TransportState::Loading {
            graph.dispose();
            return Err(MixerError::StaleLoad {
                got: ticket.generation,
                current: self.generation,
            });
        }

        let baseline = self.settings.baseline_pct.clamp(0.0, 100.0);
        if let Err(e) = graph.set_all_levels(pct_to_level(baseline), Duration::ZERO) {
            graph.dispose();
            return Err(e.into());
        }

        self.stems = stem_names
            .into_iter()
            .map(|name| StemState {
                name,
                pct: baseline,
                muted: baseline == 0.0,
            })
            .collect();
        self.graph = Some(graph);
        self.state = TransportState::Ready;
        log::info!("{}: ready with {} stems", self.label, self.stems.len());
        self.emit(TransportEvent::Ready);
        Ok(())
    }

    /// Abandon the current load after it failed upstream
    pub fn abort_load(&mut self, ticket: LoadTicket) -> MixerResult<()> {
        if ticket.generation != self.generation || self.state != TransportState::Loading {
            return Err(MixerError::StaleLoad {
                got: ticket.generation,
                current: self.generation,
            });
        }
        self.state = TransportState::Unloaded;
        self.emit(TransportEvent::Unloaded);
        Ok(())
    }

    /// Dispose the graph and return to `Unloaded`
    ///
    /// Also invalidates any load still in flight.
    pub fn teardown(&mut self) {
        self.dispose_graph();
        self.clock.reset();
        self.stems.clear();
        self.rate = 1.0;
        self.pitch = 0.0;
        self.generation += 1;
        if self.state != TransportState::Unloaded {
            self.state = TransportState::Unloaded;
            log::info!("{}: unloaded", self.label);
            self.emit(TransportEvent::Unloaded);
        }
    }

    fn dispose_graph(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.dispose();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    /// The graph, if the track is ready
    ///
    /// Takes the fields rather than `self` so the clock and stem state stay
    /// usable while the graph is borrowed.
    fn ready_graph(graph: &mut Option<B>, state: TransportState) -> MixerResult<&mut B> {
        match graph.as_mut() {
            Some(graph) if state.is_ready() => Ok(graph),
            _ => Err(MixerError::NotReady),
        }
    }

    /// Start playback from the current position. No-op if already playing.
    pub fn try_play_all(&mut self) -> MixerResult<()> {
        if self.state == TransportState::Playing {
            return Ok(());
        }
        let graph = Self::ready_graph(&mut self.graph, self.state)?;
        graph.resume()?;

        // Every stem starts on the same engine instant from the same position
        let now = graph.now();
        let position = self.clock.position(now);
        graph.start_all(now, position)?;

        self.clock.start(now);
        self.state = TransportState::Playing;
        log::debug!("{}: playing from {:.3}s", self.label, position);
        self.emit(TransportEvent::Playing { position });
        Ok(())
    }

    /// Stop playback, keeping the position. No-op if not playing.
    pub fn try_pause_all(&mut self) -> MixerResult<()> {
        if self.state != TransportState::Playing {
            return Ok(());
        }
        let graph = Self::ready_graph(&mut self.graph, self.state)?;
        let now = graph.now();
        graph.stop_all()?;

        self.clock.stop(now);
        let position = self.clock.position(now);
        self.state = TransportState::Paused;
        log::debug!("{}: paused at {:.3}s", self.label, position);
        self.emit(TransportEvent::Paused { position });
        Ok(())
    }

    /// Move the position by `delta_seconds` (floored at zero)
    ///
    /// While playing the stems are restarted at the new position at once.
    /// If the restart is rejected the position stays where it was.
    pub fn try_jump(&mut self, delta_seconds: f64) -> MixerResult<()> {
        if !delta_seconds.is_finite() {
            log::warn!("{}: ignoring non-finite jump {}", self.label, delta_seconds);
            return Ok(());
        }
        let playing = self.state == TransportState::Playing;
        let graph = Self::ready_graph(&mut self.graph, self.state)?;

        let now = graph.now();
        let mut clock = self.clock;
        clock.seek_by(delta_seconds, now);
        let position = clock.position(now);
        if playing {
            graph.start_all(now, position)?;
        }
        self.clock = clock;

        log::debug!("{}: jumped {:+.3}s to {:.3}s", self.label, delta_seconds, position);
        self.emit(TransportEvent::Seeked { position });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mixing
    // ─────────────────────────────────────────────────────────────────────

    fn stem_index(&self, stem: &str) -> MixerResult<usize> {
        self.stems
            .iter()
            .position(|s| s.name == stem)
            .ok_or_else(|| MixerError::UnknownStem(stem.to_string()))
    }

    /// Set one stem's volume in percent (clamped to 0-100)
    ///
    /// Zero mutes immediately. Any other value un-mutes and ramps to the
    /// equivalent level.
    pub fn try_set_volume_pct(&mut self, stem: &str, pct: f64) -> MixerResult<()> {
        if pct.is_nan() {
            log::warn!("{}: ignoring NaN volume for {}", self.label, stem);
            return Ok(());
        }
        let pct = pct.clamp(0.0, 100.0);
        let ramp = self.settings.volume_ramp;
        Self::ready_graph(&mut self.graph, self.state)?;
        let index = self.stem_index(stem)?;
        let graph = Self::ready_graph(&mut self.graph, self.state)?;

        graph.set_stem_level(index, pct_to_level(pct), ramp)?;

        let state = &mut self.stems[index];
        state.pct = pct;
        state.muted = pct == 0.0;
        Ok(())
    }

    /// Un-mute every stem and ramp it back to the baseline
    pub fn try_reset_volumes(&mut self) -> MixerResult<()> {
        let baseline = self.settings.baseline_pct.clamp(0.0, 100.0);
        let ramp = self.settings.volume_ramp;
        Self::ready_graph(&mut self.graph, self.state)?.set_all_levels(pct_to_level(baseline), ramp)?;
        for state in &mut self.stems {
            state.pct = baseline;
            state.muted = baseline == 0.0;
        }
        Ok(())
    }

    /// Playback-rate multiplier for every stem. Never touches pitch.
    pub fn try_set_playback_rate(&mut self, rate: f64) -> MixerResult<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(MixerError::ZeroOrNegativeRate(rate));
        }
        Self::ready_graph(&mut self.graph, self.state)?.set_playback_rate(rate)?;
        self.rate = rate;
        log::debug!("{}: rate {:.4}", self.label, rate);
        Ok(())
    }

    /// Semitone shift for every stem. Never touches rate.
    ///
    /// Shifts beyond [`MAX_PITCH_SEMITONES`] either way are refused and the
    /// current shift is kept.
    pub fn try_set_pitch_shift(&mut self, semitones: f64) -> MixerResult<()> {
        if !semitones.is_finite() {
            return Err(MixerError::InvalidPitch(semitones));
        }
        if semitones.abs() > MAX_PITCH_SEMITONES {
            return Err(MixerError::PitchOutOfRange(semitones));
        }
        Self::ready_graph(&mut self.graph, self.state)?.set_pitch_shift(semitones)?;
        self.pitch = semitones;
        log::debug!("{}: pitch {:+.4} st", self.label, semitones);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Current load generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Elapsed seconds into the track
    pub fn current_position(&self) -> f64 {
        let now = self.graph.as_ref().map_or(0.0, |g| g.now());
        self.clock.position(now)
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn pitch_shift(&self) -> f64 {
        self.pitch
    }

    /// Stem names in graph order
    pub fn stem_names(&self) -> impl Iterator<Item = &str> {
        self.stems.iter().map(|s| s.name.as_str())
    }

    pub fn stems(&self) -> &[StemState] {
        &self.stems
    }

    /// Volume of a stem in percent
    pub fn volume_pct(&self, stem: &str) -> Option<f64> {
        self.stems.iter().find(|s| s.name == stem).map(|s| s.pct)
    }

    /// Target linear gain of a stem; exactly 0.0 while muted
    pub fn current_gain(&self, stem: &str) -> Option<f32> {
        let state = self.stems.iter().find(|s| s.name == stem)?;
        if state.muted {
            return Some(0.0);
        }
        Some(pct_to_db(state.pct).map_or(0.0, db_to_linear))
    }

    /// The rendering backend, once loaded
    pub fn backend(&self) -> Option<&B> {
        self.graph.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.graph.as_mut()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Notification
    // ─────────────────────────────────────────────────────────────────────

    /// Receive this track's transport events from now on
    pub fn subscribe(&mut self) -> Receiver<TransportEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: TransportEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
