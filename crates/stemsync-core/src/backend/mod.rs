//! Rendering backend boundary
//!
//! The track engine treats audio rendering as an opaque, independently clocked
//! capability. It issues scheduled instructions keyed by the backend's own
//! monotonic clock and never looks inside:
//!
//! - `start_all` / `stop_all` for transport
//! - `set_stem_level` / `set_all_levels` for mixing
//! - `set_playback_rate` / `set_pitch_shift` for the whole graph
//!
//! Each call is applied whole or rejected whole. An engine operation makes
//! exactly one call that can fail after validation, so a rejected call leaves
//! the graph and the engine's state agreeing.
//!
//! [`crate::graph::StemGraph`] is the in-process implementation. Tests drive
//! the engine with a recording fake instead.

mod error;

use std::time::Duration;

pub use error::{BackendError, BackendResult};

use crate::loader::DecodedStems;

/// Target level of a stem
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StemLevel {
    /// Hard mute; the gain level underneath is left as it is
    Muted,
    /// Audible at this gain in dB
    Db(f32),
}

/// An independently clocked audio graph for one track's stems
///
/// Stems are addressed by their index in the graph, in the order the graph
/// was built with.
pub trait RenderBackend {
    /// The backend's monotonic clock in seconds
    fn now(&self) -> f64;

    /// Unlock/resume rendering. Must be called before audio is audible;
    /// calling it again on a running backend is a no-op.
    fn resume(&mut self) -> BackendResult<()>;

    /// Start every stem at `offset` seconds into its audio, at engine time
    /// `when`. Sources already playing are replaced, so a seek is one call.
    fn start_all(&mut self, when: f64, offset: f64) -> BackendResult<()>;

    /// Stop every stem source
    fn stop_all(&mut self) -> BackendResult<()>;

    /// Set a stem's level. A gain change ramps over `ramp` and un-mutes.
    fn set_stem_level(&mut self, stem: usize, level: StemLevel, ramp: Duration) -> BackendResult<()>;

    /// Set every stem to the same level
    fn set_all_levels(&mut self, level: StemLevel, ramp: Duration) -> BackendResult<()>;

    /// Playback-rate multiplier for every stem (varispeed)
    fn set_playback_rate(&mut self, rate: f64) -> BackendResult<()>;

    /// Pitch shift in semitones applied after the stem sum
    fn set_pitch_shift(&mut self, semitones: f64) -> BackendResult<()>;

    /// Tear the graph down. No instruction may take effect afterwards.
    fn dispose(&mut self);
}

/// Builds a graph from decoded stems
///
/// The session owns one factory and asks it for a new graph each time a
/// track's stems finish decoding.
pub trait GraphFactory {
    type Graph: RenderBackend;

    /// Sample rate the stems must be decoded at for this factory's graphs
    fn sample_rate(&self) -> u32;

    /// Build a graph rendering the given stems
    fn build(&mut self, stems: DecodedStems) -> BackendResult<Self::Graph>;
}
