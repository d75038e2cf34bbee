//! Lock-free command queue from the control thread to a graph renderer
//!
//! The control thread pushes [`GraphCommand`]s into an `rtrb` ring buffer and
//! the renderer drains it at the start of every render block. Neither side
//! ever blocks, and commands take effect on a block boundary.
//!
//! Every engine operation maps to exactly one command. A push either lands
//! the whole operation or nothing, so a full queue can never leave half of
//! a track's stems started or a stem un-muted without its ramp.

use crate::backend::StemLevel;

/// Commands sent from the control thread to a graph renderer
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCommand {
    /// Start every stem voice at an absolute engine frame, reading from
    /// `offset_frames` into the audio. Voices already running are replaced.
    StartAll { at_frame: u64, offset_frames: f64 },
    /// Stop every stem voice
    StopAll,
    /// Set one stem's level (`stem: None` sets all of them), ramping a
    /// gain change over `ramp_frames`
    SetLevel {
        stem: Option<usize>,
        level: StemLevel,
        ramp_frames: u32,
    },
    /// Playback-rate multiplier for all stems
    SetRate(f64),
    /// Post-sum pitch shift in semitones
    SetPitch(f64),
}

/// Capacity of the command queue
///
/// Commands are one per engine operation, so the queue only fills when the
/// renderer stops draining it.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// - Producer: owned by the control side ([`super::StemGraph`])
/// - Consumer: owned by the audio side ([`super::GraphRenderer`])
pub fn command_channel() -> (rtrb::Producer<GraphCommand>, rtrb::Consumer<GraphCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
