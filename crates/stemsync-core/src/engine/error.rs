//! Mixer error types
//!
//! None of these are fatal. The handle surface logs them and carries on;
//! the engine's fallible methods return them so callers and tests can tell
//! a no-op from an applied change.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors from track engine and registry operations
#[derive(Error, Debug)]
pub enum MixerError {
    /// The track's stems are not loaded yet
    #[error("Track is not ready")]
    NotReady,

    /// A sync was requested against a registry position with no handle
    #[error("No track at registry position {0}")]
    InvalidReference(usize),

    /// A tempo sync against a reference whose tempo cannot drive a rate
    #[error("Track at registry position {reference} has no usable tempo ({tempo})")]
    UnusableReferenceTempo { reference: usize, tempo: f64 },

    /// A playback rate that is zero, negative or not finite
    #[error("Playback rate must be positive and finite, got {0}")]
    ZeroOrNegativeRate(f64),

    /// A pitch shift that is not finite
    #[error("Pitch shift must be finite, got {0}")]
    InvalidPitch(f64),

    /// A pitch shift beyond what the pitch stage can render
    #[error("Pitch shift of {0} semitones is out of range")]
    PitchOutOfRange(f64),

    /// The handle was unregistered or never existed
    #[error("Handle {0} is not registered")]
    StaleHandle(u64),

    /// A load finished for a generation that has since been superseded
    #[error("Load generation {got} is stale (current is {current})")]
    StaleLoad { got: u64, current: u64 },

    /// A stem name the track doesn't have
    #[error("Unknown stem: {0}")]
    UnknownStem(String),

    /// The rendering backend rejected an instruction
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl MixerError {
    /// Whether this is an expected no-op rather than a real failure
    pub fn is_benign(&self) -> bool {
        matches!(self, MixerError::NotReady | MixerError::StaleHandle(_))
    }
}

/// Result type for mixer operations
pub type MixerResult<T> = Result<T, MixerError>;

/// Log an absorbed mixer error at the level its kind warrants
pub(crate) fn absorb(operation: &str, err: MixerError) {
    if err.is_benign() {
        log::debug!("{} ignored: {}", operation, err);
    } else {
        log::warn!("{} failed: {}", operation, err);
    }
}
