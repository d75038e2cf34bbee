//! Track engines, the mixer registry and cross-track sync
//!
//! - TrackEngine: one track's stems, transport, mix and clock
//! - MixerHandle: the infallible surface other code sees a track through
//! - MixerRegistry: the owned, ordered set of ready tracks
//! - sync: tempo/key corrections from a reference track

mod error;
mod handle;
mod registry;
mod sync;
mod track;

#[cfg(test)]
pub(crate) mod testing;

pub use error::*;
pub use handle::*;
pub use registry::*;
pub use sync::*;
pub use track::*;
