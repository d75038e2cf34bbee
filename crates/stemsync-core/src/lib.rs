//! Stemsync Core - synchronized multi-track stem playback
//!
//! Several songs, each split into stems, play side by side. Any one of them
//! can be chosen as the reference: every track is then re-rated to its tempo
//! and transposed to its key, with the pitch change caused by the tempo
//! correction cancelled out.

pub mod audio;
pub mod backend;
pub mod clock;
pub mod config;
pub mod engine;
pub mod graph;
pub mod loader;
pub mod music;
pub mod session;
pub mod types;

pub use session::{LoadEvent, Session, SessionError, TrackKey};
pub use types::*;
