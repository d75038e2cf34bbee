//! Background stem loading
//!
//! A track's stems are decoded off the control thread:
//!
//! - Requests go to a dedicated loader thread over an mpsc channel
//! - Each request's stems are decoded and resampled in parallel on rayon
//! - Results come back over a crossbeam channel, tagged with the track key
//!   and load generation they were requested for
//!
//! The caller compares the generation against the track's current one and
//! drops stale results, so a reload always wins over an older load that
//! finishes late.

mod decode;

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use basedrop::Shared;
use crossbeam::channel;
use rayon::prelude::*;
use thiserror::Error;

pub use decode::{decode_file, load_stem, resample, DecodedAudio};

#[cfg(test)]
pub(crate) use decode::tests::write_wav;

use crate::graph::gc::gc_handle;
use crate::types::StereoBuffer;

/// Errors raised while loading a track's stems
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio in {path:?}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Track has no stems")]
    NoStems,

    #[error("Duplicate stem name: {0}")]
    DuplicateStem(String),

    #[error("Loader thread disconnected")]
    Disconnected,
}

/// One named stem file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemSource {
    pub name: String,
    pub path: PathBuf,
}

impl StemSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A track's decoded stems, all at one sample rate
pub struct DecodedStems {
    names: Vec<String>,
    buffers: Vec<Shared<StereoBuffer>>,
    sample_rate: u32,
}

impl DecodedStems {
    /// Wrap already-decoded buffers; `names[i]` labels `buffers[i]`
    pub fn new(names: Vec<String>, buffers: Vec<StereoBuffer>, sample_rate: u32) -> Self {
        debug_assert_eq!(names.len(), buffers.len());
        let handle = gc_handle();
        let buffers = buffers
            .into_iter()
            .map(|buffer| Shared::new(&handle, buffer))
            .collect();
        Self {
            names,
            buffers,
            sample_rate,
        }
    }

    /// Stem names in graph order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the longest stem in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.buffers
            .iter()
            .map(|b| b.duration_seconds(self.sample_rate))
            .fold(0.0, f64::max)
    }

    /// The buffers in graph order, for building a graph
    pub fn into_buffers(self) -> Vec<Shared<StereoBuffer>> {
        self.buffers
    }
}

/// Decode every stem of a track in parallel
///
/// Fails on the first stem that cannot be loaded; a track is only usable
/// once all of its stems are.
pub fn decode_stems(stems: &[StemSource], sample_rate: u32) -> Result<DecodedStems, LoadError> {
    if stems.is_empty() {
        return Err(LoadError::NoStems);
    }
    for (i, stem) in stems.iter().enumerate() {
        if stems[..i].iter().any(|s| s.name == stem.name) {
            return Err(LoadError::DuplicateStem(stem.name.clone()));
        }
    }

    let buffers = stems
        .par_iter()
        .map(|stem| load_stem(&stem.path, sample_rate))
        .collect::<Result<Vec<_>, _>>()?;

    let names = stems.iter().map(|s| s.name.clone()).collect();
    Ok(DecodedStems::new(names, buffers, sample_rate))
}

/// A request to load one track's stems
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Caller's key for the track
    pub track: u64,
    /// Load generation the result will be tagged with
    pub generation: u64,
    pub stems: Vec<StemSource>,
}

/// Result of a load request
pub struct LoadOutcome {
    pub track: u64,
    pub generation: u64,
    pub result: Result<DecodedStems, LoadError>,
}

/// Background stem loader
///
/// Spawns a thread that hands each request to rayon. Results arrive on the
/// receiver returned by [`results`](Self::results), in completion order.
pub struct StemLoader {
    request_tx: Sender<LoadRequest>,
    result_rx: channel::Receiver<LoadOutcome>,
    sample_rate: u32,
    _handle: JoinHandle<()>,
}

impl StemLoader {
    /// Create a loader decoding to `sample_rate`
    pub fn new(sample_rate: u32) -> Result<Self, LoadError> {
        let (request_tx, request_rx) = mpsc::channel::<LoadRequest>();
        let (result_tx, result_rx) = channel::unbounded::<LoadOutcome>();

        let handle = thread::Builder::new()
            .name("stem-loader".to_string())
            .spawn(move || loader_thread(request_rx, result_tx, sample_rate))
            .map_err(|e| LoadError::Io {
                path: PathBuf::new(),
                source: e,
            })?;

        log::info!("StemLoader spawned with sample rate: {} Hz", sample_rate);

        Ok(Self {
            request_tx,
            result_rx,
            sample_rate,
            _handle: handle,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue a load (non-blocking)
    pub fn request(&self, request: LoadRequest) -> Result<(), LoadError> {
        self.request_tx.send(request).map_err(|_| LoadError::Disconnected)
    }

    /// A clonable receiver of load outcomes
    pub fn results(&self) -> channel::Receiver<LoadOutcome> {
        self.result_rx.clone()
    }

    /// Next finished load, if any (non-blocking)
    pub fn try_recv(&self) -> Option<LoadOutcome> {
        self.result_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next finished load
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LoadOutcome> {
        self.result_rx.recv_timeout(timeout).ok()
    }
}

fn loader_thread(rx: Receiver<LoadRequest>, tx: channel::Sender<LoadOutcome>, sample_rate: u32) {
    log::info!("Stem loader thread started");

    while let Ok(request) = rx.recv() {
        let tx = tx.clone();
        rayon::spawn(move || {
            let start = Instant::now();
            let result = decode_stems(&request.stems, sample_rate);
            match &result {
                Ok(stems) => log::info!(
                    "Loaded track {} (generation {}): {} stems, {:.1}s in {:?}",
                    request.track,
                    request.generation,
                    stems.names().len(),
                    stems.duration_seconds(),
                    start.elapsed()
                ),
                Err(e) => log::warn!("Failed to load track {}: {}", request.track, e),
            }
            let _ = tx.send(LoadOutcome {
                track: request.track,
                generation: request.generation,
                result,
            });
        });
    }

    log::info!("Stem loader thread exiting");
}
