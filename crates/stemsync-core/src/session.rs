//! Session: the owner of every track
//!
//! A [`Session`] ties the background [`StemLoader`], a [`GraphFactory`] and
//! the [`MixerRegistry`] together:
//!
//! ```text
//! add_track ──► StemLoader (rayon decode) ──► pump() ──► factory.build()
//!                                                    └─► complete_load ──► registry
//! ```
//!
//! Tracks sit in a pending set while loading and join the registry only once
//! their graph is in place. A reload takes the track out of the registry
//! again; if an older load for it finishes later, its result is discarded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::backend::{BackendError, GraphFactory};
use crate::config::{EngineConfig, SessionConfig};
use crate::engine::{
    self, HandleId, LoadTicket, MixerError, MixerRegistry, MixerResult, SyncMode, SyncReport, TrackEngine,
    TrackSettings,
};
use crate::graph::StemGraph;
use crate::loader::{LoadError, LoadOutcome, LoadRequest, StemLoader, StemSource};
use crate::music::TrackMetadata;
use crate::types::StereoSample;

/// Caller-facing key of a session track, stable across reloads
pub type TrackKey = u64;

/// Errors from session bookkeeping
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown track {0}")]
    UnknownTrack(TrackKey),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Mixer(#[from] MixerError),
}

/// What happened to a load when its result was collected
#[derive(Debug)]
pub enum LoadEvent {
    /// The track is registered and playable
    Ready { track: TrackKey, handle: HandleId },
    /// The track could not be loaded and was dropped from the session
    Failed { track: TrackKey, error: SessionError },
}

struct PendingLoad<G: crate::backend::RenderBackend> {
    engine: TrackEngine<G>,
    ticket: LoadTicket,
}

/// All tracks of one playback session
pub struct Session<F: GraphFactory> {
    loader: StemLoader,
    factory: F,
    settings: TrackSettings,
    registry: MixerRegistry<TrackEngine<F::Graph>>,
    pending: HashMap<TrackKey, PendingLoad<F::Graph>>,
    handles: HashMap<TrackKey, HandleId>,
    names: HashMap<TrackKey, Option<String>>,
    next_key: TrackKey,
}

impl<F: GraphFactory> Session<F> {
    /// An empty session building graphs with `factory`
    pub fn new(factory: F, settings: TrackSettings) -> Result<Self, SessionError> {
        let loader = StemLoader::new(factory.sample_rate())?;
        Ok(Self {
            loader,
            factory,
            settings,
            registry: MixerRegistry::new(),
            pending: HashMap::new(),
            handles: HashMap::new(),
            names: HashMap::new(),
            next_key: 0,
        })
    }

    /// A session with every track of `session` queued for loading
    pub fn from_config(factory: F, engine: &EngineConfig, session: &SessionConfig) -> anyhow::Result<Self> {
        let mut this = Self::new(factory, engine.track_settings())?;
        let base_dir = session.base_dir();
        for track in &session.tracks {
            let metadata = track.resolve_metadata(&base_dir)?;
            this.add_track(track.name.clone(), metadata, track.stem_sources(&base_dir))?;
        }
        Ok(this)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Track lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Queue a new track for loading
    ///
    /// Without a name the track is labelled "Song N" by its registry
    /// position once it is ready.
    pub fn add_track(
        &mut self,
        name: Option<String>,
        metadata: TrackMetadata,
        stems: Vec<StemSource>,
    ) -> Result<TrackKey, SessionError> {
        let key = self.next_key;
        self.next_key += 1;

        let label = name.clone().unwrap_or_else(|| format!("Track {}", key));
        let mut engine = TrackEngine::new(label, metadata.clone(), self.settings);
        let ticket = engine.begin_load(metadata);
        self.loader.request(LoadRequest {
            track: key,
            generation: ticket.generation(),
            stems,
        })?;

        self.names.insert(key, name);
        self.pending.insert(key, PendingLoad { engine, ticket });
        log::info!("Track {} queued for loading", key);
        Ok(key)
    }

    /// Load new stems and metadata into an existing track
    ///
    /// The track leaves the registry until the new load completes. Its
    /// previous graph is disposed before the new one is requested.
    pub fn reload_track(
        &mut self,
        key: TrackKey,
        metadata: TrackMetadata,
        stems: Vec<StemSource>,
    ) -> Result<(), SessionError> {
        let mut engine = self.take_engine(key)?;
        let ticket = engine.begin_load(metadata);
        self.loader.request(LoadRequest {
            track: key,
            generation: ticket.generation(),
            stems,
        })?;
        self.pending.insert(key, PendingLoad { engine, ticket });
        self.relabel();
        log::info!("Track {} reloading (generation {})", key, ticket.generation());
        Ok(())
    }

    /// Tear a track down and forget it
    pub fn remove_track(&mut self, key: TrackKey) -> Result<(), SessionError> {
        let mut engine = self.take_engine(key)?;
        engine.teardown();
        self.names.remove(&key);
        self.relabel();
        log::info!("Track {} removed", key);
        Ok(())
    }

    fn take_engine(&mut self, key: TrackKey) -> Result<TrackEngine<F::Graph>, SessionError> {
        if let Some(pending) = self.pending.remove(&key) {
            return Ok(pending.engine);
        }
        let id = self.handles.remove(&key).ok_or(SessionError::UnknownTrack(key))?;
        self.registry
            .unregister(id)
            .ok_or(SessionError::Mixer(MixerError::StaleHandle(id.raw())))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Load completion
    // ─────────────────────────────────────────────────────────────────────

    /// Collect every finished load without blocking
    pub fn pump(&mut self) -> Vec<LoadEvent> {
        let mut events = Vec::new();
        while let Some(outcome) = self.loader.try_recv() {
            events.extend(self.finish_load(outcome));
        }
        events
    }

    /// Collect finished loads until none are pending or `timeout` passes
    pub fn wait_for_loads(&mut self, timeout: Duration) -> Vec<LoadEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        while !self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::warn!("{} loads still pending after {:?}", self.pending.len(), timeout);
                break;
            }
            if let Some(outcome) = self.loader.recv_timeout(remaining) {
                events.extend(self.finish_load(outcome));
            }
        }
        events
    }

    fn finish_load(&mut self, outcome: LoadOutcome) -> Option<LoadEvent> {
        let track = outcome.track;
        let current = self.pending.get(&track).map(|p| p.ticket.generation());
        if current != Some(outcome.generation) {
            log::debug!(
                "Discarding stale load for track {} (generation {}, current {:?})",
                track,
                outcome.generation,
                current
            );
            return None;
        }
        let PendingLoad { mut engine, ticket } = self.pending.remove(&track)?;

        let built = outcome.result.map_err(SessionError::from).and_then(|stems| {
            let names = stems.names().to_vec();
            let graph = self.factory.build(stems)?;
            engine.complete_load(ticket, graph, names)?;
            Ok(())
        });

        match built {
            Ok(()) => {
                let handle = self.registry.register(engine);
                self.handles.insert(track, handle);
                self.relabel();
                Some(LoadEvent::Ready { track, handle })
            }
            Err(error) => {
                log::error!("Track {} failed to load: {}", track, error);
                if let Err(e) = engine.abort_load(ticket) {
                    log::debug!("Abort after failed load: {}", e);
                }
                self.names.remove(&track);
                Some(LoadEvent::Failed { track, error })
            }
        }
    }

    /// Give unnamed tracks their "Song N" label by registry position
    fn relabel(&mut self) {
        let labels = self.registry.labels();
        let ids: Vec<HandleId> = self.registry.ids().collect();
        for (position, id) in ids.into_iter().enumerate() {
            let Some(key) = self.key_of(id) else { continue };
            let label = match self.names.get(&key) {
                Some(Some(name)) => name.clone(),
                _ => labels[position].clone(),
            };
            if let Some(engine) = self.registry.by_id_mut(id) {
                engine.set_label(label);
            }
        }
    }

    fn key_of(&self, id: HandleId) -> Option<TrackKey> {
        self.handles.iter().find(|(_, h)| **h == id).map(|(k, _)| *k)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────────

    pub fn registry(&self) -> &MixerRegistry<TrackEngine<F::Graph>> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MixerRegistry<TrackEngine<F::Graph>> {
        &mut self.registry
    }

    /// A ready track by key
    pub fn track(&self, key: TrackKey) -> Option<&TrackEngine<F::Graph>> {
        self.handles.get(&key).and_then(|id| self.registry.by_id(*id))
    }

    pub fn track_mut(&mut self, key: TrackKey) -> Option<&mut TrackEngine<F::Graph>> {
        let id = *self.handles.get(&key)?;
        self.registry.by_id_mut(id)
    }

    /// Registry identity of a ready track
    pub fn handle_of(&self, key: TrackKey) -> Option<HandleId> {
        self.handles.get(&key).copied()
    }

    /// Registry position of a ready track
    pub fn position_of(&self, key: TrackKey) -> Option<usize> {
        self.registry.index_of(*self.handles.get(&key)?)
    }

    pub fn is_loading(&self, key: TrackKey) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.factory.sample_rate()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Fan-out and sync
    // ─────────────────────────────────────────────────────────────────────

    pub fn play_all(&mut self) {
        self.registry.play_all();
    }

    pub fn pause_all(&mut self) {
        self.registry.pause_all();
    }

    pub fn jump(&mut self, delta_seconds: f64) {
        self.registry.jump(delta_seconds);
    }

    /// Sync every ready track to the one at registry position `reference`
    pub fn sync(&mut self, reference: usize, mode: SyncMode) -> MixerResult<SyncReport> {
        engine::sync(&mut self.registry, reference, mode)
    }

    /// Put every ready track back to rate 1.0 and pitch 0.0
    pub fn reset_sync(&mut self) {
        engine::reset_all(&mut self.registry);
    }
}

impl<F: GraphFactory<Graph = StemGraph>> Session<F> {
    /// Render the next `output.len()` frames of every ready track, summed
    ///
    /// Intended for offline graphs. Each track is rendered through its own
    /// graph, so every track's clock advances by the same frame count.
    pub fn render_mix(&self, output: &mut [StereoSample], scratch: &mut Vec<StereoSample>) {
        output.fill(StereoSample::silence());
        scratch.resize(output.len(), StereoSample::silence());
        for engine in self.registry.all() {
            if let Some(graph) = engine.backend() {
                graph.render(scratch);
                for (out, sample) in output.iter_mut().zip(scratch.iter()) {
                    *out += *sample;
                }
            }
        }
    }
}
