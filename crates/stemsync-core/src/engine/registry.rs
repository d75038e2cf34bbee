//! Owned collection of the active tracks
//!
//! Tracks join when their stems are ready and leave on teardown. Each entry
//! gets a [`HandleId`] that stays valid until it is unregistered, while
//! positions shift as entries leave. Positions are what the sync entry points
//! and the default "Song N" labels are keyed by.

use std::fmt;

use super::error::{MixerError, MixerResult};
use super::handle::MixerHandle;

/// Stable identity of a registered handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Insertion-ordered registry of mixer handles
pub struct MixerRegistry<H> {
    entries: Vec<(HandleId, H)>,
    next_id: u64,
}

impl<H> Default for MixerRegistry<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }
}

impl<H> MixerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handle and return its identity
    pub fn register(&mut self, handle: H) -> HandleId {
        let id = HandleId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, handle));
        log::debug!("Registered handle {} at position {}", id, self.entries.len() - 1);
        id
    }

    /// Remove a handle by identity. `None` if it was not registered.
    pub fn unregister(&mut self, id: HandleId) -> Option<H> {
        let index = self.index_of(id)?;
        let (_, handle) = self.entries.remove(index);
        log::debug!("Unregistered handle {}", id);
        Some(handle)
    }

    /// Handles in insertion order
    pub fn all(&self) -> impl Iterator<Item = &H> {
        self.entries.iter().map(|(_, h)| h)
    }

    /// Mutable handles in insertion order
    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut H> {
        self.entries.iter_mut().map(|(_, h)| h)
    }

    /// Identities in insertion order
    pub fn ids(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn get(&self, index: usize) -> Option<&H> {
        self.entries.get(index).map(|(_, h)| h)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut H> {
        self.entries.get_mut(index).map(|(_, h)| h)
    }

    pub fn by_id(&self, id: HandleId) -> Option<&H> {
        self.entries.iter().find(|(i, _)| *i == id).map(|(_, h)| h)
    }

    pub fn by_id_mut(&mut self, id: HandleId) -> Option<&mut H> {
        self.entries.iter_mut().find(|(i, _)| *i == id).map(|(_, h)| h)
    }

    /// Run `f` against a handle, or fail with `StaleHandle`
    pub fn with_handle<R>(&mut self, id: HandleId, f: impl FnOnce(&mut H) -> R) -> MixerResult<R> {
        self.by_id_mut(id)
            .map(f)
            .ok_or(MixerError::StaleHandle(id.raw()))
    }

    /// Current position of a handle
    pub fn index_of(&self, id: HandleId) -> Option<usize> {
        self.entries.iter().position(|(i, _)| *i == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Default labels by position: "Song 1", "Song 2", ...
    pub fn labels(&self) -> Vec<String> {
        (1..=self.entries.len()).map(|n| format!("Song {}", n)).collect()
    }
}

impl<H: MixerHandle> MixerRegistry<H> {
    /// Whether any handle is playing
    pub fn any_playing(&self) -> bool {
        self.all().any(|h| h.is_playing())
    }

    pub fn play_all(&mut self) {
        self.all_mut().for_each(|h| h.play_all());
    }

    pub fn pause_all(&mut self) {
        self.all_mut().for_each(|h| h.pause_all());
    }

    pub fn jump(&mut self, delta_seconds: f64) {
        self.all_mut().for_each(|h| h.jump(delta_seconds));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeHandle;

    #[test]
    fn test_register_preserves_order_and_ids() {
        let mut registry = MixerRegistry::new();
        let a = registry.register(FakeHandle::new(120.0, 0));
        let b = registry.register(FakeHandle::new(100.0, 7));
        let c = registry.register(FakeHandle::new(90.0, 2));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(registry.index_of(c), Some(2));
        assert_eq!(registry.labels(), vec!["Song 1", "Song 2", "Song 3"]);
    }

    #[test]
    fn test_unregister_by_identity() {
        let mut registry = MixerRegistry::new();
        let a = registry.register(FakeHandle::new(120.0, 0));
        let b = registry.register(FakeHandle::new(100.0, 7));

        let removed = registry.unregister(a).unwrap();
        assert_eq!(removed.tempo, 120.0);
        assert_eq!(registry.index_of(b), Some(0));
        assert!(registry.by_id(a).is_none());

        // Absent ids are a no-op
        assert!(registry.unregister(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry = MixerRegistry::new();
        let a = registry.register(FakeHandle::new(120.0, 0));
        registry.unregister(a);
        let b = registry.register(FakeHandle::new(120.0, 0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_stale_handle_is_reported() {
        let mut registry = MixerRegistry::new();
        let a = registry.register(FakeHandle::new(120.0, 0));
        registry.unregister(a);
        let result = registry.with_handle(a, |h| h.play_all());
        assert!(matches!(result, Err(MixerError::StaleHandle(_))));
    }

    #[test]
    fn test_fan_out_reaches_every_handle() {
        let mut registry = MixerRegistry::new();
        registry.register(FakeHandle::new(120.0, 0));
        registry.register(FakeHandle::new(100.0, 7));

        registry.play_all();
        assert!(registry.all().all(|h| h.is_playing()));
        assert!(registry.any_playing());

        registry.jump(10.0);
        registry.jump(-4.0);
        assert!(registry.all().all(|h| h.position == 6.0));

        registry.pause_all();
        assert!(!registry.any_playing());

        // The sequence is restartable
        assert_eq!(registry.all().count(), 2);
        assert_eq!(registry.all().count(), 2);
    }
}
