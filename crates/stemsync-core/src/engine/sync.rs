//! Cross-track tempo and key synchronization
//!
//! Given a reference track, every registered track (the reference included)
//! is assigned an absolute playback rate and pitch shift:
//!
//! ```text
//! rate   = ref.tempo / track.tempo
//! drift  = 12 * log2(rate)                  pitch change caused by varispeed
//! delta  = tonic_delta(ref.tonic, track.tonic)
//! pitch  = delta - drift                    cancel the drift, then transpose
//! ```
//!
//! Values are computed from the tracks' metadata each time and assigned, never
//! accumulated, so repeated syncs give the same result as one. Against itself
//! the reference always gets rate 1.0 and pitch 0.0.
//!
//! A track whose correction needs more than [`MAX_PITCH_SEMITONES`] of shift
//! (a tempo ratio beyond about 4:1) is skipped like one with no usable tempo.

use super::error::{MixerError, MixerResult};
use super::handle::MixerHandle;
use super::registry::MixerRegistry;
use crate::graph::MAX_PITCH_SEMITONES;
use crate::music::{tempo_drift_semitones, tonic_delta, MusicalProfile};

/// Which corrections a sync applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Match tempo and move to the reference key
    TempoAndPitch,
    /// Match tempo and cancel its pitch side effect, keeping each key
    TempoOnly,
    /// Transpose to the reference key without touching rates
    ///
    /// Only lands exactly on the reference key when the rates already agree.
    PitchOnly,
}

impl SyncMode {
    fn uses_tempo(self) -> bool {
        !matches!(self, SyncMode::PitchOnly)
    }
}

/// Rate and pitch to assign to one track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Playback rate to assign; `None` leaves the rate alone
    pub rate: Option<f64>,
    pub pitch_semitones: f64,
}

impl Correction {
    /// Tempo match plus key match
    ///
    /// `None` when either tempo cannot drive a rate.
    pub fn tempo_and_pitch(reference: MusicalProfile, target: MusicalProfile) -> Option<Self> {
        let rate = rate_between(reference, target)?;
        let delta = tonic_delta(reference.tonic, target.tonic) as f64;
        Some(Self {
            rate: Some(rate),
            pitch_semitones: delta - tempo_drift_semitones(rate),
        })
    }

    /// Tempo match with the varispeed pitch change cancelled
    pub fn tempo_only(reference: MusicalProfile, target: MusicalProfile) -> Option<Self> {
        let rate = rate_between(reference, target)?;
        Some(Self {
            rate: Some(rate),
            pitch_semitones: -tempo_drift_semitones(rate),
        })
    }

    /// Key match alone
    pub fn pitch_only(reference: MusicalProfile, target: MusicalProfile) -> Self {
        Self {
            rate: None,
            pitch_semitones: tonic_delta(reference.tonic, target.tonic) as f64,
        }
    }

    /// The correction for `mode`
    pub fn for_mode(mode: SyncMode, reference: MusicalProfile, target: MusicalProfile) -> Option<Self> {
        match mode {
            SyncMode::TempoAndPitch => Self::tempo_and_pitch(reference, target),
            SyncMode::TempoOnly => Self::tempo_only(reference, target),
            SyncMode::PitchOnly => Some(Self::pitch_only(reference, target)),
        }
    }

    /// Whether the pitch stage can render this shift
    pub fn is_renderable(&self) -> bool {
        self.pitch_semitones.abs() <= MAX_PITCH_SEMITONES
    }

    /// Assign to a handle: rate first, then pitch
    pub fn apply<H: MixerHandle + ?Sized>(&self, handle: &mut H) {
        if let Some(rate) = self.rate {
            handle.set_playback_rate(rate);
        }
        handle.set_pitch_shift(self.pitch_semitones);
    }
}

fn rate_between(reference: MusicalProfile, target: MusicalProfile) -> Option<f64> {
    if !reference.has_valid_tempo() || !target.has_valid_tempo() {
        return None;
    }
    Some(reference.tempo / target.tempo)
}

fn profile_of<H: MixerHandle + ?Sized>(handle: &H) -> MusicalProfile {
    MusicalProfile::new(handle.tempo(), handle.tonic())
}

/// What a sync did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Registry position of the reference
    pub reference: usize,
    /// Handles that received a correction
    pub corrected: usize,
    /// Handles left untouched because their tempo was unusable or the
    /// shift they needed was out of range
    pub skipped: usize,
}

/// Synchronize every handle to the one at `reference`
///
/// Changes nothing and fails with `InvalidReference` when there is no handle
/// at `reference`, or with `UnusableReferenceTempo` when a tempo-based mode
/// is asked of a reference whose tempo cannot drive a rate.
pub fn sync<H: MixerHandle>(
    registry: &mut MixerRegistry<H>,
    reference: usize,
    mode: SyncMode,
) -> MixerResult<SyncReport> {
    let Some(reference_handle) = registry.get(reference) else {
        log::warn!(
            "Sync ignored: no track at position {} ({} registered)",
            reference,
            registry.len()
        );
        return Err(MixerError::InvalidReference(reference));
    };
    let reference_profile = profile_of(reference_handle);

    if mode.uses_tempo() && !reference_profile.has_valid_tempo() {
        log::warn!(
            "Sync ignored: reference {} has unusable tempo {}",
            reference_handle.label(),
            reference_profile.tempo
        );
        return Err(MixerError::UnusableReferenceTempo {
            reference,
            tempo: reference_profile.tempo,
        });
    }

    let mut report = SyncReport {
        reference,
        corrected: 0,
        skipped: 0,
    };

    for handle in registry.all_mut() {
        let target = profile_of(handle);
        match Correction::for_mode(mode, reference_profile, target) {
            Some(correction) if !correction.is_renderable() => {
                log::warn!(
                    "{}: skipped, needs {:+.2} st of pitch shift",
                    handle.label(),
                    correction.pitch_semitones
                );
                report.skipped += 1;
            }
            Some(correction) => {
                correction.apply(handle);
                log::debug!(
                    "{}: rate {:?}, pitch {:+.4} st",
                    handle.label(),
                    correction.rate,
                    correction.pitch_semitones
                );
                report.corrected += 1;
            }
            None => {
                log::warn!("{}: skipped, unusable tempo {}", handle.label(), target.tempo);
                report.skipped += 1;
            }
        }
    }

    log::info!(
        "{:?} sync to position {}: {} corrected, {} skipped",
        mode,
        reference,
        report.corrected,
        report.skipped
    );
    Ok(report)
}

/// Match tempo and key to the track at `reference`
pub fn sync_tempo_and_pitch<H: MixerHandle>(registry: &mut MixerRegistry<H>, reference: usize) -> MixerResult<SyncReport> {
    sync(registry, reference, SyncMode::TempoAndPitch)
}

/// Match tempo to the track at `reference`, keeping every key
pub fn sync_tempo_only<H: MixerHandle>(registry: &mut MixerRegistry<H>, reference: usize) -> MixerResult<SyncReport> {
    sync(registry, reference, SyncMode::TempoOnly)
}

/// Transpose every track to the key of the track at `reference`
pub fn sync_pitch_only<H: MixerHandle>(registry: &mut MixerRegistry<H>, reference: usize) -> MixerResult<SyncReport> {
    sync(registry, reference, SyncMode::PitchOnly)
}

/// Rate 1.0 and pitch 0.0 on every handle
pub fn reset_all<H: MixerHandle>(registry: &mut MixerRegistry<H>) {
    for handle in registry.all_mut() {
        handle.set_playback_rate(1.0);
        handle.set_pitch_shift(0.0);
    }
    log::info!("Reset rate and pitch on {} tracks", registry.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeHandle, RecordingBackend};
    use crate::engine::track::{TrackEngine, TrackSettings};
    use crate::music::TrackMetadata;

    const EPS: f64 = 1e-9;

    fn registry_of(tracks: &[(f64, u8)]) -> MixerRegistry<FakeHandle> {
        let mut registry = MixerRegistry::new();
        for &(tempo, tonic) in tracks {
            registry.register(FakeHandle::new(tempo, tonic));
        }
        registry
    }

    #[test]
    fn test_reference_scenario() {
        let mut registry = registry_of(&[(120.0, 0), (100.0, 7)]);
        let report = sync_tempo_and_pitch(&mut registry, 0).unwrap();
        assert_eq!(report, SyncReport { reference: 0, corrected: 2, skipped: 0 });

        let target = registry.get(1).unwrap();
        assert!((target.rate - 1.2).abs() < EPS);
        let drift = 12.0 * 1.2f64.log2();
        assert!((drift - 3.156_412_870).abs() < 1e-6);
        assert!((target.pitch - (5.0 - drift)).abs() < EPS);
        assert!((target.pitch - 1.843_587_130).abs() < 1e-6);
    }

    #[test]
    fn test_tritone_tie_goes_down() {
        let mut registry = registry_of(&[(120.0, 0), (120.0, 6)]);
        sync_tempo_and_pitch(&mut registry, 0).unwrap();
        let target = registry.get(1).unwrap();
        assert_eq!(target.rate, 1.0);
        assert_eq!(target.pitch, -6.0);
    }

    #[test]
    fn test_reference_against_itself_is_identity() {
        for (tempo, tonic) in [(120.0, 0), (97.3, 11), (174.0, 6)] {
            let mut registry = registry_of(&[(tempo, tonic), (88.0, 3)]);
            sync_tempo_and_pitch(&mut registry, 0).unwrap();
            let reference = registry.get(0).unwrap();
            assert_eq!(reference.rate, 1.0);
            assert_eq!(reference.pitch, 0.0);
        }
    }

    #[test]
    fn test_all_tonic_pairs() {
        for a in 0u8..12 {
            for b in 0u8..12 {
                let reference = MusicalProfile::new(120.0, a);
                let target = MusicalProfile::new(120.0, b);
                let delta = Correction::tempo_and_pitch(reference, target).unwrap().pitch_semitones;

                assert!((-6.0..=6.0).contains(&delta), "{} vs {}: {}", a, b, delta);
                assert_eq!(delta.fract(), 0.0);
                let landed = (b as i32 + delta as i32).rem_euclid(12);
                assert_eq!(landed, a as i32, "{} + {} should land on {}", b, delta, a);
                if delta == -6.0 {
                    assert_eq!(a as i32 - b as i32, -6);
                }
            }
        }
    }

    #[test]
    fn test_shift_reconstructs_from_rate_and_pitch() {
        let mut registry = registry_of(&[(128.0, 9), (95.0, 2), (140.0, 4), (128.0, 9)]);
        sync_tempo_and_pitch(&mut registry, 0).unwrap();

        for handle in registry.all() {
            let rate = *handle.rate_calls.last().unwrap();
            let pitch = *handle.pitch_calls.last().unwrap();
            assert!((rate - 128.0 / handle.tempo).abs() < EPS);
            let delta = tonic_delta(9, handle.tonic) as f64;
            assert!((pitch - (delta - 12.0 * rate.log2())).abs() < EPS);
        }
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut once = registry_of(&[(120.0, 0), (100.0, 7), (133.0, 10)]);
        let mut twice = registry_of(&[(120.0, 0), (100.0, 7), (133.0, 10)]);
        sync_tempo_and_pitch(&mut once, 0).unwrap();
        sync_tempo_and_pitch(&mut twice, 0).unwrap();
        sync_tempo_and_pitch(&mut twice, 0).unwrap();

        for (a, b) in once.all().zip(twice.all()) {
            assert_eq!(a.rate, b.rate);
            assert_eq!(a.pitch, b.pitch);
        }
    }

    #[test]
    fn test_changing_reference_does_not_accumulate() {
        let mut registry = registry_of(&[(120.0, 0), (100.0, 7)]);
        sync_tempo_and_pitch(&mut registry, 0).unwrap();
        sync_tempo_and_pitch(&mut registry, 1).unwrap();

        let first = registry.get(0).unwrap();
        assert!((first.rate - 100.0 / 120.0).abs() < EPS);
        let second = registry.get(1).unwrap();
        assert_eq!(second.rate, 1.0);
        assert_eq!(second.pitch, 0.0);
    }

    #[test]
    fn test_tempo_only_cancels_drift() {
        let mut registry = registry_of(&[(120.0, 0), (100.0, 7)]);
        sync_tempo_only(&mut registry, 0).unwrap();
        let target = registry.get(1).unwrap();
        assert!((target.rate - 1.2).abs() < EPS);
        assert!((target.pitch + 12.0 * 1.2f64.log2()).abs() < EPS);
    }

    #[test]
    fn test_pitch_only_never_changes_rate() {
        let mut registry = registry_of(&[(120.0, 0), (100.0, 7)]);
        registry.get_mut(1).unwrap().rate = 1.3;
        sync_pitch_only(&mut registry, 0).unwrap();

        let target = registry.get(1).unwrap();
        assert!(target.rate_calls.is_empty());
        assert_eq!(target.rate, 1.3);
        assert_eq!(target.pitch, 5.0);
    }

    #[test]
    fn test_invalid_reference_changes_nothing() {
        let mut registry = registry_of(&[(120.0, 0), (100.0, 7)]);
        assert!(matches!(
            sync_tempo_and_pitch(&mut registry, 2),
            Err(MixerError::InvalidReference(2))
        ));
        assert!(registry.all().all(|h| h.rate_calls.is_empty() && h.pitch_calls.is_empty()));
    }

    #[test]
    fn test_unusable_tempo_is_skipped() {
        let mut registry = registry_of(&[(120.0, 0), (0.0, 7), (f64::NAN, 2), (60.0, 0)]);
        let report = sync_tempo_and_pitch(&mut registry, 0).unwrap();
        assert_eq!(report.corrected, 2);
        assert_eq!(report.skipped, 2);
        assert!(registry.get(1).unwrap().pitch_calls.is_empty());
        assert_eq!(registry.get(3).unwrap().rate, 2.0);
    }

    #[test]
    fn test_reference_with_unusable_tempo() {
        let mut registry = registry_of(&[(0.0, 0), (100.0, 7)]);
        for result in [sync_tempo_and_pitch(&mut registry, 0), sync_tempo_only(&mut registry, 0)] {
            match result {
                Err(MixerError::UnusableReferenceTempo { reference, tempo }) => {
                    assert_eq!(reference, 0);
                    assert_eq!(tempo, 0.0);
                }
                other => panic!("expected an unusable tempo error, got {:?}", other),
            }
        }
        assert!(registry.all().all(|h| h.rate_calls.is_empty() && h.pitch_calls.is_empty()));

        let report = sync_pitch_only(&mut registry, 0).unwrap();
        assert_eq!(report.corrected, 2);
        assert_eq!(registry.get(1).unwrap().pitch, 5.0);
    }

    #[test]
    fn test_shift_beyond_pitch_range_is_skipped() {
        // 250/60 drifts about 24.7 semitones, more than the stage can undo
        let mut registry = registry_of(&[(250.0, 0), (60.0, 0), (200.0, 0)]);
        let report = sync_tempo_and_pitch(&mut registry, 0).unwrap();
        assert_eq!(report.corrected, 2);
        assert_eq!(report.skipped, 1);

        let slow = registry.get(1).unwrap();
        assert!(slow.rate_calls.is_empty() && slow.pitch_calls.is_empty());
        assert_eq!(slow.rate, 1.0);
        assert!((registry.get(2).unwrap().rate - 1.25).abs() < EPS);
    }

    #[test]
    fn test_reset_all() {
        let mut registry = registry_of(&[(120.0, 0), (100.0, 7)]);
        sync_tempo_and_pitch(&mut registry, 0).unwrap();
        reset_all(&mut registry);
        assert!(registry.all().all(|h| h.rate == 1.0 && h.pitch == 0.0));
    }

    #[test]
    fn test_sync_drives_track_engines() {
        let mut registry = MixerRegistry::new();
        for (tempo, tonic) in [(120.0, 0), (100.0, 7)] {
            let metadata = TrackMetadata::new(tonic, tempo);
            let mut track = TrackEngine::new("track", metadata.clone(), TrackSettings::default());
            let ticket = track.begin_load(metadata);
            track
                .complete_load(ticket, RecordingBackend::new(), vec!["vocals".to_string()])
                .unwrap();
            registry.register(track);
        }

        sync_tempo_and_pitch(&mut registry, 0).unwrap();

        let target = registry.get(1).unwrap();
        let backend = target.backend().unwrap();
        let rate = backend.last_rate().unwrap();
        let pitch = backend.last_pitch().unwrap();
        assert!((rate - 1.2).abs() < EPS);
        assert!((pitch + 12.0 * rate.log2() - 5.0).abs() < EPS);
    }
}
