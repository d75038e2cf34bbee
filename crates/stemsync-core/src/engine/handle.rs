//! The externally visible surface of a track
//!
//! Callers outside the engine (the registry's fan-out, the sync functions,
//! front ends) see a track only through [`MixerHandle`]. Every operation is
//! infallible at this level: the core error kinds are absorbed and logged.

use super::error::absorb;
use super::track::TrackEngine;
use crate::backend::RenderBackend;

/// Transport, mixing and musical metadata of one track
pub trait MixerHandle {
    /// Display label
    fn label(&self) -> &str;

    fn play_all(&mut self);
    fn pause_all(&mut self);
    fn jump(&mut self, delta_seconds: f64);

    /// Volume of one stem in percent; 0 hard-mutes
    fn set_volume_pct(&mut self, stem: &str, pct: f64);
    fn reset_volumes(&mut self);

    fn set_playback_rate(&mut self, rate: f64);
    fn set_pitch_shift(&mut self, semitones: f64);

    fn is_playing(&self) -> bool;
    /// Pitch class of the track's key, 0-11
    fn tonic(&self) -> u8;
    /// Detected tempo in BPM
    fn tempo(&self) -> f64;
    /// Elapsed seconds into the track
    fn current_position(&self) -> f64;

    fn playback_rate(&self) -> f64;
    fn pitch_shift(&self) -> f64;
}

impl<B: RenderBackend> MixerHandle for TrackEngine<B> {
    fn label(&self) -> &str {
        TrackEngine::label(self)
    }

    fn play_all(&mut self) {
        if let Err(e) = self.try_play_all() {
            absorb("play", e);
        }
    }

    fn pause_all(&mut self) {
        if let Err(e) = self.try_pause_all() {
            absorb("pause", e);
        }
    }

    fn jump(&mut self, delta_seconds: f64) {
        if let Err(e) = self.try_jump(delta_seconds) {
            absorb("jump", e);
        }
    }

    fn set_volume_pct(&mut self, stem: &str, pct: f64) {
        if let Err(e) = self.try_set_volume_pct(stem, pct) {
            absorb("set volume", e);
        }
    }

    fn reset_volumes(&mut self) {
        if let Err(e) = self.try_reset_volumes() {
            absorb("reset volumes", e);
        }
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if let Err(e) = self.try_set_playback_rate(rate) {
            absorb("set playback rate", e);
        }
    }

    fn set_pitch_shift(&mut self, semitones: f64) {
        if let Err(e) = self.try_set_pitch_shift(semitones) {
            absorb("set pitch shift", e);
        }
    }

    fn is_playing(&self) -> bool {
        TrackEngine::is_playing(self)
    }

    fn tonic(&self) -> u8 {
        self.metadata().tonic
    }

    fn tempo(&self) -> f64 {
        self.metadata().tempo
    }

    fn current_position(&self) -> f64 {
        TrackEngine::current_position(self)
    }

    fn playback_rate(&self) -> f64 {
        TrackEngine::playback_rate(self)
    }

    fn pitch_shift(&self) -> f64 {
        TrackEngine::pitch_shift(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::RecordingBackend;
    use crate::engine::track::TrackSettings;
    use crate::music::TrackMetadata;

    fn ready_track() -> TrackEngine<RecordingBackend> {
        let mut track = TrackEngine::new("Song 1", TrackMetadata::new(4, 128.0), TrackSettings::default());
        let ticket = track.begin_load(TrackMetadata::new(4, 128.0));
        track
            .complete_load(ticket, RecordingBackend::new(), vec!["vocals".to_string()])
            .unwrap();
        track
    }

    #[test]
    fn test_handle_reads_metadata() {
        let track = ready_track();
        let handle: &dyn MixerHandle = &track;
        assert_eq!(handle.tonic(), 4);
        assert_eq!(handle.tempo(), 128.0);
        assert_eq!(handle.label(), "Song 1");
    }

    #[test]
    fn test_handle_absorbs_errors() {
        let mut track = ready_track();
        let handle: &mut dyn MixerHandle = &mut track;
        handle.set_playback_rate(0.0);
        handle.set_playback_rate(-2.0);
        handle.set_volume_pct("keys", 20.0);
        handle.set_pitch_shift(f64::NAN);
        assert_eq!(handle.playback_rate(), 1.0);
        assert_eq!(handle.pitch_shift(), 0.0);
    }

    #[test]
    fn test_handle_on_unloaded_track_is_inert() {
        let mut track: TrackEngine<RecordingBackend> =
            TrackEngine::new("Song 2", TrackMetadata::new(0, 90.0), TrackSettings::default());
        let handle: &mut dyn MixerHandle = &mut track;
        handle.play_all();
        handle.jump(10.0);
        assert!(!handle.is_playing());
        assert_eq!(handle.current_position(), 0.0);
    }
}
