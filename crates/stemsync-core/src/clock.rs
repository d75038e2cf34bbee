//! Per-track playback clock
//!
//! Tracks "seconds into the track" against the rendering backend's own
//! monotonic clock. The clock never reads the backend itself: callers pass the
//! engine-now reading in, so a single reading can be shared by every stem that
//! a transport operation touches.
//!
//! Position is kept in track time. Playback-rate changes are applied by the
//! renderer and never rescale the stored offset, which keeps repeated rate
//! edits from compounding rounding error.

/// Elapsed-position bookkeeping for one track
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioClock {
    /// Accumulated position, valid while paused and as the base while playing
    offset_seconds: f64,
    /// Engine time at which playback last started
    anchor_engine_time: f64,
    playing: bool,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark playback as started at `engine_now`
    pub fn start(&mut self, engine_now: f64) {
        self.anchor_engine_time = engine_now;
        self.playing = true;
    }

    /// Fold the elapsed time since the last start into the offset and stop
    pub fn stop(&mut self, engine_now: f64) {
        if self.playing {
            self.offset_seconds = (self.offset_seconds + (engine_now - self.anchor_engine_time)).max(0.0);
        }
        self.playing = false;
    }

    /// Move the position by `delta` seconds, floored at zero
    ///
    /// While playing, the clock is re-anchored at `engine_now` so the jump
    /// takes effect immediately.
    pub fn seek_by(&mut self, delta: f64, engine_now: f64) {
        if self.playing {
            self.stop(engine_now);
            self.offset_seconds = (self.offset_seconds + delta).max(0.0);
            self.start(engine_now);
        } else {
            self.offset_seconds = (self.offset_seconds + delta).max(0.0);
        }
    }

    /// Current position in seconds
    pub fn position(&self, engine_now: f64) -> f64 {
        if self.playing {
            ((engine_now - self.anchor_engine_time) + self.offset_seconds).max(0.0)
        } else {
            self.offset_seconds
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Back to position zero, not playing
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_paused_clock_reports_offset() {
        let clock = AudioClock::new();
        assert_eq!(clock.position(100.0), 0.0);
        assert!(!clock.is_playing());
    }

    #[test]
    fn test_position_advances_while_playing() {
        let mut clock = AudioClock::new();
        clock.start(10.0);
        assert!((clock.position(12.5) - 2.5).abs() < EPS);

        clock.stop(13.0);
        assert!((clock.position(50.0) - 3.0).abs() < EPS);

        clock.start(60.0);
        assert!((clock.position(61.0) - 4.0).abs() < EPS);
    }

    #[test]
    fn test_seek_is_floored_at_zero() {
        let mut clock = AudioClock::new();
        clock.seek_by(5.0, 0.0);
        clock.seek_by(-20.0, 0.0);
        assert_eq!(clock.position(0.0), 0.0);
    }

    #[test]
    fn test_seek_while_playing_reanchors() {
        let mut clock = AudioClock::new();
        clock.start(0.0);
        clock.seek_by(10.0, 4.0);
        assert!((clock.position(4.0) - 14.0).abs() < EPS);
        assert!((clock.position(5.0) - 15.0).abs() < EPS);
        assert!(clock.is_playing());
    }

    #[test]
    fn test_jump_round_trip_restores_position() {
        for playing in [false, true] {
            let mut clock = AudioClock::new();
            clock.seek_by(30.0, 0.0);
            if playing {
                clock.start(1.0);
            }
            let now = 7.25;
            let before = clock.position(now);
            clock.seek_by(10.0, now);
            clock.seek_by(-10.0, now);
            assert!((clock.position(now) - before).abs() < EPS);
        }
    }

    #[test]
    fn test_stop_when_not_playing_is_noop() {
        let mut clock = AudioClock::new();
        clock.seek_by(3.0, 0.0);
        clock.stop(100.0);
        assert_eq!(clock.position(200.0), 3.0);
    }

    #[test]
    fn test_reset() {
        let mut clock = AudioClock::new();
        clock.seek_by(3.0, 0.0);
        clock.start(1.0);
        clock.reset();
        assert_eq!(clock, AudioClock::new());
    }
}
