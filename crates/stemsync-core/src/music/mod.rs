//! Music theory utilities for tempo and key matching
//!
//! Provides key parsing, the shortest-rotation tonic distance used by the
//! sync controller, and the pitch side effect of varispeed playback.

mod metadata;

pub use metadata::{MetadataError, MusicalProfile, ScaleMode, TrackMetadata};

/// Note names indexed by pitch class (0=C ... 11=B)
pub const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Number of pitch classes in an octave
pub const PITCH_CLASSES: i32 = 12;

/// Musical key with root note and scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalKey {
    /// Root note as semitone offset from C (0=C, 1=C#, 2=D, ..., 11=B)
    pub root: u8,
    /// true = minor, false = major
    pub minor: bool,
}

impl MusicalKey {
    /// Create a new musical key
    pub const fn new(root: u8, minor: bool) -> Self {
        Self {
            root: root % 12,
            minor,
        }
    }

    /// Parse key string like "Am", "C#m", "F", "Bb"
    ///
    /// Supported formats:
    /// - Single letter: C, D, E, F, G, A, B
    /// - With sharp: C#, D#, F#, G#, A#
    /// - With flat: Db, Eb, Gb, Ab, Bb
    /// - Minor suffix: Am, C#m, Bbm (also "A minor")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        let mut chars = s.chars().peekable();

        let root_char = chars.next()?.to_ascii_uppercase();
        let base_root = match root_char {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let root = match chars.peek() {
            Some('#') => {
                chars.next();
                (base_root + 1) % 12
            }
            Some('b') => {
                chars.next();
                (base_root + 11) % 12 // +11 is same as -1 mod 12
            }
            _ => base_root,
        };

        let remaining: String = chars.collect::<String>().trim().to_lowercase();
        let minor = remaining.starts_with('m') && !remaining.starts_with("maj");

        Some(Self { root, minor })
    }
}

impl std::fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let note = NOTE_NAMES[self.root as usize];
        if self.minor {
            write!(f, "{}m", note)
        } else {
            write!(f, "{}", note)
        }
    }
}

/// Semitones to rotate `target` so its tonic lands on `reference`
///
/// Takes the remainder of `reference - target` (truncating, so the sign
/// follows the raw difference) and folds it onto the shortest rotation: never
/// more than a tritone either way. A raw difference of exactly -6 stays -6.
pub fn tonic_delta(reference: u8, target: u8) -> i32 {
    let delta = (reference as i32 - target as i32) % PITCH_CLASSES;
    if delta > 6 {
        delta - PITCH_CLASSES
    } else if delta < -6 {
        delta + PITCH_CLASSES
    } else {
        delta
    }
}

/// Pitch change in semitones imparted by playing at `rate` without correction
///
/// Doubling the rate raises pitch by an octave (12 semitones).
#[inline]
pub fn tempo_drift_semitones(rate: f64) -> f64 {
    12.0 * rate.log2()
}

/// Frequency ratio of a shift in semitones
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}
