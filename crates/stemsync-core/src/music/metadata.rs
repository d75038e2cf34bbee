//! Musical metadata delivered alongside a stem set
//!
//! The key-detection service reports `{ key, tonic, mode, tempo }` once a
//! separation job completes. This is validated once at the boundary and then
//! reduced to the [`MusicalProfile`] the sync controller works with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::MusicalKey;

/// Errors in externally supplied musical metadata
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    /// Tonic outside the 12 pitch classes
    #[error("Tonic {0} is not a pitch class (expected 0-11)")]
    TonicOutOfRange(u8),

    /// Tempo that cannot drive a playback rate
    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    /// Key label that could not be parsed
    #[error("Unrecognized key label: {0:?}")]
    InvalidKey(String),

    /// Key label naming a different root than the tonic
    #[error("Key label {label:?} disagrees with tonic {tonic}")]
    KeyMismatch { label: String, tonic: u8 },

    /// Malformed JSON payload
    #[error("Malformed metadata: {0}")]
    Malformed(String),
}

/// Scale mode reported by key detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    #[default]
    Major,
    Minor,
}

/// Metadata for one track, as delivered by the stem-delivery collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Display label such as "C" or "F#m"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Pitch class of the detected key (0=C ... 11=B)
    pub tonic: u8,
    /// Major/minor, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ScaleMode>,
    /// Detected tempo in BPM
    pub tempo: f64,
}

impl TrackMetadata {
    /// Metadata with only the values the engine needs
    pub fn new(tonic: u8, tempo: f64) -> Self {
        Self {
            key: None,
            tonic,
            mode: None,
            tempo,
        }
    }

    /// Parse the collaborator's JSON payload and validate it
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let metadata: Self =
            serde_json::from_str(json).map_err(|e| MetadataError::Malformed(e.to_string()))?;
        metadata.profile()?;
        Ok(metadata)
    }

    /// Validate and reduce to the values used for synchronization
    pub fn profile(&self) -> Result<MusicalProfile, MetadataError> {
        if self.tonic > 11 {
            return Err(MetadataError::TonicOutOfRange(self.tonic));
        }
        if !self.tempo.is_finite() || self.tempo <= 0.0 {
            return Err(MetadataError::InvalidTempo(self.tempo));
        }
        if let Some(label) = &self.key {
            let key = MusicalKey::parse(label)
                .ok_or_else(|| MetadataError::InvalidKey(label.clone()))?;
            if key.root != self.tonic {
                return Err(MetadataError::KeyMismatch {
                    label: label.clone(),
                    tonic: self.tonic,
                });
            }
        }
        Ok(MusicalProfile {
            tempo: self.tempo,
            tonic: self.tonic,
        })
    }

    /// Key label for display, derived from the tonic when none was supplied
    pub fn key_label(&self) -> String {
        match &self.key {
            Some(label) => label.clone(),
            None => MusicalKey::new(self.tonic, self.mode == Some(ScaleMode::Minor)).to_string(),
        }
    }
}

/// Tempo and tonal center of a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalProfile {
    /// Tempo in BPM
    pub tempo: f64,
    /// Pitch class 0-11
    pub tonic: u8,
}

impl MusicalProfile {
    pub fn new(tempo: f64, tonic: u8) -> Self {
        Self { tempo, tonic }
    }

    /// Whether this profile can take part in tempo synchronization
    pub fn has_valid_tempo(&self) -> bool {
        self.tempo.is_finite() && self.tempo > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collaborator_json() {
        let json = r#"{"key": "Am", "tonic": 9, "mode": "minor", "tempo": 123.05}"#;
        let metadata = TrackMetadata::from_json(json).unwrap();

        assert_eq!(metadata.tonic, 9);
        assert_eq!(metadata.mode, Some(ScaleMode::Minor));
        assert_eq!(metadata.profile().unwrap(), MusicalProfile::new(123.05, 9));
        assert_eq!(metadata.key_label(), "Am");
    }

    #[test]
    fn test_key_is_optional() {
        let metadata = TrackMetadata::from_json(r#"{"tonic": 7, "tempo": 100}"#).unwrap();
        assert_eq!(metadata.key_label(), "G");
    }

    #[test]
    fn test_rejects_out_of_range_tonic() {
        let metadata = TrackMetadata::new(12, 120.0);
        assert_eq!(metadata.profile(), Err(MetadataError::TonicOutOfRange(12)));
    }

    #[test]
    fn test_rejects_unusable_tempo() {
        assert!(matches!(
            TrackMetadata::new(0, 0.0).profile(),
            Err(MetadataError::InvalidTempo(_))
        ));
        assert!(matches!(
            TrackMetadata::new(0, f64::NAN).profile(),
            Err(MetadataError::InvalidTempo(_))
        ));
    }

    #[test]
    fn test_rejects_key_tonic_mismatch() {
        let json = r#"{"key": "D", "tonic": 0, "tempo": 120}"#;
        assert!(matches!(
            TrackMetadata::from_json(json),
            Err(MetadataError::KeyMismatch { tonic: 0, .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            TrackMetadata::from_json("{\"tonic\": }"),
            Err(MetadataError::Malformed(_))
        ));
    }
}
