//! Session description: which tracks to load and where their stems live
//!
//! ```yaml
//! base_dir: /path/to/output
//! tracks:
//!   - name: first song
//!     stems: { vocals: song1/vocals.mp3, drums: song1/drums.mp3 }
//!     metadata: { key: "C", tonic: 0, mode: major, tempo: 120.0 }
//!   - stems: { vocals: song2/vocals.mp3, drums: song2/drums.mp3 }
//!     metadata_file: song2/key.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::io::read_yaml;
use crate::loader::StemSource;
use crate::music::TrackMetadata;

/// One track of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Display name; defaults to "Song N"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stem name to file, relative to the session's base dir unless absolute
    pub stems: BTreeMap<String, PathBuf>,
    /// Inline metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TrackMetadata>,
    /// Key-detection JSON file, used when no inline metadata is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_file: Option<PathBuf>,
}

impl TrackConfig {
    /// Stem sources with paths resolved against `base_dir`
    pub fn stem_sources(&self, base_dir: &Path) -> Vec<StemSource> {
        self.stems
            .iter()
            .map(|(name, path)| StemSource::new(name.clone(), resolve(base_dir, path)))
            .collect()
    }

    /// Validated metadata, inline or read from `metadata_file`
    pub fn resolve_metadata(&self, base_dir: &Path) -> Result<TrackMetadata> {
        let metadata = match (&self.metadata, &self.metadata_file) {
            (Some(metadata), _) => metadata.clone(),
            (None, Some(file)) => {
                let path = resolve(base_dir, file);
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read metadata file: {:?}", path))?;
                TrackMetadata::from_json(&json).with_context(|| format!("Invalid metadata in {:?}", path))?
            }
            (None, None) => bail!("Track has neither metadata nor metadata_file"),
        };
        metadata.profile().map_err(|e| anyhow!(e))?;
        Ok(metadata)
    }
}

/// A session file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory stem paths are relative to; defaults to the session file's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,
}

impl SessionConfig {
    /// Read a session file, resolving its base dir and checking every track
    pub fn load(path: &Path) -> Result<Self> {
        let mut session: Self = read_yaml(path)?;
        if session.base_dir.is_none() {
            session.base_dir = path.parent().map(Path::to_path_buf);
        }
        let base_dir = session.base_dir();
        for (index, track) in session.tracks.iter().enumerate() {
            if track.stems.is_empty() {
                bail!("Track {} in {:?} has no stems", index + 1, path);
            }
            track
                .resolve_metadata(&base_dir)
                .with_context(|| format!("Track {} in {:?}", index + 1, path))?;
        }
        log::info!("Loaded session {:?} with {} tracks", path, session.tracks.len());
        Ok(session)
    }

    /// The base dir, or the current directory
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
