//! Offline render of a session to a WAV file

use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use stemsync_core::graph::{OfflineGraphFactory, MAX_BLOCK_SIZE};
use stemsync_core::{Session, StereoSample};

/// Frames rendered per pass
const BOUNCE_BLOCK: usize = 1024;

/// Play every ready track from its current position and write `seconds` of
/// the summed mix to `path` as 32-bit float stereo
///
/// Returns the number of frames written.
pub fn bounce(session: &mut Session<OfflineGraphFactory>, path: &Path, seconds: f64) -> Result<u64> {
    let sample_rate = session.sample_rate();
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("Failed to create {:?}", path))?;

    let total = (seconds * sample_rate as f64).round() as u64;
    let mut block = vec![StereoSample::silence(); BOUNCE_BLOCK.min(MAX_BLOCK_SIZE)];
    let mut scratch = Vec::with_capacity(block.len());
    let mut written = 0u64;

    session.play_all();
    while written < total {
        let frames = (total - written).min(block.len() as u64) as usize;
        session.render_mix(&mut block[..frames], &mut scratch);
        for sample in &block[..frames] {
            writer.write_sample(sample.left)?;
            writer.write_sample(sample.right)?;
        }
        written += frames as u64;
    }
    session.pause_all();

    writer.finalize().context("Failed to finalize WAV file")?;
    log::info!(
        "Bounced {:.1}s ({} frames) of {} tracks to {:?}",
        written as f64 / sample_rate as f64,
        written,
        session.registry().len(),
        path
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stemsync_core::engine::TrackSettings;
    use stemsync_core::graph::PitchQuality;
    use stemsync_core::loader::StemSource;
    use stemsync_core::music::TrackMetadata;

    const SR: u32 = 8000;

    fn tone(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let spec = WavSpec {
            channels: 2,
            sample_rate: SR,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for i in 0..SR {
            let value = if (i / 20) % 2 == 0 { 4000i16 } else { -4000 };
            writer.write_sample(value).unwrap();
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_bounce_writes_requested_length() {
        let dir = tempfile::tempdir().unwrap();
        let factory = OfflineGraphFactory::new(SR, PitchQuality::Cheaper);
        let mut session = Session::new(factory, TrackSettings::default()).unwrap();
        session
            .add_track(
                None,
                TrackMetadata::new(0, 120.0),
                vec![StemSource::new("vocals", tone(dir.path(), "v.wav"))],
            )
            .unwrap();
        session.wait_for_loads(Duration::from_secs(10));

        let out = dir.path().join("mix.wav");
        let frames = bounce(&mut session, &out, 0.5).unwrap();
        assert_eq!(frames, 4000);

        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, SR);
        assert_eq!(reader.len(), 8000);
        assert!(!session.registry().any_playing());
    }
}
