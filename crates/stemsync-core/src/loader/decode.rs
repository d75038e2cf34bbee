//! Stem file decoding and sample-rate conversion
//!
//! Any format symphonia can probe is accepted. Mono files are duplicated to
//! both channels; files with more than two channels keep the first two.

use std::fs::File;
use std::path::Path;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::LoadError;
use crate::types::{Sample, StereoBuffer};

/// Decoded audio before conversion to the graph's sample rate
pub struct DecodedAudio {
    /// Left channel
    pub left: Vec<Sample>,
    /// Right channel
    pub right: Vec<Sample>,
    pub sample_rate: u32,
}

/// Decode a file into planar stereo
pub fn decode_file(path: &Path) -> Result<DecodedAudio, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "No audio track found".to_string(),
        })?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "Unknown sample rate".to_string(),
        })?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut left: Vec<Sample> = Vec::new();
    let mut right: Vec<Sample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                log::warn!("Error reading packet from {:?}: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {:?}: {}", path, e);
                continue;
            }
            Err(e) => {
                return Err(LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            match channels {
                0 => {}
                1 => {
                    left.extend_from_slice(buf.samples());
                    right.extend_from_slice(buf.samples());
                }
                n => {
                    for frame in buf.samples().chunks_exact(n) {
                        left.push(frame[0]);
                        right.push(frame[1]);
                    }
                }
            }
        }
    }

    log::debug!(
        "Decoded {:?}: {} frames, {} channels @ {}Hz",
        path,
        left.len(),
        channels,
        sample_rate
    );

    Ok(DecodedAudio {
        left,
        right,
        sample_rate,
    })
}

/// Convert planar stereo to `target_rate` with a sinc resampler
///
/// The filter delay is trimmed from the front and the tail flushed out, so
/// the result starts on the source's first frame and is
/// `len * target / source` frames long.
pub fn resample(audio: DecodedAudio, target_rate: u32) -> Result<StereoBuffer, LoadError> {
    if audio.sample_rate == target_rate || audio.left.is_empty() {
        return Ok(StereoBuffer::from_channels(&audio.left, &audio.right));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / audio.sample_rate as f64;
    let expected = (audio.left.len() as f64 * ratio).round() as usize;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, audio.left.len(), 2)
        .map_err(|e| LoadError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut left = Vec::with_capacity(delay + expected);
    let mut right = Vec::with_capacity(delay + expected);

    let waves_in = vec![audio.left, audio.right];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| LoadError::Resample(e.to_string()))?;
    append_stereo(&mut left, &mut right, waves_out)?;

    while left.len() < delay + expected {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        if !append_stereo(&mut left, &mut right, tail)? {
            break;
        }
    }

    let start = delay.min(left.len());
    left.drain(..start);
    right.drain(..start);
    left.resize(expected, 0.0);
    right.resize(expected, 0.0);
    Ok(StereoBuffer::from_channels(&left, &right))
}

/// Append one resampler output; `false` when it produced no frames
fn append_stereo(left: &mut Vec<f32>, right: &mut Vec<f32>, waves: Vec<Vec<f32>>) -> Result<bool, LoadError> {
    match waves.as_slice() {
        [l, r] => {
            left.extend_from_slice(l);
            right.extend_from_slice(r);
            Ok(!l.is_empty())
        }
        _ => Err(LoadError::Resample("Resampler returned wrong channel count".to_string())),
    }
}

/// Decode a stem file and convert it to `target_rate`
pub fn load_stem(path: &Path, target_rate: u32) -> Result<StereoBuffer, LoadError> {
    let audio = decode_file(path)?;
    let source_rate = audio.sample_rate;
    let buffer = resample(audio, target_rate)?;
    if source_rate != target_rate {
        log::debug!("Resampled {:?} from {}Hz to {}Hz", path, source_rate, target_rate);
    }
    Ok(buffer)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Write a 16-bit WAV fixture with a constant value per channel
    pub(crate) fn write_wav(dir: &Path, name: &str, channels: u16, sample_rate: u32, frames: usize, value: i16) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..frames {
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "drums.wav", 2, 48000, 4800, 16384);

        let audio = decode_file(&path).unwrap();
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.left.len(), 4800);
        assert_eq!(audio.right.len(), 4800);
        assert!((audio.left[100] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_mono_is_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "bass.wav", 1, 48000, 1000, -8192);

        let buffer = load_stem(&path, 48000).unwrap();
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer[10].left, buffer[10].right);
        assert!((buffer[10].left + 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_resample_changes_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "vocals.wav", 2, 24000, 24000, 1000);

        let buffer = load_stem(&path, 48000).unwrap();
        assert_eq!(buffer.len(), 48000);
    }

    #[test]
    fn test_resample_keeps_start_and_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "drums.wav", 2, 48000, 4800, 16384);

        let buffer = load_stem(&path, 44100).unwrap();
        assert_eq!(buffer.len(), 4410);
        // The step at either edge lands on the first and last frame, about
        // half height, rather than the filter delay's worth of silence
        assert!(buffer[0].left > 0.1, "{}", buffer[0].left);
        assert!(buffer[4409].right > 0.1, "{}", buffer[4409].right);
        assert!((buffer[2205].left - 0.5).abs() < 1e-2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = decode_file(Path::new("/nonexistent/stem.wav"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_garbage_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(decode_file(&path), Err(LoadError::UnsupportedFormat { .. })));
    }
}
