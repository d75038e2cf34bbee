//! cpal output streams for track graphs
//!
//! ```text
//! ┌──────────────────┐   push()    ┌─────────────────────┐
//! │  Control thread  │────────────►│   Command Queue     │
//! │   (StemGraph)    │             │  (lock-free SPSC)   │
//! └──────────────────┘             └──────────┬──────────┘
//!         │                                   │ pop()
//!         │ Relaxed atomics                   ▼
//! ┌──────────────────┐             ┌─────────────────────┐
//! │  GraphAtomics    │◄────────────│  cpal Audio Thread  │
//! │  (engine clock)  │  frame count│  (GraphRenderer)    │
//! └──────────────────┘             └─────────────────────┘
//! ```
//!
//! Each track graph gets its own stream, so every track runs on its own
//! clock. The renderer sits behind a mutex only so offline rendering can
//! share it; the audio callback never waits on it.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::config::OutputConfig;
use super::device::{find_device_by_id, get_default_device};
use crate::backend::{BackendError, BackendResult};
use crate::graph::{GraphRenderer, MAX_BLOCK_SIZE};
use crate::types::StereoBuffer;

/// Renderer shared between a graph's control side and its output
pub type SharedRenderer = Arc<Mutex<GraphRenderer>>;

/// A device and stream configuration resolved from an [`OutputConfig`]
#[derive(Clone)]
pub struct ResolvedOutput {
    device: cpal::Device,
    stream_config: StreamConfig,
}

impl ResolvedOutput {
    /// Pick the device and the best stream configuration for it
    pub fn resolve(config: &OutputConfig) -> BackendResult<Self> {
        let device = match &config.device {
            Some(id) => find_device_by_id(id)?,
            None => get_default_device()?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let supported = best_output_config(&device, config.sample_rate)?;
        let buffer_size = config.buffer_size.frames();
        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(buffer_size),
        };

        log::info!(
            "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
            stream_config.channels,
            stream_config.sample_rate.0,
            buffer_size,
            config.buffer_size.latency_ms(stream_config.sample_rate.0)
        );

        Ok(Self {
            device,
            stream_config,
        })
    }

    /// Sample rate the device will run at
    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate.0
    }

    /// Build and start a stream pulling audio from `renderer`
    pub fn open(&self, renderer: SharedRenderer) -> BackendResult<OutputStream> {
        let stream = build_output_stream(&self.device, &self.stream_config, renderer)?;
        stream
            .play()
            .map_err(|e| BackendError::StreamPlayError(e.to_string()))?;
        log::debug!("Output stream started at {}Hz", self.sample_rate());
        Ok(OutputStream { _stream: stream })
    }
}

/// Keeps an output stream alive. Drop it to stop audio.
pub struct OutputStream {
    _stream: Stream,
}

/// Best output configuration for a device
///
/// Prefers f32 stereo at `target_sample_rate`; falls back to the device's
/// maximum rate when the target is out of range.
fn best_output_config(
    device: &cpal::Device,
    target_sample_rate: u32,
) -> BackendResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| BackendError::ConfigError(e.to_string()))?
        .collect();

    let best = supported_configs
        .iter()
        .find(|c| {
            c.sample_format() == SampleFormat::F32
                && c.channels() >= 2
                && target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| {
            BackendError::ConfigError("No f32 output configuration available".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best.min_sample_rate().0
        && target_sample_rate <= best.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (stems will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok(best.clone().with_sample_rate(sample_rate))
}

/// Build the output stream for one graph
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    renderer: SharedRenderer,
) -> BackendResult<Stream> {
    let channels = config.channels as usize;
    // Pre-allocated so the callback never allocates
    let mut scratch = StereoBuffer::silence(MAX_BLOCK_SIZE);

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let Ok(mut renderer) = renderer.try_lock() else {
                    data.fill(0.0);
                    return;
                };

                for chunk in data.chunks_mut(MAX_BLOCK_SIZE * channels) {
                    let n_frames = chunk.len() / channels;
                    scratch.set_len_from_capacity(n_frames);
                    renderer.render(scratch.as_mut_slice());

                    for (frame, sample) in chunk.chunks_mut(channels).zip(scratch.iter()) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| BackendError::StreamBuildError(e.to_string()))
}
