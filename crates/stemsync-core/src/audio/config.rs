//! Output device configuration
//!
//! Selects which device each track graph's stream opens, and at which
//! sample rate and buffer size.

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SAMPLE_RATE;

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Smallest fixed buffer size accepted (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Largest fixed buffer size accepted (frames)
pub const MAX_BUFFER_SIZE: u32 = 8192;

/// Preferred buffer size for output streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSize {
    /// Let the engine pick a safe default
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to a sane range)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE),
        }
    }

    /// Latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, CoreAudio, ...)
/// so a device can be picked from a specific host when several are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier; None searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Output stream configuration shared by every track graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,
    /// Preferred buffer size
    pub buffer_size: BufferSize,
    /// Preferred sample rate; falls back to the device maximum if unsupported
    pub sample_rate: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_size: BufferSize::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}
