//! Rendering backend error types

use thiserror::Error;

/// Errors raised by a rendering backend or its output device
#[derive(Error, Debug)]
pub enum BackendError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Command queue to the renderer is full; the command was dropped
    #[error("Render command queue is full")]
    QueueFull,

    /// The graph has been disposed and accepts no further commands
    #[error("Audio graph has been disposed")]
    Disposed,

    /// Stem index outside the graph
    #[error("No stem at index {0}")]
    UnknownStem(usize),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
