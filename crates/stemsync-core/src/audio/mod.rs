//! Device output for track graphs via cpal
//!
//! Each track graph opens its own output stream the first time it is resumed.
//! The stream's callback drives the graph's renderer, which advances that
//! graph's engine clock.
//!
//! ```ignore
//! use stemsync_core::audio::{OutputConfig, ResolvedOutput};
//!
//! let output = ResolvedOutput::resolve(&OutputConfig::default())?;
//! let stream = output.open(graph.renderer())?;
//! ```

mod config;
mod device;
mod output;

pub use config::{BufferSize, DeviceId, OutputConfig, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use device::{find_device_by_id, get_default_device, get_output_devices, AudioDevice};
pub use output::{OutputStream, ResolvedOutput, SharedRenderer};
