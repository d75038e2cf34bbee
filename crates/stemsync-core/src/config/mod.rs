//! Configuration: engine defaults and session files
//!
//! - Generic YAML loading/saving (missing or invalid files fall back to defaults)
//! - Default config locations under the platform config dir
//! - [`EngineConfig`] for output, pitch quality and mixer defaults
//! - [`SessionConfig`] describing the tracks to load
//!
//! ```ignore
//! use stemsync_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let engine: EngineConfig = load_config(&default_config_path("engine.yaml"));
//! ```

mod engine;
mod io;
mod paths;
mod session;

pub use engine::{EngineConfig, DEFAULT_JUMP_SECONDS};
pub use io::{load_config, read_yaml, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use session::{SessionConfig, TrackConfig};
