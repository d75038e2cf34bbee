//! Standard locations for stemsync configuration files

use std::path::PathBuf;

/// Directory holding stemsync configuration
///
/// Returns `{config_dir}/stemsync`, e.g. `~/.config/stemsync` on Linux.
/// Falls back to the current directory when the platform has no config dir.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemsync")
}

/// Default path of a config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_stemsync() {
        assert!(default_config_dir().ends_with("stemsync"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("engine.yaml");
        assert!(path.ends_with("stemsync/engine.yaml"));
    }
}
