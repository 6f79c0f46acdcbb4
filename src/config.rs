//! Engine configuration for relstore

use std::path::{Path, PathBuf};

/// Default file name used when a data directory is given
pub const DEFAULT_DATA_FILE: &str = "relstore.json";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// File the database is loaded from on open and saved to on shutdown
    pub data_file: Option<PathBuf>,
    /// Save to `data_file` when the engine shuts down
    pub save_on_shutdown: bool,
    /// Write indented JSON
    pub pretty_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            save_on_shutdown: true,
            pretty_json: true,
        }
    }
}

impl EngineConfig {
    /// Create a new engine config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data file
    pub fn data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = Some(path.into());
        self
    }

    /// Use the default data file inside `dir`
    pub fn data_dir(self, dir: impl AsRef<Path>) -> Self {
        self.data_file(dir.as_ref().join(DEFAULT_DATA_FILE))
    }

    /// Enable or disable saving on shutdown
    pub fn save_on_shutdown(mut self, enabled: bool) -> Self {
        self.save_on_shutdown = enabled;
        self
    }

    /// Enable or disable indented JSON output
    pub fn pretty_json(mut self, enabled: bool) -> Self {
        self.pretty_json = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .data_dir("/tmp/store")
            .save_on_shutdown(false)
            .pretty_json(false);

        assert_eq!(
            config.data_file,
            Some(PathBuf::from("/tmp/store").join(DEFAULT_DATA_FILE))
        );
        assert!(!config.save_on_shutdown);
        assert!(!config.pretty_json);
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.data_file.is_none());
        assert!(config.save_on_shutdown);
    }
}
