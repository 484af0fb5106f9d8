use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::mpsc;

use crate::services::tty::WindowSize;

/// Terminal device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtyConfig {
    /// Width reported when neither the terminal nor `COLUMNS` provide one
    #[serde(default = "default_cols")]
    pub default_cols: u16,

    /// Height reported when neither the terminal nor `LINES` provide one
    #[serde(default = "default_rows")]
    pub default_rows: u16,

    /// Consult `COLUMNS`/`LINES` when the terminal reports a zero dimension
    #[serde(default = "default_true")]
    pub respect_env_size: bool,

    /// Number of chunks the mirror channel buffers before `read` blocks.
    /// Zero makes every read rendezvous with the mirror consumer.
    #[serde(default)]
    pub mirror_capacity: usize,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    25
}

fn default_true() -> bool {
    true
}

impl Default for TtyConfig {
    fn default() -> Self {
        Self {
            default_cols: default_cols(),
            default_rows: default_rows(),
            respect_env_size: true,
            mirror_capacity: 0,
        }
    }
}

impl TtyConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TtyConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Reject fallback geometry that a renderer could not lay out
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_cols == 0 || self.default_rows == 0 {
            return Err(ConfigError::ValidationError(format!(
                "default size must be non-zero, got {}x{}",
                self.default_cols, self.default_rows
            )));
        }
        Ok(())
    }

    /// Fallback geometry used at the end of the window size chain
    pub fn default_size(&self) -> WindowSize {
        WindowSize {
            cols: self.default_cols,
            rows: self.default_rows,
        }
    }

    /// Create a mirror channel sized by `mirror_capacity`
    pub fn mirror_channel(&self) -> (mpsc::SyncSender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        mpsc::sync_channel(self.mirror_capacity)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TtyConfig::default();
        assert_eq!(config.default_size(), WindowSize { cols: 80, rows: 25 });
        assert!(config.respect_env_size);
        assert_eq!(config.mirror_capacity, 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = TtyConfig::from_json(r#"{ "default_cols": 132 }"#).unwrap();
        assert_eq!(config.default_cols, 132);
        assert_eq!(config.default_rows, 25);
        assert!(config.respect_env_size);
    }

    #[test]
    fn test_zero_default_size_is_rejected() {
        let err = TtyConfig::from_json(r#"{ "default_rows": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = TtyConfig::from_json("{ default_cols: ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tty.json");

        let config = TtyConfig {
            default_cols: 100,
            default_rows: 40,
            respect_env_size: false,
            mirror_capacity: 8,
        };
        config.save_to_file(&path).unwrap();

        let loaded = TtyConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_mirror_channel_capacity() {
        let config = TtyConfig {
            mirror_capacity: 2,
            ..TtyConfig::default()
        };
        let (tx, rx) = config.mirror_channel();
        tx.try_send(vec![1]).unwrap();
        tx.try_send(vec![2]).unwrap();
        assert!(tx.try_send(vec![3]).is_err());
        assert_eq!(rx.recv().unwrap(), vec![1]);
    }
}
