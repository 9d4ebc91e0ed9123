//! Engine configuration.
//!
//! Loaded from TOML; every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```toml
//! root_mode = 0o755
//! uid = 1000
//! gid = 1000
//! name_max = 255
//! max_symlink_depth = 40
//! max_file_size = 17179869184
//! block_size = 4096
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default cap on how far a write or truncate may extend a file (16 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunables for an [`Engine`](crate::vfs::Engine) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Permission bits of the root directory.
    pub root_mode: u32,
    /// Owner of the root and default owner of new nodes.
    pub uid: u32,
    /// Group of the root and default group of new nodes.
    pub gid: u32,
    /// Longest accepted entry name, in bytes.
    pub name_max: usize,
    /// Symlink hops allowed while resolving one path.
    pub max_symlink_depth: u32,
    /// Largest size a file may grow to.
    pub max_file_size: u64,
    /// Block size reported by statfs.
    pub block_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_mode: 0o755,
            uid: 0,
            gid: 0,
            name_max: 255,
            max_symlink_depth: 40,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            block_size: 4096,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Set the default owner.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Set the root directory's permission bits.
    pub fn with_root_mode(mut self, mode: u32) -> Self {
        self.root_mode = mode;
        self
    }

    /// Set the maximum file size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set the maximum name length.
    pub fn with_name_max(mut self, len: usize) -> Self {
        self.name_max = len;
        self
    }

    /// Set the symlink hop limit.
    pub fn with_max_symlink_depth(mut self, depth: u32) -> Self {
        self.max_symlink_depth = depth;
        self
    }
}
