//! # Runtime Configuration
//!
//! Loaded once at startup from TOML. Every key is optional.
//!
//! ```toml
//! frame_capacity = 8
//! scratch_capacity = 4096
//! worker_threads = 0
//! ```

use std::path::Path;

use radiance_core::{IndexedBy, RadianceError, RadianceResult, Reader};
use serde::{Deserialize, Serialize};

/// Tunables for a [`Universe`](crate::Universe).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Slots in every per-worker typed frame.
    pub frame_capacity: usize,
    /// Bytes in every per-worker scratch stack.
    pub scratch_capacity: usize,
    /// Size of the dedicated worker pool. 0 uses the global rayon pool.
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_capacity: Reader::DEFAULT_FRAME_CAPACITY,
            scratch_capacity: 4096,
            worker_threads: 0,
        }
    }
}

impl RuntimeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on malformed TOML, unknown keys, or a zero capacity.
    pub fn from_toml_str(source: &str) -> RadianceResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RadianceError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or does not validate.
    pub fn load(path: impl AsRef<Path>) -> RadianceResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RadianceError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks every capacity is usable.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first zero capacity.
    pub fn validate(&self) -> RadianceResult<()> {
        if self.frame_capacity == 0 {
            return Err(RadianceError::InvalidConfig("frame_capacity must be > 0".into()));
        }
        if self.scratch_capacity == 0 {
            return Err(RadianceError::InvalidConfig("scratch_capacity must be > 0".into()));
        }
        Ok(())
    }

    /// A typed reader using the configured frame capacity.
    #[must_use]
    pub const fn reader(&self, indexed_by: IndexedBy) -> Reader {
        Reader::new(indexed_by).with_frame_capacity(self.frame_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(RuntimeConfig::from_toml_str("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = RuntimeConfig::from_toml_str("worker_threads = 2\nscratch_capacity = 512").unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.scratch_capacity, 512);
        assert_eq!(config.frame_capacity, 8);
        assert_eq!(config.reader(IndexedBy::Key).frame_capacity(), 8);
    }

    #[test]
    fn test_rejects_bad_input() {
        for source in ["frame_capacity = 0", "scratch_capacity = \"big\"", "threads = 4"] {
            assert!(matches!(
                RuntimeConfig::from_toml_str(source),
                Err(RadianceError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RuntimeConfig::load("/nonexistent/radiance.toml"),
            Err(RadianceError::InvalidConfig(_))
        ));
    }
}
