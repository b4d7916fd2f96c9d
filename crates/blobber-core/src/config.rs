use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Node configuration, loaded from TOML.
///
/// Missing keys take their defaults, so an empty file is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobberConfig {
    /// Identity of this node; markers must name it.
    pub blobber_id: String,
    /// Block size in bytes for block counts, reads, and read pricing.
    pub chunk_size: u64,
    /// Pools must stay valid this long past a read; also bounds ledger
    /// requests made for reads.
    pub read_lock_timeout_secs: u64,
    /// Same as `read_lock_timeout_secs`, for writes.
    pub write_lock_timeout_secs: u64,
    /// How long an operation waits for an allocation or connection lock.
    pub lock_wait_secs: u64,
    /// Deadline for assembling reference-path listings.
    pub listing_timeout_secs: u64,
    /// Default and maximum page size for paginated refs.
    pub page_limit: usize,
}

impl Default for BlobberConfig {
    fn default() -> Self {
        Self {
            blobber_id: "blobber-local".into(),
            chunk_size: 64 * 1024,
            read_lock_timeout_secs: 60,
            write_lock_timeout_secs: 60,
            lock_wait_secs: 30,
            listing_timeout_secs: 15,
            page_limit: 100,
        }
    }
}

impl BlobberConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn validate(&self) -> CoreResult<()> {
        let checks = [
            (self.blobber_id.is_empty(), "blobber_id must not be empty"),
            (self.chunk_size == 0, "chunk_size must be positive"),
            (self.page_limit == 0, "page_limit must be positive"),
            (self.lock_wait_secs == 0, "lock_wait_secs must be positive"),
            (
                self.read_lock_timeout_secs == 0,
                "read_lock_timeout_secs must be positive",
            ),
            (
                self.write_lock_timeout_secs == 0,
                "write_lock_timeout_secs must be positive",
            ),
            (
                self.listing_timeout_secs == 0,
                "listing_timeout_secs must be positive",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(CoreError::Config((*message).into())),
            None => Ok(()),
        }
    }

    pub fn read_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.read_lock_timeout_secs)
    }

    pub fn write_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.write_lock_timeout_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }
}
