//! Layer cache access
//!
//! The cache is a content-addressed store of layer archives persisted
//! across builds, plus the layer metadata of the build that filled it.
//! Archives are immutable once committed and are looked up by the hash
//! recorded in that metadata.
//!
//! # Layout of a volume cache
//!
//! | Path | Contents |
//! |------|----------|
//! | `committed/sha256-<hex>.tar` | Layer archive |
//! | `committed/io.buildpacks.lifecycle.cache.metadata` | Cache metadata (JSON) |

pub mod volume;

pub use volume::VolumeCache;

use crate::error::{KilnError, KilnResult};
use crate::log::Logger;
use crate::platform::CacheMetadata;
use async_trait::async_trait;
use std::io::Read;

/// Read side of a layer cache
///
/// Implementations must allow concurrent `retrieve_layer` calls.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Human-readable name for log lines
    fn name(&self) -> String;

    /// Whether the cache has been initialised
    async fn exists(&self) -> bool;

    /// Layer metadata of the build that filled the cache; empty when the
    /// cache holds nothing yet
    async fn retrieve_metadata(&self) -> KilnResult<CacheMetadata>;

    /// Archive stream for the layer with hash `sha`; dropping the reader
    /// closes it
    async fn retrieve_layer(&self, sha: &str) -> KilnResult<Box<dyn Read + Send>>;
}

/// Cache metadata to reconcile against; empty without a usable cache
pub async fn retrieve_cache_metadata(
    cache: Option<&dyn Cache>,
    logger: &dyn Logger,
) -> KilnResult<CacheMetadata> {
    let Some(cache) = cache else {
        logger.debug("Usable cache not provided, using empty cache metadata");
        return Ok(CacheMetadata::default());
    };

    if !cache.exists().await {
        logger.info("Layer cache not found");
    }
    cache.retrieve_metadata().await.map_err(|e| match e {
        KilnError::CacheMetadataRead(_) => e,
        other => KilnError::CacheMetadataRead(other.to_string()),
    })
}
