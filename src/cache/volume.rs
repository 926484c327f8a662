//! Directory-backed layer cache
//!
//! A cache volume is a directory mounted into every build. Committed
//! archives are never rewritten: committing a layer whose hash already
//! exists is a no-op.

use crate::cache::Cache;
use crate::error::{KilnError, KilnResult};
use crate::layer::archive::write_layer_tar;
use crate::platform::CacheMetadata;
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Name of the metadata document inside `committed/`
const METADATA_FILE: &str = "io.buildpacks.lifecycle.cache.metadata";

/// Cache stored in a local directory
#[derive(Debug, Clone)]
pub struct VolumeCache {
    dir: PathBuf,
}

impl VolumeCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn committed_dir(&self) -> PathBuf {
        self.dir.join("committed")
    }

    fn metadata_path(&self) -> PathBuf {
        self.committed_dir().join(METADATA_FILE)
    }

    /// Archive path for a layer hash (`:` is not portable in file names)
    fn layer_path(&self, sha: &str) -> PathBuf {
        self.committed_dir().join(format!("{}.tar", sha.replace(':', "-")))
    }

    /// Archive `layer_dir` into the cache and return its hash
    pub fn commit_layer(&self, layer_dir: &Path) -> KilnResult<String> {
        let committed = self.committed_dir();
        fs::create_dir_all(&committed)
            .map_err(|e| KilnError::io(format!("creating {}", committed.display()), e))?;

        // Stage next to the archives so the final rename stays on one filesystem
        let mut staging = NamedTempFile::new_in(&committed)
            .map_err(|e| KilnError::io(format!("staging in {}", committed.display()), e))?;
        let (writer, sha) = write_layer_tar(layer_dir, BufWriter::new(staging.as_file_mut()))?;
        writer
            .into_inner()
            .map_err(|e| KilnError::io("flushing layer archive", e.into_error()))?
            .sync_all()
            .map_err(|e| KilnError::io("syncing layer archive", e))?;

        let dest = self.layer_path(&sha);
        if dest.exists() {
            debug!("Layer {} already cached", sha);
        } else {
            staging.persist(&dest).map_err(|e| {
                KilnError::io(format!("committing {}", dest.display()), e.error)
            })?;
        }
        Ok(sha)
    }

    /// Replace the cache metadata document
    pub fn commit_metadata(&self, metadata: &CacheMetadata) -> KilnResult<()> {
        let committed = self.committed_dir();
        fs::create_dir_all(&committed)
            .map_err(|e| KilnError::io(format!("creating {}", committed.display()), e))?;

        let path = self.metadata_path();
        let mut file = File::create(&path)
            .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))?;
        file.write_all(serde_json::to_string_pretty(metadata)?.as_bytes())
            .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))
    }
}

#[async_trait]
impl Cache for VolumeCache {
    fn name(&self) -> String {
        self.dir.display().to_string()
    }

    async fn exists(&self) -> bool {
        tokio::fs::metadata(self.committed_dir())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn retrieve_metadata(&self) -> KilnResult<CacheMetadata> {
        let path = self.metadata_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache metadata at {}", path.display());
                return Ok(CacheMetadata::default());
            }
            Err(e) => {
                return Err(KilnError::CacheMetadataRead(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            KilnError::CacheMetadataRead(format!("parsing {}: {}", path.display(), e))
        })
    }

    async fn retrieve_layer(&self, sha: &str) -> KilnResult<Box<dyn Read + Send>> {
        let path = self.layer_path(sha);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(KilnError::CachedLayerNotFound(sha.to_string()))
            }
            Err(e) => Err(KilnError::io(format!("opening {}", path.display()), e)),
        }
    }
}
