//! On-disk layer discovery and classification
//!
//! A layer is any `<name>/` directory or `<name>.toml` descriptor inside a
//! buildpack's layers directory. `launch.toml`, `build.toml` and
//! `store.toml` belong to the buildpack itself and are never layers.

use crate::api::ApiVersion;
use crate::buildpack::group::{escape_id, GroupBuildpack};
use crate::error::{KilnError, KilnResult};
use crate::platform::LayerMetadataMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Descriptor names that are not layers
const RESERVED_DESCRIPTORS: &[&str] = &["launch", "build", "store"];

/// Layer types table used by buildpack API 0.6+
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTypes {
    #[serde(default)]
    pub launch: bool,
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub cache: bool,
}

/// Parsed `<layer>.toml`
///
/// Buildpacks below API 0.6 write the type flags at the top level; newer
/// buildpacks write them under `[types]`. `sha` is only present when the
/// descriptor was written by the layer metadata restorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub launch: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub build: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cache: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<LayerTypes>,

    /// Buildpack-defined metadata
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub metadata: toml::Table,
}

impl LayerDescriptor {
    /// The descriptor's own cache flag (buildpack API < 0.6 form)
    pub fn made_cached(&self) -> bool {
        self.cache
    }
}

/// A layer directory entry for one buildpack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    buildpack_id: String,
    name: String,
    dir: PathBuf,
}

impl Layer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buildpack_id(&self) -> &str {
        &self.buildpack_id
    }

    /// `<buildpack id>:<layer name>`, used in log lines and errors
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.buildpack_id, self.name)
    }

    /// Layer content directory
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.dir.join(format!("{}.toml", self.name))
    }

    /// Sidecar file holding the layer hash (platform API < 0.7)
    pub fn sha_path(&self) -> PathBuf {
        self.dir.join(format!("{}.sha", self.name))
    }

    /// Read the descriptor; a missing descriptor reads as empty
    pub fn read(&self) -> KilnResult<LayerDescriptor> {
        let path = self.descriptor_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LayerDescriptor::default()),
            Err(e) => {
                return Err(KilnError::LayerMetadataRead {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        toml::from_str(&content).map_err(|e| KilnError::LayerMetadataRead {
            path,
            reason: e.to_string(),
        })
    }

    pub fn write_descriptor(&self, descriptor: &LayerDescriptor) -> KilnResult<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| KilnError::io(format!("creating {}", self.dir.display()), e))?;
        let content = toml::to_string(descriptor)?;
        let path = self.descriptor_path();
        fs::write(&path, content)
            .map_err(|e| KilnError::io(format!("writing layer metadata {}", path.display()), e))
    }

    /// Read the sidecar hash, `None` when no sidecar exists
    pub fn read_sha(&self) -> KilnResult<Option<String>> {
        let path = self.sha_path();
        match fs::read_to_string(&path) {
            Ok(sha) => Ok(Some(sha.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KilnError::io(format!("reading layer sha {}", path.display()), e)),
        }
    }

    pub fn write_sha(&self, sha: &str) -> KilnResult<()> {
        let path = self.sha_path();
        fs::write(&path, sha)
            .map_err(|e| KilnError::io(format!("writing layer sha {}", path.display()), e))
    }

    /// Delete the layer directory, descriptor and sidecar
    pub fn remove(&self) -> KilnResult<()> {
        let remove_err = |source| KilnError::LayerRemove {
            layer: self.identifier(),
            source,
        };

        match fs::remove_dir_all(self.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(remove_err(e)),
        }
        for file in [self.descriptor_path(), self.sha_path()] {
            match fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(remove_err(e)),
            }
        }
        Ok(())
    }
}

/// Decides whether an on-disk layer is a cache-candidate
///
/// Buildpack API 0.6+ never writes type flags into `<layer>.toml` that the
/// restorer can rely on, so only the cache metadata identifies cache=true
/// layers. Older buildpacks are judged by their own descriptor, which lets
/// the restorer clean up descriptors for layers that are no longer cached.
#[derive(Debug, Clone, Copy)]
pub enum CacheClassifier<'a> {
    CacheMetadata(&'a LayerMetadataMap),
    DescriptorFlag,
}

impl<'a> CacheClassifier<'a> {
    pub fn for_buildpack(api: ApiVersion, cached_layers: &'a LayerMetadataMap) -> Self {
        if api.at_least("0.6") {
            Self::CacheMetadata(cached_layers)
        } else {
            Self::DescriptorFlag
        }
    }

    pub fn is_cache_candidate(&self, layer: &Layer) -> bool {
        match self {
            Self::CacheMetadata(cached) => cached
                .get(layer.name())
                .map(|record| record.cache)
                .unwrap_or(false),
            // An unreadable descriptor is not cache intent
            Self::DescriptorFlag => layer.read().map(|d| d.made_cached()).unwrap_or(false),
        }
    }
}

/// The layers directory of one buildpack
#[derive(Debug, Clone)]
pub struct BuildpackLayersDir {
    buildpack_id: String,
    path: PathBuf,
    layer_names: BTreeSet<String>,
}

impl BuildpackLayersDir {
    /// Scan `<layers_dir>/<escaped id>`; a missing directory has no layers
    pub fn read(layers_dir: &Path, buildpack: &GroupBuildpack) -> KilnResult<Self> {
        let path = layers_dir.join(escape_id(&buildpack.id));
        let mut layer_names = BTreeSet::new();

        let entries = match fs::read_dir(&path) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => return Err(KilnError::LayersDirRead { path, source }),
        };

        for entry in entries.into_iter().flatten() {
            let entry = entry.map_err(|source| KilnError::LayersDirRead {
                path: path.clone(),
                source,
            })?;
            let file_type = entry.file_type().map_err(|source| KilnError::LayersDirRead {
                path: path.clone(),
                source,
            })?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            if file_type.is_dir() {
                layer_names.insert(file_name);
            } else if let Some(name) = file_name.strip_suffix(".toml") {
                if !RESERVED_DESCRIPTORS.contains(&name) {
                    layer_names.insert(name.to_string());
                }
            }
        }

        Ok(Self {
            buildpack_id: buildpack.id.clone(),
            path,
            layer_names,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layer handle for `name`, whether or not it exists yet
    pub fn layer(&self, name: &str) -> Layer {
        Layer {
            buildpack_id: self.buildpack_id.clone(),
            name: name.to_string(),
            dir: self.path.clone(),
        }
    }

    /// Discovered layers matching `predicate`, ordered by name
    pub fn find_layers<F>(&self, predicate: F) -> Vec<Layer>
    where
        F: Fn(&Layer) -> bool,
    {
        self.layer_names
            .iter()
            .map(|name| self.layer(name))
            .filter(|layer| predicate(layer))
            .collect()
    }
}
