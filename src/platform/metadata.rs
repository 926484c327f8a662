//! Layer metadata recorded by previous builds
//!
//! The same shape is stored in two places: the cache keeps it as JSON
//! next to the layer archives, and the analyzer writes the previous app
//! image's copy into `analyzed.toml` under `[metadata]`.

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

/// Layer name -> recorded layer
pub type LayerMetadataMap = BTreeMap<String, BuildpackLayerMetadata>;

static EMPTY_LAYERS: LayerMetadataMap = BTreeMap::new();

/// One layer as recorded by the build that produced it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildpackLayerMetadata {
    /// Content hash of the layer archive
    #[serde(default)]
    pub sha: String,

    #[serde(default)]
    pub launch: bool,

    #[serde(default)]
    pub build: bool,

    #[serde(default)]
    pub cache: bool,

    /// Buildpack-defined metadata from the layer descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<toml::Table>,
}

/// All recorded layers of one buildpack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildpackLayersMetadata {
    /// Buildpack ID
    pub key: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub layers: LayerMetadataMap,

    /// Contents of the buildpack's `store.toml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<toml::Table>,
}

/// Recorded layers for every buildpack of a build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayersMetadata {
    #[serde(default)]
    pub buildpacks: Vec<BuildpackLayersMetadata>,
}

/// Layer metadata kept alongside the cache
pub type CacheMetadata = LayersMetadata;

impl LayersMetadata {
    pub fn for_buildpack(&self, id: &str) -> Option<&BuildpackLayersMetadata> {
        self.buildpacks.iter().find(|bp| bp.key == id)
    }

    /// Recorded layers of `id`; empty when the buildpack has no record
    pub fn layers_for(&self, id: &str) -> &LayerMetadataMap {
        self.for_buildpack(id)
            .map(|bp| &bp.layers)
            .unwrap_or(&EMPTY_LAYERS)
    }
}

/// Image identifier recorded by the analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageIdentifier {
    #[serde(default)]
    pub reference: String,
}

/// The parts of `analyzed.toml` the restorer consumes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageIdentifier>,

    #[serde(default)]
    pub metadata: LayersMetadata,
}

/// Read `analyzed.toml`; a missing file yields empty metadata
pub async fn read_analyzed(path: &Path) -> KilnResult<AnalyzedMetadata> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(AnalyzedMetadata::default()),
        Err(e) => {
            return Err(KilnError::io(
                format!("reading analyzed metadata {}", path.display()),
                e,
            ))
        }
    };

    toml::from_str(&content).map_err(|e| KilnError::DocumentRead {
        what: "analyzed metadata",
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
