//! Stack metadata and run image mirror selection
//!
//! `stack.toml` describes the build image's stack and where the matching
//! run image (and its mirrors) can be pulled from.

use crate::error::{KilnError, KilnResult};
use oci_distribution::Reference;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Label carrying an image's stack ID
pub const STACK_ID_LABEL: &str = "io.buildpacks.stack.id";

/// Registry name reported for Docker Hub references
const DOCKER_HUB_REGISTRY: &str = "index.docker.io";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildImageMetadata {
    #[serde(default)]
    pub stack_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunImageMetadata {
    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub mirrors: Vec<String>,
}

/// Parsed `stack.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackMetadata {
    #[serde(default)]
    pub build_image: BuildImageMetadata,

    #[serde(default)]
    pub run_image: RunImageMetadata,
}

impl StackMetadata {
    /// Pick the run image candidate hosted on `registry`.
    ///
    /// Candidates are the primary run image followed by its mirrors, in
    /// order; the first one on `registry` wins. Without a match the
    /// primary run image is used. Unparsable candidates are skipped.
    pub fn best_run_image_mirror(&self, registry: &str) -> KilnResult<String> {
        if self.run_image.image.is_empty() {
            return Err(KilnError::MissingRunImageMetadata);
        }

        let best = std::iter::once(&self.run_image.image)
            .chain(self.run_image.mirrors.iter())
            .find(|candidate| {
                registry_of(candidate)
                    .map(|r| r == registry)
                    .unwrap_or(false)
            })
            .unwrap_or(&self.run_image.image);

        Ok(best.clone())
    }
}

/// Read `stack.toml`; a missing file yields empty metadata
pub async fn read_stack_metadata(path: &Path) -> KilnResult<StackMetadata> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StackMetadata::default()),
        Err(e) => {
            return Err(KilnError::StackMetadataRead {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    toml::from_str(&content).map_err(|e| KilnError::StackMetadataRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Registry hosting `reference`, with Docker Hub spelled `index.docker.io`
pub fn registry_of(reference: &str) -> KilnResult<String> {
    let parsed =
        Reference::try_from(reference).map_err(|e| KilnError::InvalidImageReference {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

    Ok(match parsed.registry() {
        "docker.io" => DOCKER_HUB_REGISTRY.to_string(),
        registry => registry.to_string(),
    })
}
