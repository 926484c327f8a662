//! Buildpack group parsing
//!
//! The group is the ordered list of buildpacks selected by detection,
//! stored as `group.toml`:
//!
//! ```toml
//! [[group]]
//! id = "example/node"
//! version = "1.2.0"
//! api = "0.6"
//! ```

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A buildpack selected for the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBuildpack {
    pub id: String,

    pub version: String,

    /// Buildpack API the buildpack declares
    pub api: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl GroupBuildpack {
    pub fn new(id: impl Into<String>, version: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            api: api.into(),
            optional: false,
        }
    }
}

/// Ordered buildpack group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackGroup {
    #[serde(default)]
    pub group: Vec<GroupBuildpack>,
}

impl BuildpackGroup {
    pub fn new(group: Vec<GroupBuildpack>) -> Self {
        Self { group }
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupBuildpack> {
        self.group.iter()
    }

    /// Whether a buildpack with this escaped ID is part of the group
    pub fn contains_escaped(&self, escaped_id: &str) -> bool {
        self.group.iter().any(|bp| escape_id(&bp.id) == escaped_id)
    }
}

/// Escape a buildpack ID for use as a directory name
pub fn escape_id(id: &str) -> String {
    id.replace('/', "_")
}

/// Read a buildpack group from `group.toml`
pub async fn read_group(path: &Path) -> KilnResult<BuildpackGroup> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| KilnError::io(format!("reading buildpack group {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| KilnError::DocumentRead {
        what: "buildpack group",
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
