//! SBOM relocation (platform API 0.8+)
//!
//! The analyzer stages SBOM files of the previous build under
//! `<layers>/sbom/{cache,launch}/<buildpack>/<layer>/<file>`. Files of
//! buildpacks that are still in the group are copied next to their layer
//! as `<layers>/<buildpack>/<layer>.<file>`; the staging tree is always
//! removed afterwards so it cannot leak into the next build.

use crate::buildpack::BuildpackGroup;
use crate::error::{KilnError, KilnResult};
use crate::log::Logger;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Staging directory under the layers directory
pub const SBOM_STAGING_DIR: &str = "sbom";

/// Which staging subtree a file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbomScope {
    Cache,
    Launch,
}

impl SbomScope {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Launch => "launch",
        }
    }
}

/// A staged SBOM file split into its path segments
#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedSbom {
    buildpack_id: String,
    layer_name: String,
    file_name: String,
}

impl StagedSbom {
    /// Parse `<buildpack>/<layer>/<file>` relative to a scope root.
    ///
    /// Only `sbom.<format>.json`-style file names qualify.
    fn parse(relative: &Path) -> Option<Self> {
        let segments: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        let [buildpack_id, layer_name, file_name] = segments.as_slice() else {
            return None;
        };
        let is_sbom = file_name.len() > "sbomjson".len()
            && file_name.starts_with("sbom")
            && file_name.ends_with("json");
        if !is_sbom {
            return None;
        }

        Some(Self {
            buildpack_id: buildpack_id.to_string(),
            layer_name: layer_name.to_string(),
            file_name: file_name.to_string(),
        })
    }
}

/// Moves staged SBOM files into buildpack layer directories
#[derive(Clone)]
pub struct SbomRelocator {
    layers_dir: PathBuf,
    group: BuildpackGroup,
    logger: Arc<dyn Logger>,
}

impl SbomRelocator {
    pub fn new(
        layers_dir: impl Into<PathBuf>,
        group: BuildpackGroup,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            layers_dir: layers_dir.into(),
            group,
            logger,
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.layers_dir.join(SBOM_STAGING_DIR)
    }

    /// Relocate both scopes, then remove the staging tree.
    ///
    /// The first walk error wins; cleanup happens regardless and its own
    /// failure is only reported when both walks succeeded.
    pub fn run(&self) -> KilnResult<()> {
        let cache_result = self.relocate_scope(SbomScope::Cache);
        let launch_result = self.relocate_scope(SbomScope::Launch);

        let staging = self.staging_dir();
        let cleanup = match fs::remove_dir_all(&staging) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                self.logger.warn(&format!(
                    "Failed to remove SBOM staging directory {}: {}",
                    staging.display(),
                    e
                ));
                Err(KilnError::SbomRelocation {
                    path: staging,
                    source: e,
                })
            }
        };

        cache_result?;
        launch_result?;
        cleanup
    }

    fn relocate_scope(&self, scope: SbomScope) -> KilnResult<()> {
        let root = self.staging_dir().join(scope.dir_name());
        if !root.is_dir() {
            return Ok(());
        }

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| KilnError::SbomRelocation {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
                source: io::Error::from(e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(staged) = entry
                .path()
                .strip_prefix(&root)
                .ok()
                .and_then(StagedSbom::parse)
            else {
                continue;
            };

            if !self.group.contains_escaped(&staged.buildpack_id) {
                self.logger.debug(&format!(
                    "Skipping SBOM {}, buildpack {:?} is not in the group",
                    entry.path().display(),
                    staged.buildpack_id
                ));
                continue;
            }

            self.copy_sbom(entry.path(), &staged)?;
        }
        Ok(())
    }

    fn copy_sbom(&self, source: &Path, staged: &StagedSbom) -> KilnResult<()> {
        let dest_dir = self.layers_dir.join(&staged.buildpack_id);
        let dest = dest_dir.join(format!("{}.{}", staged.layer_name, staged.file_name));
        let relocation_err = |e| KilnError::SbomRelocation {
            path: source.to_path_buf(),
            source: e,
        };

        fs::create_dir_all(&dest_dir).map_err(relocation_err)?;
        fs::copy(source, &dest).map_err(relocation_err)?;
        self.logger.debug(&format!("Restored SBOM {}", dest.display()));
        Ok(())
    }
}
