//! Layer metadata restoration (platform API 0.7+)
//!
//! Before layer data is reconciled, descriptors are written for every layer
//! the next build may reuse: launch layers recorded on the previous app
//! image and cache-only layers recorded in the cache. Each written
//! descriptor embeds the recorded layer hash.

use crate::api::ApiVersion;
use crate::buildpack::{escape_id, BuildpackGroup, BuildpackLayersDir, LayerDescriptor, LayerTypes};
use crate::error::{KilnError, KilnResult};
use crate::layer::sha_store::LayerShaStore;
use crate::log::Logger;
use crate::platform::{BuildpackLayerMetadata, CacheMetadata, LayersMetadata};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Writes layer descriptors from recorded metadata
pub trait MetadataRestorer: Send + Sync {
    fn restore(
        &self,
        group: &BuildpackGroup,
        analyzed: &LayersMetadata,
        cache_meta: &CacheMetadata,
        sha_store: &LayerShaStore,
    ) -> KilnResult<()>;
}

/// Default restorer writing into the layers directory
pub struct LayerMetadataRestorer {
    layers_dir: PathBuf,
    skip_layers: bool,
    logger: Arc<dyn Logger>,
}

impl LayerMetadataRestorer {
    pub fn new(
        layers_dir: impl Into<PathBuf>,
        skip_layers: bool,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            layers_dir: layers_dir.into(),
            skip_layers,
            logger,
        }
    }

    fn restore_store_toml(
        &self,
        group: &BuildpackGroup,
        analyzed: &LayersMetadata,
    ) -> KilnResult<()> {
        for bp in group.iter() {
            let Some(store) = analyzed.for_buildpack(&bp.id).and_then(|m| m.store.as_ref()) else {
                continue;
            };
            let dir = self.layers_dir.join(escape_id(&bp.id));
            fs::create_dir_all(&dir)
                .map_err(|e| KilnError::io(format!("creating {}", dir.display()), e))?;
            let path = dir.join("store.toml");
            fs::write(&path, toml::to_string(store)?)
                .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))?;
        }
        Ok(())
    }

    fn restore_layer_metadata(
        &self,
        group: &BuildpackGroup,
        analyzed: &LayersMetadata,
        cache_meta: &CacheMetadata,
        sha_store: &LayerShaStore,
    ) -> KilnResult<()> {
        if self.skip_layers {
            self.logger.info("Skipping buildpack layer analysis");
            return Ok(());
        }

        for bp in group.iter() {
            let api: ApiVersion = bp.api.parse()?;
            let dir = BuildpackLayersDir::read(&self.layers_dir, bp)?;
            let app_layers = analyzed.layers_for(&bp.id);
            let cached_layers = cache_meta.layers_for(&bp.id);

            // The restore step brings back data for cache=true layers or
            // deletes them, so launch layers only need their descriptors here.
            for (name, record) in app_layers {
                let identifier = format!("{}:{}", bp.id, name);
                if !record.launch {
                    self.logger.debug(&format!(
                        "Not restoring metadata for {:?}, marked as launch=false",
                        identifier
                    ));
                    continue;
                }
                if record.build && !record.cache {
                    // The buildpack always recreates build=true layers
                    self.logger.debug(&format!(
                        "Not restoring metadata for {:?}, marked as build=true, cache=false",
                        identifier
                    ));
                    continue;
                }
                if record.cache && !cached_layers.get(name).map(|c| c.cache).unwrap_or(false) {
                    self.logger.debug(&format!(
                        "Not restoring metadata for {:?}, marked as cache=true, but not found in cache",
                        identifier
                    ));
                    continue;
                }
                self.logger.info(&format!(
                    "Restoring metadata for {:?} from app image",
                    identifier
                ));
                self.write_layer_metadata(&dir, api, name, record, sha_store)?;
            }

            for (name, record) in cached_layers {
                let identifier = format!("{}:{}", bp.id, name);
                if !record.cache {
                    self.logger.debug(&format!(
                        "Not restoring {:?}, marked as cache=false",
                        identifier
                    ));
                    continue;
                }
                // Launch layers were handled from the app image above
                if record.launch {
                    self.logger.debug(&format!(
                        "Not restoring {:?}, marked as launch=true",
                        identifier
                    ));
                    continue;
                }
                self.logger.info(&format!(
                    "Restoring metadata for {:?} from cache",
                    identifier
                ));
                self.write_layer_metadata(&dir, api, name, record, sha_store)?;
            }
        }
        Ok(())
    }

    fn write_layer_metadata(
        &self,
        dir: &BuildpackLayersDir,
        api: ApiVersion,
        name: &str,
        record: &BuildpackLayerMetadata,
        sha_store: &LayerShaStore,
    ) -> KilnResult<()> {
        let layer = dir.layer(name);
        self.logger.debug(&format!(
            "Writing layer metadata for {:?}",
            layer.identifier()
        ));
        layer.write_descriptor(&descriptor_for(api, record))?;
        sha_store.record(&layer, &record.sha)
    }
}

impl MetadataRestorer for LayerMetadataRestorer {
    fn restore(
        &self,
        group: &BuildpackGroup,
        analyzed: &LayersMetadata,
        cache_meta: &CacheMetadata,
        sha_store: &LayerShaStore,
    ) -> KilnResult<()> {
        self.restore_store_toml(group, analyzed)?;
        self.restore_layer_metadata(group, analyzed, cache_meta, sha_store)
    }
}

/// Descriptor in the form the buildpack's API expects
fn descriptor_for(api: ApiVersion, record: &BuildpackLayerMetadata) -> LayerDescriptor {
    let mut descriptor = LayerDescriptor {
        metadata: record.data.clone().unwrap_or_default(),
        ..Default::default()
    };
    if api.at_least("0.6") {
        descriptor.types = Some(LayerTypes {
            launch: record.launch,
            build: record.build,
            cache: record.cache,
        });
    } else {
        descriptor.launch = record.launch;
        descriptor.build = record.build;
        descriptor.cache = record.cache;
    }
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildpack::GroupBuildpack;
    use crate::log::{Level, MemoryLogger};
    use crate::platform::{BuildpackLayersMetadata, LayerMetadataMap};
    use tempfile::TempDir;

    fn record(sha: &str, launch: bool, build: bool, cache: bool) -> BuildpackLayerMetadata {
        BuildpackLayerMetadata {
            sha: sha.to_string(),
            launch,
            build,
            cache,
            data: None,
        }
    }

    fn metadata(id: &str, layers: &[(&str, BuildpackLayerMetadata)]) -> LayersMetadata {
        LayersMetadata {
            buildpacks: vec![BuildpackLayersMetadata {
                key: id.to_string(),
                version: "1.0".to_string(),
                layers: layers
                    .iter()
                    .map(|(n, r)| (n.to_string(), r.clone()))
                    .collect::<LayerMetadataMap>(),
                store: None,
            }],
        }
    }

    fn restorer(temp: &TempDir, skip: bool) -> (LayerMetadataRestorer, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::new());
        (
            LayerMetadataRestorer::new(temp.path(), skip, logger.clone()),
            logger,
        )
    }

    #[test]
    fn writes_launch_and_cache_layers() {
        let temp = TempDir::new().unwrap();
        let group = BuildpackGroup::new(vec![GroupBuildpack::new("example/bp", "1.0", "0.6")]);
        let analyzed = metadata(
            "example/bp",
            &[
                ("launch-only", record("sha256:l", true, false, false)),
                ("not-launch", record("sha256:n", false, false, false)),
                ("build-no-cache", record("sha256:b", true, true, false)),
                ("launch-cache", record("sha256:lc", true, false, true)),
                ("launch-cache-gone", record("sha256:g", true, false, true)),
            ],
        );
        let cache = metadata(
            "example/bp",
            &[
                ("launch-cache", record("sha256:lc", true, false, true)),
                ("cache-only", record("sha256:c", false, false, true)),
                ("not-cache", record("sha256:x", false, false, false)),
            ],
        );
        let (restorer, logger) = restorer(&temp, false);

        restorer
            .restore(&group, &analyzed, &cache, &LayerShaStore::Embedded)
            .unwrap();

        let bp_dir = temp.path().join("example_bp");
        for written in ["launch-only", "launch-cache", "cache-only"] {
            assert!(bp_dir.join(format!("{written}.toml")).exists(), "{written}");
        }
        for skipped in ["not-launch", "build-no-cache", "launch-cache-gone", "not-cache"] {
            assert!(!bp_dir.join(format!("{skipped}.toml")).exists(), "{skipped}");
        }

        let dir = BuildpackLayersDir::read(temp.path(), &group.group[0]).unwrap();
        let descriptor = dir.layer("cache-only").read().unwrap();
        assert_eq!(descriptor.sha.as_deref(), Some("sha256:c"));
        assert!(descriptor.types.unwrap().cache);
        assert!(!descriptor.cache);

        assert!(logger.contains(
            Level::Info,
            "Restoring metadata for \"example/bp:launch-only\" from app image"
        ));
        assert!(logger.contains(
            Level::Info,
            "Restoring metadata for \"example/bp:cache-only\" from cache"
        ));
        assert!(logger.contains(
            Level::Debug,
            "marked as cache=true, but not found in cache"
        ));
    }

    #[test]
    fn old_buildpack_api_writes_top_level_flags() {
        let temp = TempDir::new().unwrap();
        let group = BuildpackGroup::new(vec![GroupBuildpack::new("bp", "1.0", "0.5")]);
        let cache = metadata("bp", &[("deps", record("sha256:d", false, true, true))]);
        let (restorer, _) = restorer(&temp, false);

        restorer
            .restore(&group, &LayersMetadata::default(), &cache, &LayerShaStore::Embedded)
            .unwrap();

        let dir = BuildpackLayersDir::read(temp.path(), &group.group[0]).unwrap();
        let descriptor = dir.layer("deps").read().unwrap();
        assert!(descriptor.cache);
        assert!(descriptor.build);
        assert!(descriptor.types.is_none());
        assert_eq!(descriptor.sha.as_deref(), Some("sha256:d"));
    }

    #[test]
    fn skip_layers_still_restores_store() {
        let temp = TempDir::new().unwrap();
        let group = BuildpackGroup::new(vec![GroupBuildpack::new("bp", "1.0", "0.6")]);
        let mut analyzed = metadata("bp", &[("app", record("sha256:l", true, false, false))]);
        let mut store = toml::Table::new();
        store.insert("runs".into(), toml::Value::Integer(2));
        analyzed.buildpacks[0].store = Some(store);
        let (restorer, logger) = restorer(&temp, true);

        restorer
            .restore(&group, &analyzed, &CacheMetadata::default(), &LayerShaStore::Embedded)
            .unwrap();

        let store_toml =
            std::fs::read_to_string(temp.path().join("bp").join("store.toml")).unwrap();
        assert!(store_toml.contains("runs = 2"));
        assert!(!temp.path().join("bp").join("app.toml").exists());
        assert!(logger.contains(Level::Info, "Skipping buildpack layer analysis"));
    }
}
