//! Layer reconciliation against the cache
//!
//! For every buildpack in the group, cache-candidate layers on disk are
//! checked against the cache metadata. Layers that are not cached or whose
//! recorded hash disagrees with the cache are deleted on the spot; the
//! rest are restored from their cached archive by concurrent tasks.

use crate::api::{ApiVersion, PlatformApi};
use crate::buildpack::{BuildpackGroup, BuildpackLayersDir, CacheClassifier, Layer};
use crate::cache::{retrieve_cache_metadata, Cache};
use crate::error::{KilnError, KilnResult};
use crate::layer::{extract_layer, LayerMetadataRestorer, LayerShaStore, MetadataRestorer};
use crate::log::Logger;
use crate::platform::{CacheMetadata, LayersMetadata};
use crate::restore::sbom::SbomRelocator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

type RestoreTasks = JoinSet<KilnResult<()>>;

/// Drives one restore of the layers directory
pub struct Restorer {
    layers_dir: PathBuf,
    group: BuildpackGroup,
    platform: PlatformApi,
    layers_metadata: LayersMetadata,
    metadata_restorer: Arc<dyn MetadataRestorer>,
    logger: Arc<dyn Logger>,
}

impl Restorer {
    /// Restorer with no previous image metadata and the default metadata
    /// restorer
    pub fn new(
        layers_dir: impl Into<PathBuf>,
        group: BuildpackGroup,
        platform: PlatformApi,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let layers_dir = layers_dir.into();
        let metadata_restorer =
            Arc::new(LayerMetadataRestorer::new(&layers_dir, false, logger.clone()));
        Self {
            layers_dir,
            group,
            platform,
            layers_metadata: LayersMetadata::default(),
            metadata_restorer,
            logger,
        }
    }

    /// Layer metadata recorded on the previous app image
    pub fn with_layers_metadata(mut self, layers_metadata: LayersMetadata) -> Self {
        self.layers_metadata = layers_metadata;
        self
    }

    pub fn with_metadata_restorer(mut self, restorer: Box<dyn MetadataRestorer>) -> Self {
        self.metadata_restorer = Arc::from(restorer);
        self
    }

    /// Reconcile the layers directory with `cache`.
    ///
    /// Without a cache every cache-candidate layer is deleted. Errors before
    /// the restore tasks are scheduled abort immediately; once scheduled,
    /// every task runs to completion and the first failure is returned.
    pub async fn restore(&self, cache: Option<Arc<dyn Cache>>) -> KilnResult<()> {
        let cache_meta = retrieve_cache_metadata(cache.as_deref(), self.logger.as_ref()).await?;

        let pass = ReconcilePass {
            layers_dir: self.layers_dir.clone(),
            group: self.group.clone(),
            platform: self.platform,
            layers_metadata: self.layers_metadata.clone(),
            metadata_restorer: self.metadata_restorer.clone(),
            cache_meta,
            cache,
            logger: self.logger.clone(),
        };
        let runtime = Handle::current();
        let (tasks, scheduled) = tokio::task::spawn_blocking(move || {
            let mut tasks = RestoreTasks::new();
            let scheduled = pass.run(&runtime, &mut tasks);
            (tasks, scheduled)
        })
        .await
        .map_err(|e| KilnError::Internal(format!("layer reconciliation task failed: {}", e)))?;

        // Tasks already scheduled still run to completion on an early error
        let restored = wait_for_restores(tasks).await;
        scheduled?;
        restored.map_err(|e| KilnError::RestoreData(Box::new(e)))?;

        if self.platform.relocates_sbom() {
            let relocator =
                SbomRelocator::new(&self.layers_dir, self.group.clone(), self.logger.clone());
            tokio::task::spawn_blocking(move || relocator.run())
                .await
                .map_err(|e| KilnError::Internal(format!("SBOM relocation task failed: {}", e)))??;
        }
        Ok(())
    }
}

/// The sequential part of a restore, run on the blocking pool.
///
/// Buildpacks are handled in group order and the first error stops the
/// pass; restores it already scheduled are left running.
struct ReconcilePass {
    layers_dir: PathBuf,
    group: BuildpackGroup,
    platform: PlatformApi,
    layers_metadata: LayersMetadata,
    metadata_restorer: Arc<dyn MetadataRestorer>,
    cache_meta: CacheMetadata,
    cache: Option<Arc<dyn Cache>>,
    logger: Arc<dyn Logger>,
}

impl ReconcilePass {
    fn run(&self, runtime: &Handle, tasks: &mut RestoreTasks) -> KilnResult<()> {
        let sha_store = LayerShaStore::for_platform(self.platform);
        if self.platform.restores_layer_metadata() {
            self.metadata_restorer.restore(
                &self.group,
                &self.layers_metadata,
                &self.cache_meta,
                &sha_store,
            )?;
        }

        for bp in self.group.iter() {
            let cached_layers = self.cache_meta.layers_for(&bp.id);
            let api: ApiVersion = bp.api.parse()?;
            let classifier = CacheClassifier::for_buildpack(api, cached_layers);
            let layers_dir = BuildpackLayersDir::read(&self.layers_dir, bp)?;

            for layer in layers_dir.find_layers(|layer| classifier.is_cache_candidate(layer)) {
                let Some(record) = cached_layers.get(layer.name()) else {
                    self.logger.info(&format!(
                        "Removing {:?}, not in cache",
                        layer.identifier()
                    ));
                    layer.remove()?;
                    continue;
                };

                let layer_sha = sha_store.get(&layer)?;
                if layer_sha != record.sha {
                    self.logger.info(&format!(
                        "Removing {:?}, wrong sha",
                        layer.identifier()
                    ));
                    self.logger.debug(&format!(
                        "Layer sha: {:?}, cache sha: {:?}",
                        layer_sha, record.sha
                    ));
                    layer.remove()?;
                    continue;
                }

                self.logger.info(&format!(
                    "Restoring data for {:?} from cache",
                    layer.identifier()
                ));
                tasks.spawn_on(
                    restore_cached_layer(
                        self.cache.clone(),
                        layer,
                        record.sha.clone(),
                        sha_store,
                        self.logger.clone(),
                    ),
                    runtime,
                );
            }
        }
        Ok(())
    }
}

/// Replace the layer directory contents with the cached archive `sha`
async fn restore_cached_layer(
    cache: Option<Arc<dyn Cache>>,
    layer: Layer,
    sha: String,
    sha_store: LayerShaStore,
    logger: Arc<dyn Logger>,
) -> KilnResult<()> {
    let cache = cache.ok_or(KilnError::CacheNotProvided)?;

    logger.debug(&format!("Retrieving data for {:?}", sha));
    let reader = cache.retrieve_layer(&sha).await?;

    tokio::task::spawn_blocking(move || {
        extract_layer(reader, &layer.path())?;
        // Embedded hashes were already written by the metadata restorer
        if sha_store == LayerShaStore::ShaFiles {
            sha_store.record(&layer, &sha)?;
        }
        Ok(())
    })
    .await
    .map_err(|e| KilnError::Internal(format!("layer extraction task failed: {}", e)))?
}

/// Join every task and keep the first failure
async fn wait_for_restores(mut tasks: RestoreTasks) -> KilnResult<()> {
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .unwrap_or_else(|e| Err(KilnError::Internal(format!("restore task failed: {}", e))));
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
