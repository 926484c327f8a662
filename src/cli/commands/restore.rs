//! Restore command - reconcile the layers directory with the cache

use crate::api::verify_buildpack_apis;
use crate::buildpack::read_group;
use crate::cache::{Cache, VolumeCache};
use crate::cli::RestoreArgs;
use crate::config::Config;
use crate::error::KilnResult;
use crate::layer::LayerMetadataRestorer;
use crate::log::TracingLogger;
use crate::platform::{read_analyzed, LayersMetadata};
use crate::restore::Restorer;
use console::style;
use std::sync::Arc;
use tracing::{debug, info};

/// Execute the restore command
pub async fn execute(args: RestoreArgs, config: &Config) -> KilnResult<()> {
    let config = config.clone().with_overrides(args.overrides());
    let platform = config.platform_api()?;
    let paths = &config.paths;
    debug!(
        "Restoring {} with platform API {}",
        paths.layers_dir.display(),
        platform
    );

    let group = read_group(&paths.group_path()).await?;
    verify_buildpack_apis(&group)?;

    let layers_metadata = if platform.restores_layer_metadata() {
        let analyzed = read_analyzed(&paths.analyzed_path()).await?;
        if let Some(image) = &analyzed.image {
            debug!("Using layer metadata of previous image {}", image.reference);
        }
        analyzed.metadata
    } else {
        LayersMetadata::default()
    };

    let cache = paths.cache_dir.as_ref().map(|dir| {
        info!("Using cache volume {}", dir.display());
        Arc::new(VolumeCache::new(dir)) as Arc<dyn Cache>
    });

    let logger = TracingLogger::shared();
    let restorer = Restorer::new(&paths.layers_dir, group, platform, logger.clone())
        .with_layers_metadata(layers_metadata)
        .with_metadata_restorer(Box::new(LayerMetadataRestorer::new(
            &paths.layers_dir,
            config.restore.skip_layers,
            logger,
        )));

    restorer.restore(cache).await?;

    println!(
        "{} Restored layers in {}",
        style("✓").green(),
        paths.layers_dir.display()
    );
    Ok(())
}
