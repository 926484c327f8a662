//! Configuration for Kiln
//!
//! Settings come from the config file, then per-invocation overrides from
//! flags and `CNB_*` variables are layered on top.

pub mod schema;

pub use schema::Config;

use crate::api::PlatformApi;
use crate::error::{KilnError, KilnResult};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Locates and loads the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// `<config dir>/kiln/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if not present
    pub async fn load(&self) -> KilnResult<Config> {
        match Self::load_from_file(&self.config_path).await {
            Err(KilnError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", self.config_path.display());
                Ok(Config::default())
            }
            result => result,
        }
    }

    async fn load_from_file(path: &Path) -> KilnResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-invocation values that take precedence over the config file.
///
/// Flags can only switch `skip_layers` and `use_daemon` on.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub platform_api: Option<String>,
    pub layers_dir: Option<PathBuf>,
    pub group_path: Option<PathBuf>,
    pub analyzed_path: Option<PathBuf>,
    pub stack_path: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub skip_layers: bool,
    pub use_daemon: bool,
}

impl Config {
    /// This configuration with `overrides` applied
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(api) = overrides.platform_api {
            self.platform.api = api;
        }
        if let Some(dir) = overrides.layers_dir {
            self.paths.layers_dir = dir;
        }
        if overrides.group_path.is_some() {
            self.paths.group_path = overrides.group_path;
        }
        if overrides.analyzed_path.is_some() {
            self.paths.analyzed_path = overrides.analyzed_path;
        }
        if let Some(path) = overrides.stack_path {
            self.paths.stack_path = path;
        }
        if overrides.cache_dir.is_some() {
            self.paths.cache_dir = overrides.cache_dir;
        }
        self.restore.skip_layers |= overrides.skip_layers;
        self.stack.use_daemon |= overrides.use_daemon;
        self
    }

    pub fn platform_api(&self) -> KilnResult<PlatformApi> {
        PlatformApi::parse(&self.platform.api)
    }
}
