//! Configuration schema for Kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`. Every value can
//! be overridden per invocation by the matching `CNB_*` variable or flag.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Platform contract settings
    pub platform: PlatformConfig,

    /// Filesystem locations shared with the platform
    pub paths: PathsConfig,

    /// Restore phase settings
    pub restore: RestoreConfig,

    /// Run image access for stack validation
    pub stack: StackConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

impl GeneralConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Platform API spoken by the orchestrating platform
    pub api: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api: "0.8".to_string(),
        }
    }
}

/// Paths of the documents and directories the lifecycle works on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub layers_dir: PathBuf,

    /// Defaults to `<layers_dir>/group.toml`
    pub group_path: Option<PathBuf>,

    /// Defaults to `<layers_dir>/analyzed.toml`
    pub analyzed_path: Option<PathBuf>,

    pub stack_path: PathBuf,

    /// Layer cache volume; no cache is used when unset
    pub cache_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            layers_dir: PathBuf::from("/layers"),
            group_path: None,
            analyzed_path: None,
            stack_path: PathBuf::from("/cnb/stack.toml"),
            cache_dir: None,
        }
    }
}

impl PathsConfig {
    pub fn group_path(&self) -> PathBuf {
        self.group_path
            .clone()
            .unwrap_or_else(|| self.layers_dir.join("group.toml"))
    }

    pub fn analyzed_path(&self) -> PathBuf {
        self.analyzed_path
            .clone()
            .unwrap_or_else(|| self.layers_dir.join("analyzed.toml"))
    }
}

/// Restore phase settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Only restore `store.toml`, not layer metadata
    pub skip_layers: bool,
}

/// How run images are inspected
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Inspect images in the local container engine instead of the registry
    pub use_daemon: bool,

    /// Container engine CLI (docker or podman)
    pub daemon_cli: String,

    /// Registry inspection CLI
    pub registry_cli: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            use_daemon: false,
            daemon_cli: "docker".to_string(),
            registry_cli: "skopeo".to_string(),
        }
    }
}
