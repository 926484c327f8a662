//! Run image handles
//!
//! Stack validation only needs the labels of the run image. Images are
//! inspected through a CLI: the container engine for daemon builds, or
//! `skopeo` for images that live in a registry.

use crate::config::schema::StackConfig;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub type Labels = BTreeMap<String, String>;

/// A resolved run image
#[async_trait]
pub trait RunImage: Send + Sync {
    /// Reference the image was opened with
    fn name(&self) -> &str;

    /// Value of label `key`, `None` when the label is not set
    async fn label(&self, key: &str) -> KilnResult<Option<String>>;
}

/// Opens run images by reference
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn open(&self, reference: &str) -> KilnResult<Box<dyn RunImage>>;
}

/// Image whose labels are already known
#[derive(Debug, Clone, Default)]
pub struct StaticImage {
    name: String,
    labels: Labels,
}

impl StaticImage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl RunImage for StaticImage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn label(&self, key: &str) -> KilnResult<Option<String>> {
        Ok(self.labels.get(key).cloned())
    }
}

/// Serves a fixed set of images
#[derive(Debug, Clone, Default)]
pub struct StaticImageSource {
    images: BTreeMap<String, StaticImage>,
}

impl StaticImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: StaticImage) -> Self {
        self.images.insert(image.name.clone(), image);
        self
    }
}

#[async_trait]
impl ImageSource for StaticImageSource {
    async fn open(&self, reference: &str) -> KilnResult<Box<dyn RunImage>> {
        self.images
            .get(reference)
            .cloned()
            .map(|image| Box::new(image) as Box<dyn RunImage>)
            .ok_or_else(|| KilnError::ImageInspect {
                reference: reference.to_string(),
                reason: "image not found".to_string(),
            })
    }
}

/// Images in the local container engine
pub struct DaemonImageSource {
    cli: String,
}

impl DaemonImageSource {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }
}

#[async_trait]
impl ImageSource for DaemonImageSource {
    async fn open(&self, reference: &str) -> KilnResult<Box<dyn RunImage>> {
        let stdout = inspect(
            &self.cli,
            &["image", "inspect", "--format", "{{json .Config.Labels}}", reference],
            reference,
        )
        .await?;
        let labels = parse_daemon_labels(&stdout).map_err(|e| KilnError::ImageInspect {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(StaticImage {
            name: reference.to_string(),
            labels,
        }))
    }
}

/// Images in a remote registry
pub struct RegistryImageSource {
    cli: String,
}

impl RegistryImageSource {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }
}

#[async_trait]
impl ImageSource for RegistryImageSource {
    async fn open(&self, reference: &str) -> KilnResult<Box<dyn RunImage>> {
        let transport = format!("docker://{}", reference);
        let stdout = inspect(
            &self.cli,
            &["inspect", "--config", transport.as_str()],
            reference,
        )
        .await?;
        let labels = parse_config_labels(&stdout).map_err(|e| KilnError::ImageInspect {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(StaticImage {
            name: reference.to_string(),
            labels,
        }))
    }
}

/// Image source for the configured build mode
pub fn image_source_for(config: &StackConfig) -> Box<dyn ImageSource> {
    if config.use_daemon {
        Box::new(DaemonImageSource::new(&config.daemon_cli))
    } else {
        Box::new(RegistryImageSource::new(&config.registry_cli))
    }
}

/// Run an inspection command and return its stdout
async fn inspect(cli: &str, args: &[&str], reference: &str) -> KilnResult<String> {
    debug!("Executing: {} {:?}", cli, args);

    let output = Command::new(cli)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| KilnError::command_failed(format!("{} {:?}", cli, args), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(KilnError::ImageInspect {
            reference: reference.to_string(),
            reason: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `{{json .Config.Labels}}` prints `null` for images without labels
fn parse_daemon_labels(stdout: &str) -> serde_json::Result<Labels> {
    let labels: Option<Labels> = serde_json::from_str(stdout.trim())?;
    Ok(labels.unwrap_or_default())
}

#[derive(Deserialize)]
struct ImageConfigFile {
    #[serde(default)]
    config: ImageConfig,
}

#[derive(Default, Deserialize)]
struct ImageConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<Labels>,
}

/// Labels from an OCI image config document
fn parse_config_labels(stdout: &str) -> serde_json::Result<Labels> {
    let file: ImageConfigFile = serde_json::from_str(stdout)?;
    Ok(file.config.labels.unwrap_or_default())
}
