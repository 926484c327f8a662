//! Where the previously recorded hash of an on-disk layer lives
//!
//! Platform API < 0.7 keeps it in a `<layer>.sha` sidecar that is computed
//! from the layer contents when missing. From 0.7 on, the layer metadata
//! restorer embeds it in `<layer>.toml` and the store only reads it back.

use crate::api::PlatformApi;
use crate::buildpack::Layer;
use crate::error::KilnResult;
use crate::layer::archive::digest_layer_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerShaStore {
    /// `<layer>.sha` sidecar, computed and persisted on first use
    ShaFiles,
    /// `sha` field of `<layer>.toml`, never computed
    Embedded,
}

impl LayerShaStore {
    pub fn for_platform(platform: PlatformApi) -> Self {
        if platform.restores_layer_metadata() {
            Self::Embedded
        } else {
            Self::ShaFiles
        }
    }

    /// Hash recorded for `layer`; an empty string when nothing is recorded
    pub fn get(&self, layer: &Layer) -> KilnResult<String> {
        match self {
            Self::ShaFiles => {
                if let Some(sha) = layer.read_sha()?.filter(|sha| !sha.is_empty()) {
                    return Ok(sha);
                }
                let sha = digest_layer_dir(&layer.path())?;
                layer.write_sha(&sha)?;
                Ok(sha)
            }
            Self::Embedded => Ok(layer.read()?.sha.unwrap_or_default()),
        }
    }

    /// Persist `sha` as the recorded hash of `layer`
    pub fn record(&self, layer: &Layer, sha: &str) -> KilnResult<()> {
        match self {
            Self::ShaFiles => layer.write_sha(sha),
            Self::Embedded => {
                let mut descriptor = layer.read()?;
                descriptor.sha = Some(sha.to_string());
                layer.write_descriptor(&descriptor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildpack::{BuildpackLayersDir, GroupBuildpack};
    use crate::error::KilnError;
    use std::fs;
    use tempfile::TempDir;

    fn layer(temp: &TempDir, name: &str) -> Layer {
        let bp = GroupBuildpack::new("bp1", "1.0", "0.6");
        BuildpackLayersDir::read(temp.path(), &bp)
            .unwrap()
            .layer(name)
    }

    #[test]
    fn selected_by_platform() {
        assert_eq!(
            LayerShaStore::for_platform(PlatformApi::parse("0.6").unwrap()),
            LayerShaStore::ShaFiles
        );
        assert_eq!(
            LayerShaStore::for_platform(PlatformApi::parse("0.7").unwrap()),
            LayerShaStore::Embedded
        );
    }

    #[test]
    fn sha_file_is_read() {
        let temp = TempDir::new().unwrap();
        let layer = layer(&temp, "deps");
        fs::create_dir_all(layer.path()).unwrap();
        fs::write(layer.sha_path(), "sha256:recorded\n").unwrap();

        assert_eq!(LayerShaStore::ShaFiles.get(&layer).unwrap(), "sha256:recorded");
    }

    #[test]
    fn missing_sha_file_is_computed_and_persisted() {
        let temp = TempDir::new().unwrap();
        let layer = layer(&temp, "deps");
        fs::create_dir_all(layer.path()).unwrap();
        fs::write(layer.path().join("file"), "content").unwrap();

        let sha = LayerShaStore::ShaFiles.get(&layer).unwrap();
        assert_eq!(sha, digest_layer_dir(&layer.path()).unwrap());
        assert_eq!(fs::read_to_string(layer.sha_path()).unwrap(), sha);
    }

    #[test]
    fn embedded_sha_is_only_read() {
        let temp = TempDir::new().unwrap();
        let layer = layer(&temp, "deps");
        fs::create_dir_all(layer.path()).unwrap();
        fs::write(layer.path().join("file"), "content").unwrap();
        fs::write(layer.descriptor_path(), "[types]\ncache = true\n").unwrap();

        assert_eq!(LayerShaStore::Embedded.get(&layer).unwrap(), "");
        assert!(!layer.sha_path().exists());

        LayerShaStore::Embedded.record(&layer, "sha256:embedded").unwrap();
        assert_eq!(LayerShaStore::Embedded.get(&layer).unwrap(), "sha256:embedded");
        assert!(layer.read().unwrap().types.unwrap().cache);
    }

    #[test]
    fn embedded_unreadable_descriptor_errors() {
        let temp = TempDir::new().unwrap();
        let layer = layer(&temp, "deps");
        fs::create_dir_all(temp.path().join("bp1")).unwrap();
        fs::write(layer.descriptor_path(), "sha = ").unwrap();

        assert!(matches!(
            LayerShaStore::Embedded.get(&layer),
            Err(KilnError::LayerMetadataRead { .. })
        ));
    }
}
