//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn kiln(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("kiln");
        cmd.env("KILN_CONFIG", temp.path().join("config.toml"));
        for var in [
            "CNB_PLATFORM_API",
            "CNB_LAYERS_DIR",
            "CNB_GROUP_PATH",
            "CNB_ANALYZED_PATH",
            "CNB_CACHE_DIR",
            "CNB_STACK_PATH",
            "CNB_STACK_ID",
            "CNB_RUN_IMAGE",
            "CNB_PREVIOUS_IMAGE",
            "CNB_USE_DAEMON",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("buildpack layer cache restorer"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn validate_stack_without_stack_id_is_invalid_args() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .args(["validate-stack", "--stack-path"])
            .arg(temp.path().join("missing-stack.toml"))
            .assert()
            .code(3)
            .stderr(predicate::str::contains(
                "CNB_STACK_ID is required when there is no stack metadata available",
            ));
    }

    #[test]
    fn validate_stack_skipped_on_old_platform() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .args(["validate-stack", "--platform-api", "0.6"])
            .assert()
            .success();
    }

    #[test]
    fn unsupported_platform_api_is_invalid_args() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .args(["restore", "--platform-api", "0.1"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Platform API 0.1 is not supported"));
    }

    #[test]
    fn restore_without_group_fails_in_restore_phase() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .args(["restore", "--layers-dir"])
            .arg(temp.path().join("layers"))
            .assert()
            .code(40);
    }

    #[test]
    fn restore_runs_against_empty_cache() {
        let temp = TempDir::new().unwrap();
        let layers = temp.path().join("layers");
        fs::create_dir_all(layers.join("bp1")).unwrap();
        fs::write(
            layers.join("group.toml"),
            "[[group]]\nid = \"bp1\"\nversion = \"1.0\"\napi = \"0.5\"\n",
        )
        .unwrap();
        fs::write(layers.join("bp1").join("old.toml"), "cache = true\n").unwrap();

        kiln(&temp)
            .args(["restore", "--platform-api", "0.6", "--layers-dir"])
            .arg(&layers)
            .arg("--cache-dir")
            .arg(temp.path().join("cache"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Restored layers"))
            .stderr(predicate::str::contains(
                "Removing \"bp1:old\", not in cache",
            ));

        assert!(!layers.join("bp1").join("old.toml").exists());
    }

    #[test]
    fn invalid_config_is_invalid_args() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("config.toml"), "[platform\n").unwrap();
        kiln(&temp)
            .args(["validate-stack"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

mod restore_tests {
    use kiln::api::PlatformApi;
    use kiln::buildpack::{BuildpackGroup, GroupBuildpack};
    use kiln::cache::{Cache, VolumeCache};
    use kiln::log::{Level, MemoryLogger};
    use kiln::platform::{
        BuildpackLayerMetadata, BuildpackLayersMetadata, CacheMetadata, LayerMetadataMap,
    };
    use kiln::restore::Restorer;
    use kiln::KilnError;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Build {
        temp: TempDir,
        logger: Arc<MemoryLogger>,
    }

    impl Build {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                logger: Arc::new(MemoryLogger::new()),
            }
        }

        fn layers(&self) -> PathBuf {
            self.temp.path().join("layers")
        }

        fn cache(&self) -> VolumeCache {
            VolumeCache::new(self.temp.path().join("cache"))
        }

        fn shared_cache(&self) -> Option<Arc<dyn Cache>> {
            Some(Arc::new(self.cache()))
        }

        fn restorer(&self, platform: &str) -> Restorer {
            self.restorer_with_api(platform, "0.6")
        }

        fn restorer_with_api(&self, platform: &str, bp_api: &str) -> Restorer {
            Restorer::new(
                self.layers(),
                BuildpackGroup::new(vec![GroupBuildpack::new("bp1", "1.0", bp_api)]),
                PlatformApi::parse(platform).unwrap(),
                self.logger.clone(),
            )
        }

        fn layer(&self, name: &str) -> PathBuf {
            self.layers().join("bp1").join(name)
        }

        /// A layer from a previous build, committed to the cache
        fn previous_layer(&self, name: &str, content: &str) -> (PathBuf, String) {
            let dir = self.layer(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("content.txt"), content).unwrap();
            let sha = self.cache().commit_layer(&dir).unwrap();
            (dir, sha)
        }

        fn commit_metadata(&self, layers: &[(&str, &str)]) {
            let layers: LayerMetadataMap = layers
                .iter()
                .map(|(name, sha)| {
                    let record = BuildpackLayerMetadata {
                        sha: sha.to_string(),
                        cache: true,
                        ..Default::default()
                    };
                    (name.to_string(), record)
                })
                .collect();
            self.cache()
                .commit_metadata(&CacheMetadata {
                    buildpacks: vec![BuildpackLayersMetadata {
                        key: "bp1".into(),
                        version: "1.0".into(),
                        layers,
                        store: None,
                    }],
                })
                .unwrap();
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn matching_layer_is_restored() {
        let build = Build::new();
        let (l1, sha) = build.previous_layer("L1", "cached content");
        build.commit_metadata(&[("L1", &sha)]);
        fs::write(l1.join("scratch.txt"), "written by this build").unwrap();
        fs::write(l1.with_extension("sha"), &sha).unwrap();

        build.restorer("0.6").restore(build.shared_cache()).await.unwrap();

        assert_eq!(read(&l1.join("content.txt")), "cached content");
        assert!(!l1.join("scratch.txt").exists());
        assert!(build
            .logger
            .contains(Level::Info, "Restoring data for \"bp1:L1\" from cache"));
    }

    #[tokio::test]
    async fn uncached_layer_is_removed() {
        let build = Build::new();
        build.commit_metadata(&[]);
        let stale = build.layer("stale");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("content.txt"), "old").unwrap();
        fs::write(stale.with_extension("toml"), "cache = true\n").unwrap();

        build
            .restorer_with_api("0.6", "0.5")
            .restore(build.shared_cache())
            .await
            .unwrap();

        assert!(!stale.exists());
        assert!(!stale.with_extension("toml").exists());
        assert!(build
            .logger
            .contains(Level::Info, "Removing \"bp1:stale\", not in cache"));
    }

    #[tokio::test]
    async fn uncached_layer_is_kept_when_not_a_candidate() {
        let build = Build::new();
        build.commit_metadata(&[]);
        let stale = build.layer("stale");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.with_extension("toml"), "[types]\ncache = true\n").unwrap();

        build.restorer("0.6").restore(build.shared_cache()).await.unwrap();

        // Buildpack API 0.6 layers are only candidates through the cache metadata
        assert!(stale.exists());
    }

    #[tokio::test]
    async fn modified_layer_is_removed() {
        let build = Build::new();
        let (l1, sha) = build.previous_layer("L1", "cached content");
        build.commit_metadata(&[("L1", &sha)]);
        fs::write(l1.join("content.txt"), "edited after caching").unwrap();

        build.restorer("0.6").restore(build.shared_cache()).await.unwrap();

        assert!(!l1.exists());
        assert!(build.logger.contains(Level::Info, "Removing \"bp1:L1\", wrong sha"));
    }

    #[tokio::test]
    async fn restore_is_idempotent() {
        let build = Build::new();
        let (l1, sha) = build.previous_layer("L1", "cached content");
        build.commit_metadata(&[("L1", &sha)]);
        let restorer = build.restorer("0.6");

        restorer.restore(build.shared_cache()).await.unwrap();
        let after_first = read(&l1.join("content.txt"));
        let sidecar = read(&l1.with_extension("sha"));
        restorer.restore(build.shared_cache()).await.unwrap();

        assert_eq!(read(&l1.join("content.txt")), after_first);
        assert_eq!(read(&l1.with_extension("sha")), sidecar);
        assert_eq!(sidecar, sha);
    }

    #[tokio::test]
    async fn platform_0_7_restores_from_metadata_only() {
        let build = Build::new();
        let (l1, sha) = build.previous_layer("L1", "cached content");
        build.commit_metadata(&[("L1", &sha)]);
        fs::remove_dir_all(&l1).unwrap();

        build.restorer("0.7").restore(build.shared_cache()).await.unwrap();

        assert_eq!(read(&l1.join("content.txt")), "cached content");
        assert!(read(&l1.with_extension("toml")).contains(&sha));
    }

    #[tokio::test]
    async fn missing_archive_fails_restore() {
        let build = Build::new();
        build.commit_metadata(&[("L1", "sha256:0000")]);
        let l1 = build.layer("L1");
        fs::create_dir_all(&l1).unwrap();
        fs::write(l1.with_extension("sha"), "sha256:0000").unwrap();

        let err = build
            .restorer("0.6")
            .restore(build.shared_cache())
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::RestoreData(_)));
        assert_eq!(
            err.to_string(),
            "restoring data: layer with SHA 'sha256:0000' not found in cache"
        );
    }

    #[tokio::test]
    async fn sbom_files_follow_the_group() {
        let build = Build::new();
        for bp in ["bp1", "bp2"] {
            let staged = build.layers().join("sbom/launch").join(bp).join("layerX");
            fs::create_dir_all(&staged).unwrap();
            fs::write(staged.join("sbom.cdx.json"), bp).unwrap();
        }

        build.restorer("0.8").restore(None).await.unwrap();

        assert_eq!(read(&build.layers().join("bp1/layerX.sbom.cdx.json")), "bp1");
        assert!(!build.layers().join("bp2").exists());
        assert!(!build.layers().join("sbom").exists());
    }
}

mod stack_tests {
    use kiln::log::MemoryLogger;
    use kiln::platform::{read_stack_metadata, STACK_ID_LABEL};
    use kiln::stack::{StackValidator, StaticImage, StaticImageSource};
    use kiln::KilnError;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const STACK_TOML: &str = r#"
[build-image]
stack-id = "io.example.stack"

[run-image]
image = "reg-a.example.com/img"
mirrors = ["reg-a.example.com/img", "reg-b.example.com/img"]
"#;

    fn validator() -> StackValidator {
        StackValidator::new(Arc::new(MemoryLogger::new()))
    }

    #[tokio::test]
    async fn validates_mirror_from_stack_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stack.toml");
        fs::write(&path, STACK_TOML).unwrap();
        let stack_md = read_stack_metadata(&path).await.unwrap();

        // Only the reg-b mirror exists, so opening the primary would fail
        let images = StaticImageSource::new().with_image(
            StaticImage::new("reg-b.example.com/img")
                .with_label(STACK_ID_LABEL, "io.example.stack"),
        );

        validator()
            .with_previous_image(Some("reg-b.example.com/team/app:1".into()))
            .validate(&stack_md, &images)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn incompatible_run_image_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stack.toml");
        fs::write(&path, STACK_TOML).unwrap();
        let stack_md = read_stack_metadata(&path).await.unwrap();
        let images = StaticImageSource::new().with_image(
            StaticImage::new("reg-a.example.com/img").with_label(STACK_ID_LABEL, "io.other.stack"),
        );

        let err = validator().validate(&stack_md, &images).await.unwrap_err();

        assert!(matches!(err, KilnError::IncompatibleStack { .. }));
        assert!(err.to_string().contains("'io.other.stack'"));
        assert!(err.to_string().contains("'io.example.stack'"));
    }

    #[tokio::test]
    async fn corrupt_stack_toml_is_fatal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stack.toml");
        fs::write(&path, "[build-image\n").unwrap();

        let err = read_stack_metadata(&path).await.unwrap_err();
        assert!(matches!(err, KilnError::StackMetadataRead { .. }));
    }
}
