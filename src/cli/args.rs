//! CLI argument definitions using clap derive

use crate::config::Overrides;
use crate::error::Phase;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Kiln - buildpack layer cache restorer
///
/// Reconciles a buildpack layers directory with the layer cache and checks
/// that the run image belongs to the build stack.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore cached layers into the layers directory
    Restore(RestoreArgs),

    /// Check that the run image matches the build stack
    ValidateStack(ValidateStackArgs),
}

impl Commands {
    /// Lifecycle phase failures of this command are reported for
    pub fn phase(&self) -> Phase {
        match self {
            Self::Restore(_) => Phase::Restore,
            Self::ValidateStack(_) => Phase::Analyze,
        }
    }
}

/// Arguments for the restore command
#[derive(Parser, Debug, Default)]
pub struct RestoreArgs {
    /// Platform API version
    #[arg(long, env = "CNB_PLATFORM_API")]
    pub platform_api: Option<String>,

    /// Buildpack layers directory
    #[arg(long, env = "CNB_LAYERS_DIR")]
    pub layers_dir: Option<PathBuf>,

    /// Buildpack group file
    #[arg(long, env = "CNB_GROUP_PATH")]
    pub group_path: Option<PathBuf>,

    /// Analyzed metadata file
    #[arg(long, env = "CNB_ANALYZED_PATH")]
    pub analyzed_path: Option<PathBuf>,

    /// Layer cache directory
    #[arg(long, env = "CNB_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Only restore store.toml, not layer metadata
    #[arg(long)]
    pub skip_layers: bool,
}

impl RestoreArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            platform_api: self.platform_api.clone(),
            layers_dir: self.layers_dir.clone(),
            group_path: self.group_path.clone(),
            analyzed_path: self.analyzed_path.clone(),
            cache_dir: self.cache_dir.clone(),
            skip_layers: self.skip_layers,
            ..Default::default()
        }
    }
}

/// Arguments for the validate-stack command
#[derive(Parser, Debug, Default)]
pub struct ValidateStackArgs {
    /// Platform API version
    #[arg(long, env = "CNB_PLATFORM_API")]
    pub platform_api: Option<String>,

    /// Stack metadata file
    #[arg(long, env = "CNB_STACK_PATH")]
    pub stack_path: Option<PathBuf>,

    /// Build stack ID, overrides stack.toml
    #[arg(long, env = "CNB_STACK_ID")]
    pub stack_id: Option<String>,

    /// Run image reference, overrides stack.toml
    #[arg(long, env = "CNB_RUN_IMAGE")]
    pub run_image: Option<String>,

    /// Image being built; selects the run image mirror by registry
    #[arg(long, env = "CNB_PREVIOUS_IMAGE")]
    pub previous_image: Option<String>,

    /// Inspect the run image in the local container engine
    #[arg(long, env = "CNB_USE_DAEMON", value_parser = BoolishValueParser::new())]
    pub use_daemon: bool,
}

impl ValidateStackArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            platform_api: self.platform_api.clone(),
            stack_path: self.stack_path.clone(),
            use_daemon: self.use_daemon,
            ..Default::default()
        }
    }
}
