//! Error types for Kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in Kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Configuration errors
    #[error("CNB_STACK_ID is required when there is no stack metadata available")]
    StackIdRequired,

    #[error("CNB_RUN_IMAGE is required when there is no stack metadata available")]
    RunImageRequired,

    #[error("missing run-image metadata")]
    MissingRunImageMetadata,

    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    #[error("Invalid API version '{0}': expected <major>.<minor>")]
    InvalidApiVersion(String),

    #[error("Platform API {0} is not supported")]
    UnsupportedPlatformApi(String),

    #[error("Buildpack API {api} for buildpack {id} is not supported")]
    UnsupportedBuildpackApi { id: String, api: String },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Metadata errors
    #[error("retrieving cache metadata: {0}")]
    CacheMetadataRead(String),

    #[error("get stack metadata from {path}: {reason}")]
    StackMetadataRead { path: PathBuf, reason: String },

    #[error("reading layer metadata {path}: {reason}")]
    LayerMetadataRead { path: PathBuf, reason: String },

    #[error("reading {what} from {path}: {reason}")]
    DocumentRead {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },

    // Layer filesystem errors
    #[error("reading buildpack layer directory {path}: {source}")]
    LayersDirRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("removing layer {layer}: {source}")]
    LayerRemove {
        layer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extracting layer into {path}: {source}")]
    LayerExtract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Restore errors
    #[error("restoring data: {0}")]
    RestoreData(#[source] Box<KilnError>),

    #[error("restoring layer: cache not provided")]
    CacheNotProvided,

    #[error("layer with SHA '{0}' not found in cache")]
    CachedLayerNotFound(String),

    // Stack errors
    #[error("get run image label: {label}")]
    RunImageLabelMissing { label: String },

    #[error("incompatible stack: '{run_stack_id}' is not compatible with '{build_stack_id}'")]
    IncompatibleStack {
        run_stack_id: String,
        build_stack_id: String,
    },

    #[error("inspecting image {reference}: {reason}")]
    ImageInspect { reference: String, reason: String },

    // SBOM errors
    #[error("restoring SBOM {path}: {source}")]
    SbomRelocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Lifecycle phase an error is reported for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analyze,
    Restore,
}

/// Process exit codes understood by the orchestrating platform
pub mod exit_codes {
    /// Invalid arguments or inputs
    pub const INVALID_ARGS: u8 = 3;
    /// Analyze phase failure (stack validation runs here)
    pub const ANALYZE_ERROR: u8 = 30;
    /// Restore phase failure
    pub const RESTORE_ERROR: u8 = 40;
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the user has to fix inputs before retrying
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::StackIdRequired
                | Self::RunImageRequired
                | Self::MissingRunImageMetadata
                | Self::InvalidImageReference { .. }
                | Self::InvalidApiVersion(_)
                | Self::UnsupportedPlatformApi(_)
                | Self::UnsupportedBuildpackApi { .. }
                | Self::ConfigInvalid { .. }
        )
    }

    /// Map the error to the exit code reported for `phase`
    pub fn exit_code(&self, phase: Phase) -> u8 {
        if self.is_configuration() {
            return exit_codes::INVALID_ARGS;
        }
        match phase {
            Phase::Analyze => exit_codes::ANALYZE_ERROR,
            Phase::Restore => exit_codes::RESTORE_ERROR,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::StackIdRequired => Some("Set CNB_STACK_ID or provide a stack.toml"),
            Self::RunImageRequired => Some("Set CNB_RUN_IMAGE or provide a stack.toml"),
            Self::IncompatibleStack { .. } => {
                Some("Use a run image built for the same stack as the build image")
            }
            Self::UnsupportedPlatformApi(_) => Some("Set CNB_PLATFORM_API to 0.3 through 0.8"),
            _ => None,
        }
    }
}
