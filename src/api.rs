//! Platform and buildpack API versions
//!
//! Two independent version axes gate restore behaviour: the platform API
//! selects how layer metadata and hashes are stored, the buildpack API
//! selects where cache intent is recorded.

use crate::buildpack::BuildpackGroup;
use crate::error::{KilnError, KilnResult};
use std::fmt;
use std::str::FromStr;

/// Oldest platform API this engine accepts
const MIN_PLATFORM_API: ApiVersion = ApiVersion::new(0, 3);
/// Newest platform API this engine accepts
const MAX_PLATFORM_API: ApiVersion = ApiVersion::new(0, 8);
/// Oldest buildpack API this engine accepts
const MIN_BUILDPACK_API: ApiVersion = ApiVersion::new(0, 2);
/// Newest buildpack API this engine accepts
const MAX_BUILDPACK_API: ApiVersion = ApiVersion::new(0, 7);

/// A `<major>.<minor>` API version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Compare against a version literal such as `"0.7"`.
    ///
    /// An unparsable literal never matches.
    pub fn at_least(&self, other: &str) -> bool {
        other
            .parse::<ApiVersion>()
            .map(|other| *self >= other)
            .unwrap_or(false)
    }
}

impl FromStr for ApiVersion {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (major, minor) = digits
            .split_once('.')
            .ok_or_else(|| KilnError::InvalidApiVersion(s.to_string()))?;

        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| KilnError::InvalidApiVersion(s.to_string()))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Platform API negotiated with the orchestrating platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformApi(ApiVersion);

impl PlatformApi {
    /// Parse and check that the version is supported
    pub fn parse(s: &str) -> KilnResult<Self> {
        let version: ApiVersion = s.parse()?;
        if version < MIN_PLATFORM_API || version > MAX_PLATFORM_API {
            return Err(KilnError::UnsupportedPlatformApi(version.to_string()));
        }
        Ok(Self(version))
    }

    pub fn version(&self) -> ApiVersion {
        self.0
    }

    /// Layer metadata is written by a dedicated step and hashes are
    /// embedded in layer descriptors (0.7+)
    pub fn restores_layer_metadata(&self) -> bool {
        self.0.at_least("0.7")
    }

    /// Staged SBOM files are moved into buildpack directories (0.8+)
    pub fn relocates_sbom(&self) -> bool {
        self.0.at_least("0.8")
    }

    /// Stack compatibility is checked before the build (0.7+)
    pub fn supports_stack_validation(&self) -> bool {
        self.0.at_least("0.7")
    }
}

impl fmt::Display for PlatformApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Check that every buildpack in the group declares a supported API
pub fn verify_buildpack_apis(group: &BuildpackGroup) -> KilnResult<()> {
    for bp in group.iter() {
        let unsupported = || KilnError::UnsupportedBuildpackApi {
            id: bp.id.clone(),
            api: bp.api.clone(),
        };
        let version: ApiVersion = bp.api.parse().map_err(|_| unsupported())?;
        if version < MIN_BUILDPACK_API || version > MAX_BUILDPACK_API {
            return Err(unsupported());
        }
    }
    Ok(())
}
