//! Build-time metadata embedded by the build script.
//!
//! The daemon logs these at startup and `radiosleep status` prints them, so a
//! pid on disk can be matched to the binary that wrote it.

use serde::Serialize;

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("RADIOSLEEP_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("RADIOSLEEP_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("RADIOSLEEP_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// All build metadata in one serializable value.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub profile: &'static str,
    pub built_at: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            profile: BUILD_PROFILE,
            built_at: BUILD_TIMESTAMP,
        }
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.version, self.git_hash, self.profile)
    }
}

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    BuildInfo::current().to_string()
}
