//! Constants for ext-forge.
//!
//! This module contains all path, naming and default configuration constants.

use crate::platform::PlatformTarget;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The manifest file name for MCPB bundles.
pub const MCPB_MANIFEST_FILE: &str = "manifest.json";

/// File extension for MCPB bundles.
pub const MCPB_EXT: &str = "mcpb";

/// Directory inside the bundle holding platform executables.
pub const BUNDLE_SERVER_DIR: &str = "server";

/// Placeholder the host expands to the bundle's install directory.
pub const DIRNAME_VAR: &str = "${__dirname}";

/// Default config file looked up in the working directory.
pub const FORGE_CONFIG_FILE: &str = "forge.toml";

/// Environment variable overriding the source repository URL.
pub const FORGE_REPOSITORY_ENV: &str = "FORGE_REPOSITORY";

/// Default directory for produced archives.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Default directory holding manifest, icon and README.
pub const DEFAULT_ASSETS_DIR: &str = "extension";

/// Default icon file name inside the assets directory.
pub const DEFAULT_ICON_FILE: &str = "icon.png";

/// Default README file name inside the assets directory.
pub const DEFAULT_README_FILE: &str = "README.md";

/// Platforms built when none are requested.
pub const DEFAULT_PLATFORMS: &[PlatformTarget] = &[
    PlatformTarget::WinX64,
    PlatformTarget::OsxX64,
    PlatformTarget::OsxArm64,
];

/// Program used for SDK probing and publishing.
pub const DOTNET_PROGRAM: &str = "dotnet";

/// Default timeout for the source clone, in seconds.
pub const DEFAULT_CLONE_TIMEOUT_SECS: u64 = 300;

/// Default timeout for one platform publish, in seconds.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 1800;

/// Default timeout for toolchain probing, in seconds.
pub const PROBE_TIMEOUT_SECS: u64 = 30;

/// Build-configuration file extensions scanned for framework declarations.
pub const BUILD_CONFIG_EXTENSIONS: &[&str] = &["csproj", "fsproj", "props", "targets"];

/// Directories never scanned for build-configuration files.
pub const SCAN_SKIP_DIRS: &[&str] = &[".git", "bin", "obj", "node_modules"];

/// OS-generated metadata never written into an archive.
pub const OS_METADATA_IGNORES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", "__MACOSX/"];

/// Number of trailing compiler output lines kept in a build error.
pub const BUILD_LOG_TAIL_LINES: usize = 20;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Get the repository URL override from the `FORGE_REPOSITORY` env var.
pub fn get_repository_override() -> Option<String> {
    std::env::var(FORGE_REPOSITORY_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
}
