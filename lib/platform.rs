//! Platform targets and their naming rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ForgeError, ForgeResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An OS/architecture pair the pipeline can publish for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PlatformTarget {
    /// Windows x64.
    WinX64,
    /// Intel macOS.
    OsxX64,
    /// Apple Silicon macOS.
    OsxArm64,
    /// Linux x64.
    LinuxX64,
    /// Linux arm64.
    LinuxArm64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PlatformTarget {
    /// Every supported target, in display order.
    pub const ALL: &'static [PlatformTarget] = &[
        PlatformTarget::WinX64,
        PlatformTarget::OsxX64,
        PlatformTarget::OsxArm64,
        PlatformTarget::LinuxX64,
        PlatformTarget::LinuxArm64,
    ];

    /// .NET runtime identifier passed to `dotnet publish -r`.
    pub fn runtime_identifier(&self) -> &'static str {
        match self {
            Self::WinX64 => "win-x64",
            Self::OsxX64 => "osx-x64",
            Self::OsxArm64 => "osx-arm64",
            Self::LinuxX64 => "linux-x64",
            Self::LinuxArm64 => "linux-arm64",
        }
    }

    /// Manifest `compatibility.platforms` tag.
    pub fn compatibility_tag(&self) -> &'static str {
        match self {
            Self::WinX64 => "win32",
            Self::OsxX64 | Self::OsxArm64 => "darwin",
            Self::LinuxX64 | Self::LinuxArm64 => "linux",
        }
    }

    /// Whether executables for this target carry a `.exe` suffix.
    pub fn is_windows(&self) -> bool {
        matches!(self, Self::WinX64)
    }

    fn exe_suffix(&self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// File name `dotnet publish` produces for an assembly named `binary`.
    pub fn executable_name(&self, binary: &str) -> String {
        format!("{}{}", binary, self.exe_suffix())
    }

    /// File name inside the bundle's `server/` directory.
    ///
    /// Platform-qualified names (`server-osx-arm64`) let several targets share
    /// one bundle; canonical names are used when one target owns the bundle.
    pub fn destination_name(&self, binary: &str, qualified: bool) -> String {
        if qualified {
            format!(
                "{}-{}{}",
                binary,
                self.runtime_identifier(),
                self.exe_suffix()
            )
        } else {
            self.executable_name(binary)
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parse a comma-separated platform list (`win-x64,osx-arm64`).
///
/// Order is preserved and duplicates are dropped; the first entry is the
/// primary platform in single-primary packaging.
pub fn parse_platform_list(list: &str) -> ForgeResult<Vec<PlatformTarget>> {
    let mut targets = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let target = item.parse::<PlatformTarget>().map_err(ForgeError::Configuration)?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    if targets.is_empty() {
        return Err(ForgeError::Configuration(
            "platform list is empty".to_string(),
        ));
    }

    Ok(targets)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.runtime_identifier())
    }
}

impl FromStr for PlatformTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win-x64" => Ok(Self::WinX64),
            "osx-x64" => Ok(Self::OsxX64),
            "osx-arm64" => Ok(Self::OsxArm64),
            "linux-x64" => Ok(Self::LinuxX64),
            "linux-arm64" => Ok(Self::LinuxArm64),
            _ => Err(format!(
                "Unknown platform: {} (supported: {})",
                s,
                Self::ALL
                    .iter()
                    .map(|p| p.runtime_identifier())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

impl TryFrom<String> for PlatformTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlatformTarget> for String {
    fn from(value: PlatformTarget) -> Self {
        value.runtime_identifier().to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
