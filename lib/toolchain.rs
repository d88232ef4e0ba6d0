//! Installed .NET SDK detection.

use semver::Version;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::PROBE_TIMEOUT_SECS;
use crate::process::run_captured;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A `major.minor` toolchain or target framework version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolchainVersion {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
}

/// Result of probing the installed SDKs.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    /// Every SDK reported by `dotnet --list-sdks`, ascending.
    pub sdks: Vec<Version>,

    /// Highest installed `major.minor`, `None` when detection failed.
    pub highest: Option<ToolchainVersion>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ToolchainVersion {
    /// Create a version from its components.
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Parse a full SDK version such as `8.0.404` or `10.0.100-preview.1.25080.5`.
    pub fn from_sdk_version(version: &Version) -> Self {
        Self::new(version.major, version.minor)
    }

    /// Parse a target framework moniker such as `net8.0`.
    ///
    /// Platform-qualified monikers (`net8.0-windows`) and legacy monikers
    /// (`net48`, `netstandard2.0`) are not framework versions and yield `None`.
    pub fn from_moniker(moniker: &str) -> Option<Self> {
        let rest = moniker.trim().strip_prefix("net")?;
        let (major, minor) = rest.split_once('.')?;
        if major.is_empty() || minor.is_empty() {
            return None;
        }
        if !major.bytes().all(|b| b.is_ascii_digit()) || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }

    /// Target framework moniker for this version (`net8.0`).
    pub fn moniker(&self) -> String {
        format!("net{}.{}", self.major, self.minor)
    }

    /// Fallback target for this installed version: same major, minor zeroed.
    pub fn fallback(&self) -> Self {
        Self::new(self.major, 0)
    }
}

impl ProbeResult {
    /// Build a probe result from `dotnet --list-sdks` output.
    pub fn from_list_sdks(output: &str) -> Self {
        let mut sdks = parse_sdk_list(output);
        sdks.sort();
        let highest = sdks.last().map(ToolchainVersion::from_sdk_version);
        Self { sdks, highest }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Probe installed SDKs. Never fails: any problem yields an empty result.
pub async fn probe_toolchain(dotnet: &str) -> ProbeResult {
    let output = match run_captured(
        dotnet,
        ["--list-sdks"],
        None,
        Duration::from_secs(PROBE_TIMEOUT_SECS),
    )
    .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("SDK probe failed: {}", e);
            return ProbeResult::default();
        }
    };

    if !output.status.success() {
        tracing::debug!("dotnet --list-sdks exited with code {}", output.code());
        return ProbeResult::default();
    }

    let result = ProbeResult::from_list_sdks(&output.stdout);
    tracing::debug!("Detected {} SDK(s), highest {:?}", result.sdks.len(), result.highest);
    result
}

/// Parse the lines of `dotnet --list-sdks` (`8.0.404 [/usr/share/dotnet/sdk]`).
fn parse_sdk_list(output: &str) -> Vec<Version> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|token| Version::parse(token).ok())
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ToolchainVersion {
    type Err = String;

    /// Accepts `9.0`, `9` or `net9.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.starts_with("net") {
            return Self::from_moniker(trimmed)
                .ok_or_else(|| format!("Invalid framework version: {}", s));
        }

        let (major, minor) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
        match (major.parse::<u64>(), minor.parse::<u64>()) {
            (Ok(major), Ok(minor)) => Ok(Self::new(major, minor)),
            _ => Err(format!("Invalid framework version: {}", s)),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_picks_highest_sdk() {
        let output = "\
6.0.428 [/usr/share/dotnet/sdk]
8.0.404 [/usr/share/dotnet/sdk]
8.0.110 [/usr/share/dotnet/sdk]
";
        let result = ProbeResult::from_list_sdks(output);
        assert_eq!(result.sdks.len(), 3);
        assert_eq!(result.highest, Some(ToolchainVersion::new(8, 0)));
    }

    #[test]
    fn test_probe_handles_preview_sdks() {
        let output = "8.0.404 [/sdk]\n10.0.100-preview.1.25080.5 [/sdk]\n";
        let result = ProbeResult::from_list_sdks(output);
        assert_eq!(result.highest, Some(ToolchainVersion::new(10, 0)));
    }

    #[test]
    fn test_probe_unparseable_output_is_unknown() {
        let result = ProbeResult::from_list_sdks("command not found\n");
        assert!(result.sdks.is_empty());
        assert_eq!(result.highest, None);
    }

    #[tokio::test]
    async fn test_missing_dotnet_yields_empty_result() {
        let result = probe_toolchain("ext-forge-missing-dotnet").await;
        assert!(result.sdks.is_empty());
        assert_eq!(result.highest, None);
    }

    #[test]
    fn test_from_moniker() {
        assert_eq!(
            ToolchainVersion::from_moniker("net10.0"),
            Some(ToolchainVersion::new(10, 0))
        );
        assert_eq!(
            ToolchainVersion::from_moniker("net8.0"),
            Some(ToolchainVersion::new(8, 0))
        );
        assert_eq!(ToolchainVersion::from_moniker("net8.0-windows"), None);
        assert_eq!(ToolchainVersion::from_moniker("net48"), None);
        assert_eq!(ToolchainVersion::from_moniker("netstandard2.0"), None);
    }

    #[test]
    fn test_ordering_is_numeric() {
        assert!(ToolchainVersion::new(8, 0) < ToolchainVersion::new(10, 0));
        assert!(ToolchainVersion::new(9, 1) > ToolchainVersion::new(9, 0));
    }

    #[test]
    fn test_fallback_zeroes_minor() {
        assert_eq!(
            ToolchainVersion::new(8, 3).fallback(),
            ToolchainVersion::new(8, 0)
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("9.0".parse(), Ok(ToolchainVersion::new(9, 0)));
        assert_eq!("9".parse(), Ok(ToolchainVersion::new(9, 0)));
        assert_eq!("net9.0".parse(), Ok(ToolchainVersion::new(9, 0)));
        assert!("nine".parse::<ToolchainVersion>().is_err());
    }
}
