//! CLI command definitions.

use crate::pack::PackagingMode;
use crate::styles::styles;
use crate::toolchain::ToolchainVersion;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const BUILD_EXAMPLES: &str = "\
Examples:
  forge build --repo https://github.com/acme/weather.git --project src/Weather/Weather.csproj
  forge build -p win-x64,osx-arm64 --mode multi       Bundle several platforms together
  forge build --skip-clone --source ../weather -y     Reuse a checkout, accept fallbacks
  forge build --framework-version 8.0                 Force the target framework
  forge build --parallel --build-timeout 900          Publish platforms concurrently";

const CLI_EXAMPLES: &str = "\
Examples:
  forge build                     Build with settings from forge.toml
  forge list dist/weather-1.0.0-win-x64.mcpb
  forge probe                     Show installed .NET SDKs
  forge platforms                 Show supported targets";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Forge - build .NET MCP servers into extension bundles.
#[derive(Debug, Parser)]
#[command(name = "forge", author, version, styles=styles())]
#[command(
    about = "Build .NET MCP servers into desktop extension bundles",
    after_help = CLI_EXAMPLES
)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Command {
    /// Clone, negotiate, publish and package an extension.
    #[command(after_help = BUILD_EXAMPLES)]
    Build(BuildArgs),

    /// List the contents of an existing bundle.
    List {
        /// Path to the .mcpb archive.
        archive: PathBuf,
    },

    /// Show installed .NET SDKs.
    Probe,

    /// Show supported platform targets.
    Platforms,
}

/// Arguments of `forge build`.
#[derive(Debug, Clone, clap::Args)]
pub struct BuildArgs {
    /// Directory receiving the archive [default: dist].
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Comma-separated runtime identifiers; the first is primary.
    #[arg(short, long, value_name = "LIST")]
    pub platforms: Option<String>,

    /// Reuse an existing checkout instead of cloning.
    #[arg(long)]
    pub skip_clone: bool,

    /// Existing source tree to build; implies --skip-clone.
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Build against this framework version (e.g. 8.0).
    #[arg(long, value_name = "X.Y")]
    pub framework_version: Option<ToolchainVersion>,

    /// Accept a framework fallback without prompting.
    #[arg(short, long)]
    pub yes: bool,

    /// Packaging mode [default: single].
    #[arg(long, value_enum)]
    pub mode: Option<PackagingMode>,

    /// Repository to clone.
    #[arg(long, value_name = "URL")]
    pub repo: Option<String>,

    /// Branch or tag to clone.
    #[arg(long)]
    pub branch: Option<String>,

    /// Project file, relative to the source root.
    #[arg(long, value_name = "REL")]
    pub project: Option<PathBuf>,

    /// Server executable name [default: project file name].
    #[arg(long, value_name = "NAME")]
    pub binary: Option<String>,

    /// Directory holding manifest.json, icon and README [default: extension].
    #[arg(long, value_name = "DIR")]
    pub assets: Option<PathBuf>,

    /// Config file [default: ./forge.toml when present].
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Publish all platforms concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Clone timeout in seconds [default: 300].
    #[arg(long, value_name = "SECS")]
    pub clone_timeout: Option<u64>,

    /// Per-platform build timeout in seconds [default: 1800].
    #[arg(long, value_name = "SECS")]
    pub build_timeout: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_flags() {
        let cli = Cli::try_parse_from([
            "forge",
            "build",
            "-p",
            "osx-arm64,win-x64",
            "--mode",
            "multi",
            "--framework-version",
            "8.0",
            "-y",
            "--parallel",
        ])
        .unwrap();

        let Command::Build(args) = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(args.platforms.as_deref(), Some("osx-arm64,win-x64"));
        assert_eq!(args.mode, Some(PackagingMode::MultiPlatform));
        assert_eq!(args.framework_version, Some(ToolchainVersion::new(8, 0)));
        assert!(args.yes && args.parallel);
    }

    #[test]
    fn test_rejects_bad_framework_version() {
        let result = Cli::try_parse_from(["forge", "build", "--framework-version", "latest"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommands_without_args() {
        assert!(matches!(
            Cli::try_parse_from(["forge", "probe"]).unwrap().command,
            Command::Probe
        ));
        assert!(matches!(
            Cli::try_parse_from(["forge", "-v", "platforms"]).unwrap().command,
            Command::Platforms
        ));
        assert!(Cli::try_parse_from(["forge", "list"]).is_err());
    }
}
