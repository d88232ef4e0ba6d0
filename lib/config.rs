//! Build configuration.
//!
//! Values are layered: built-in defaults, then `forge.toml`, then the
//! `FORGE_REPOSITORY` environment variable, then command-line flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_ASSETS_DIR, DEFAULT_BUILD_TIMEOUT_SECS, DEFAULT_CLONE_TIMEOUT_SECS,
    DEFAULT_ICON_FILE, DEFAULT_OUTPUT_DIR, DEFAULT_PLATFORMS, DEFAULT_README_FILE, DOTNET_PROGRAM,
    FORGE_CONFIG_FILE, MCPB_MANIFEST_FILE,
};
use crate::error::{ForgeError, ForgeResult};
use crate::negotiate::{Approval, NegotiateOptions};
use crate::pack::{BundleAssets, PackagingMode};
use crate::platform::PlatformTarget;
use crate::source::SourceSpec;
use crate::toolchain::ToolchainVersion;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Contents of `forge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    /// Where the server source comes from.
    pub source: SourceSection,

    /// What goes into the bundle.
    pub bundle: BundleSection,

    /// Child process time budgets.
    pub timeouts: TimeoutSection,
}

/// `[source]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub repository: Option<String>,
    pub branch: Option<String>,
    /// Project file relative to the source root.
    pub project: Option<PathBuf>,
}

/// `[bundle]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleSection {
    pub binary: Option<String>,
    pub assets: Option<PathBuf>,
    pub icon: Option<PathBuf>,
    pub readme: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub mode: Option<PackagingMode>,
    pub platforms: Option<Vec<PlatformTarget>>,
}

/// `[timeouts]` table, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    pub clone: Option<u64>,
    pub build: Option<u64>,
}

/// Values given on the command line. `None` defers to lower layers.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub output: Option<PathBuf>,
    pub platforms: Option<Vec<PlatformTarget>>,
    pub skip_clone: bool,
    pub source: Option<PathBuf>,
    pub framework_version: Option<ToolchainVersion>,
    pub yes: bool,
    pub mode: Option<PackagingMode>,
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub project: Option<PathBuf>,
    pub binary: Option<String>,
    pub assets: Option<PathBuf>,
    pub parallel: bool,
    pub clone_timeout: Option<u64>,
    pub build_timeout: Option<u64>,
}

/// Fully resolved inputs of one build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Where the source tree comes from.
    pub source: SourceSpec,

    /// Project file relative to the source root.
    pub project: PathBuf,

    /// Assembly name of the server executable.
    pub binary: String,

    /// Manifest, icon and README.
    pub assets: BundleAssets,

    /// Platforms to build, primary first.
    pub platforms: Vec<PlatformTarget>,

    /// How platforms map onto bundles.
    pub mode: PackagingMode,

    /// Directory receiving the archive.
    pub output_dir: PathBuf,

    /// Framework negotiation inputs.
    pub negotiate: NegotiateOptions,

    /// Publish platforms concurrently.
    pub parallel: bool,

    /// Clone time budget.
    pub clone_timeout: Duration,

    /// Per-platform publish time budget.
    pub build_timeout: Duration,

    /// Program used to publish.
    pub dotnet: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ForgeConfig {
    /// Load a config file. Relative asset and output paths are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> ForgeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config: ForgeConfig = toml::from_str(&content)?;

        if let Some(base) = path.parent() {
            config.bundle.rebase(base);
        }

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load an explicitly named config file, or `forge.toml` from `cwd`
    /// when present. No file means an empty config.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> ForgeResult<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ForgeError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Self::load(path);
        }

        let default_path = cwd.join(FORGE_CONFIG_FILE);
        if default_path.is_file() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }
}

impl BundleSection {
    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.assets,
            &mut self.icon,
            &mut self.readme,
            &mut self.output,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() && !base.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        }
    }
}

impl BuildConfig {
    /// Merge the layers into one build configuration.
    ///
    /// `env_repository` is the value of `FORGE_REPOSITORY`, if set.
    pub fn resolve(
        file: ForgeConfig,
        env_repository: Option<String>,
        cli: BuildOverrides,
        approval: Approval,
    ) -> ForgeResult<Self> {
        // An explicit source path always means reuse
        let source = if let Some(path) = cli.source {
            if cli.repository.is_some() {
                tracing::warn!("--source given, ignoring --repo");
            }
            SourceSpec::Reuse(path)
        } else if cli.skip_clone {
            return Err(ForgeError::Configuration(
                "--skip-clone requires --source PATH".to_string(),
            ));
        } else {
            let url = cli
                .repository
                .or(env_repository)
                .or(file.source.repository)
                .ok_or_else(|| {
                    ForgeError::Configuration(
                        "no repository configured; pass --repo, set FORGE_REPOSITORY, \
                         or use --skip-clone --source PATH"
                            .to_string(),
                    )
                })?;
            SourceSpec::Clone {
                url,
                branch: cli.branch.or(file.source.branch),
            }
        };

        let project = cli.project.or(file.source.project).ok_or_else(|| {
            ForgeError::Configuration(
                "no project file configured; pass --project or set [source] project".to_string(),
            )
        })?;

        let binary = match cli.binary.or(file.bundle.binary) {
            Some(binary) => binary,
            None => project
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    ForgeError::Configuration(format!(
                        "cannot derive binary name from {}; pass --binary",
                        project.display()
                    ))
                })?,
        };

        let assets_dir = cli
            .assets
            .or(file.bundle.assets)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
        let assets = BundleAssets {
            manifest: assets_dir.join(MCPB_MANIFEST_FILE),
            icon: Some(
                file.bundle
                    .icon
                    .unwrap_or_else(|| assets_dir.join(DEFAULT_ICON_FILE)),
            ),
            readme: Some(
                file.bundle
                    .readme
                    .unwrap_or_else(|| assets_dir.join(DEFAULT_README_FILE)),
            ),
        };

        let platforms = cli
            .platforms
            .or(file.bundle.platforms)
            .unwrap_or_else(|| DEFAULT_PLATFORMS.to_vec());
        if platforms.is_empty() {
            return Err(ForgeError::Configuration(
                "at least one platform is required".to_string(),
            ));
        }

        Ok(Self {
            source,
            project,
            binary,
            assets,
            platforms,
            mode: cli.mode.or(file.bundle.mode).unwrap_or_default(),
            output_dir: cli
                .output
                .or(file.bundle.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            negotiate: NegotiateOptions {
                override_version: cli.framework_version,
                approval: if cli.yes { Approval::Unattended } else { approval },
            },
            parallel: cli.parallel,
            clone_timeout: Duration::from_secs(
                cli.clone_timeout
                    .or(file.timeouts.clone)
                    .unwrap_or(DEFAULT_CLONE_TIMEOUT_SECS),
            ),
            build_timeout: Duration::from_secs(
                cli.build_timeout
                    .or(file.timeouts.build)
                    .unwrap_or(DEFAULT_BUILD_TIMEOUT_SECS),
            ),
            dotnet: DOTNET_PROGRAM.to_string(),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[source]
repository = "https://example.com/acme/weather.git"
branch = "release"
project = "src/Weather.Server/Weather.Server.csproj"

[bundle]
binary = "weather-server"
assets = "packaging"
mode = "multi"
platforms = ["osx-arm64", "win-x64"]

[timeouts]
clone = 60
"#;

    fn overrides() -> BuildOverrides {
        BuildOverrides::default()
    }

    #[test]
    fn test_load_rebases_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("forge.toml");
        std::fs::write(&path, CONFIG).unwrap();

        let config = ForgeConfig::load(&path).unwrap();
        assert_eq!(config.bundle.assets, Some(dir.path().join("packaging")));
        assert_eq!(
            config.source.project,
            Some(PathBuf::from("src/Weather.Server/Weather.Server.csproj"))
        );
        assert_eq!(
            config.bundle.platforms,
            Some(vec![PlatformTarget::OsxArm64, PlatformTarget::WinX64])
        );
        assert_eq!(config.bundle.mode, Some(PackagingMode::MultiPlatform));
    }

    #[test]
    fn test_load_rejects_unknown_keys_and_platforms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("forge.toml");

        std::fs::write(&path, "[bundle]\nplatfroms = [\"win-x64\"]\n").unwrap();
        assert!(matches!(
            ForgeConfig::load(&path),
            Err(ForgeError::Configuration(_))
        ));

        std::fs::write(&path, "[bundle]\nplatforms = [\"win-arm64\"]\n").unwrap();
        assert!(matches!(
            ForgeConfig::load(&path),
            Err(ForgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_discover() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            ForgeConfig::discover(None, dir.path()).unwrap(),
            ForgeConfig::default()
        );
        assert!(matches!(
            ForgeConfig::discover(Some(&dir.path().join("missing.toml")), dir.path()),
            Err(ForgeError::Configuration(_))
        ));

        std::fs::write(dir.path().join(FORGE_CONFIG_FILE), CONFIG).unwrap();
        let config = ForgeConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.source.branch.as_deref(), Some("release"));
    }

    #[test]
    fn test_resolve_defaults() {
        let cli = BuildOverrides {
            repository: Some("https://example.com/server.git".to_string()),
            project: Some(PathBuf::from("src/Server/Server.csproj")),
            ..overrides()
        };
        let config =
            BuildConfig::resolve(ForgeConfig::default(), None, cli, Approval::Refuse).unwrap();

        assert_eq!(
            config.source,
            SourceSpec::Clone {
                url: "https://example.com/server.git".to_string(),
                branch: None
            }
        );
        assert_eq!(config.binary, "Server");
        assert_eq!(config.platforms, DEFAULT_PLATFORMS.to_vec());
        assert_eq!(config.mode, PackagingMode::SinglePrimary);
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(
            config.assets.manifest,
            Path::new(DEFAULT_ASSETS_DIR).join(MCPB_MANIFEST_FILE)
        );
        assert_eq!(config.negotiate.approval, Approval::Refuse);
        assert_eq!(
            config.clone_timeout,
            Duration::from_secs(DEFAULT_CLONE_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_resolve_layer_precedence() {
        let file: ForgeConfig = toml::from_str(CONFIG).unwrap();
        let cli = BuildOverrides {
            branch: Some("main".to_string()),
            platforms: Some(vec![PlatformTarget::LinuxX64]),
            build_timeout: Some(90),
            yes: true,
            ..overrides()
        };

        let config = BuildConfig::resolve(
            file,
            Some("https://mirror.example.com/weather.git".to_string()),
            cli,
            Approval::Interactive,
        )
        .unwrap();

        // Env beats file, CLI beats both
        assert_eq!(
            config.source,
            SourceSpec::Clone {
                url: "https://mirror.example.com/weather.git".to_string(),
                branch: Some("main".to_string())
            }
        );
        assert_eq!(config.binary, "weather-server");
        assert_eq!(config.platforms, vec![PlatformTarget::LinuxX64]);
        assert_eq!(config.mode, PackagingMode::MultiPlatform);
        assert_eq!(config.clone_timeout, Duration::from_secs(60));
        assert_eq!(config.build_timeout, Duration::from_secs(90));
        assert_eq!(config.negotiate.approval, Approval::Unattended);
    }

    #[test]
    fn test_resolve_skip_clone() {
        let cli = BuildOverrides {
            skip_clone: true,
            source: Some(PathBuf::from("/checkouts/server")),
            project: Some(PathBuf::from("Server.csproj")),
            ..overrides()
        };
        let config =
            BuildConfig::resolve(ForgeConfig::default(), None, cli, Approval::Refuse).unwrap();
        assert_eq!(
            config.source,
            SourceSpec::Reuse(PathBuf::from("/checkouts/server"))
        );
    }

    #[test]
    fn test_resolve_source_implies_reuse() {
        let file = ForgeConfig {
            source: SourceSection {
                repository: Some("https://example.com/from-file.git".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let cli = BuildOverrides {
            source: Some(PathBuf::from("/checkouts/server")),
            repository: Some("https://example.com/from-cli.git".to_string()),
            project: Some(PathBuf::from("Server.csproj")),
            ..overrides()
        };

        let config = BuildConfig::resolve(
            file,
            Some("https://example.com/from-env.git".to_string()),
            cli,
            Approval::Refuse,
        )
        .unwrap();
        assert_eq!(
            config.source,
            SourceSpec::Reuse(PathBuf::from("/checkouts/server"))
        );
    }

    #[test]
    fn test_resolve_missing_values() {
        // Skip flag without a path
        let cli = BuildOverrides {
            skip_clone: true,
            project: Some(PathBuf::from("Server.csproj")),
            ..overrides()
        };
        assert!(matches!(
            BuildConfig::resolve(ForgeConfig::default(), None, cli, Approval::Refuse),
            Err(ForgeError::Configuration(_))
        ));

        // No repository anywhere
        let cli = BuildOverrides {
            project: Some(PathBuf::from("Server.csproj")),
            ..overrides()
        };
        assert!(matches!(
            BuildConfig::resolve(ForgeConfig::default(), None, cli, Approval::Refuse),
            Err(ForgeError::Configuration(_))
        ));

        // No project
        let cli = BuildOverrides {
            repository: Some("https://example.com/server.git".to_string()),
            ..overrides()
        };
        assert!(matches!(
            BuildConfig::resolve(ForgeConfig::default(), None, cli, Approval::Refuse),
            Err(ForgeError::Configuration(_))
        ));
    }
}
