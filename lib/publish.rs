//! Per-platform `dotnet publish` invocations.

use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{BUILD_LOG_TAIL_LINES, DEFAULT_BUILD_TIMEOUT_SECS, DOTNET_PROGRAM};
use crate::error::{ForgeError, ForgeResult};
use crate::platform::PlatformTarget;
use crate::process::{RunError, run_captured, tail_lines};
use crate::toolchain::ToolchainVersion;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Progress event emitted while publishing.
#[derive(Debug, Clone)]
pub enum PublishProgress {
    /// A platform publish started.
    Started { target: PlatformTarget },
    /// A platform publish succeeded.
    Finished { target: PlatformTarget },
    /// A platform publish failed.
    Failed { target: PlatformTarget },
}

/// Callback type for publish progress events.
pub type PublishCallback = Arc<dyn Fn(PublishProgress) + Send + Sync>;

/// Options for publishing.
#[derive(Clone)]
pub struct PublishOptions {
    /// Program to invoke (normally `dotnet`).
    pub dotnet: String,

    /// Build configuration passed to `-c`.
    pub configuration: String,

    /// Framework to publish for (`-f`), when negotiated.
    pub framework: Option<ToolchainVersion>,

    /// Time budget for one platform.
    pub timeout: Duration,

    /// Run all platforms concurrently.
    pub parallel: bool,

    /// Progress callback.
    pub on_progress: Option<PublishCallback>,
}

/// Output of one successful platform publish.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Platform that was published.
    pub target: PlatformTarget,

    /// Directory holding the published executable.
    pub dir: PathBuf,

    /// Captured compiler output.
    pub log: String,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            dotnet: DOTNET_PROGRAM.to_string(),
            configuration: "Release".to_string(),
            framework: None,
            timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
            parallel: false,
            on_progress: None,
        }
    }
}

impl std::fmt::Debug for PublishOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishOptions")
            .field("dotnet", &self.dotnet)
            .field("configuration", &self.configuration)
            .field("framework", &self.framework)
            .field("timeout", &self.timeout)
            .field("parallel", &self.parallel)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Output directory for one platform under `out_root`.
pub fn platform_output_dir(out_root: &Path, target: PlatformTarget) -> PathBuf {
    out_root.join(target.runtime_identifier())
}

/// Arguments for a self-contained, trimmed, single-file release publish.
///
/// Build servers and MSBuild node reuse are disabled so every publish starts
/// from scratch and leaves no process behind.
pub fn publish_args(
    project: &Path,
    target: PlatformTarget,
    out_dir: &Path,
    options: &PublishOptions,
) -> Vec<String> {
    let mut args = vec![
        "publish".to_string(),
        project.to_string_lossy().into_owned(),
        "-c".to_string(),
        options.configuration.clone(),
        "-r".to_string(),
        target.runtime_identifier().to_string(),
        "--self-contained".to_string(),
        "true".to_string(),
        "-p:PublishSingleFile=true".to_string(),
        "-p:PublishTrimmed=true".to_string(),
        "-p:UseSharedCompilation=false".to_string(),
        "-nodeReuse:false".to_string(),
        "-o".to_string(),
        out_dir.to_string_lossy().into_owned(),
    ];

    if let Some(framework) = options.framework {
        args.push("-f".to_string());
        args.push(framework.moniker());
    }

    args
}

/// Publish `project` for one platform into `<out_root>/<rid>`.
pub async fn publish_platform(
    project: &Path,
    target: PlatformTarget,
    out_root: &Path,
    options: &PublishOptions,
) -> ForgeResult<BuildOutput> {
    let out_dir = platform_output_dir(out_root, target);
    std::fs::create_dir_all(&out_dir)?;

    let args = publish_args(project, target, &out_dir, options);
    let cwd = project.parent();

    tracing::info!("Publishing {} for {}", project.display(), target);
    emit(options, PublishProgress::Started { target });

    let result = run_captured(&options.dotnet, &args, cwd, options.timeout).await;

    let output = match result {
        Ok(output) => output,
        Err(RunError::NotFound(program)) => {
            emit(options, PublishProgress::Failed { target });
            return Err(ForgeError::Toolchain(format!(
                "{} is required to build the server",
                program
            )));
        }
        Err(e) => {
            emit(options, PublishProgress::Failed { target });
            return Err(ForgeError::Build {
                platform: target.to_string(),
                message: e.to_string(),
            });
        }
    };

    if !output.status.success() {
        emit(options, PublishProgress::Failed { target });
        return Err(ForgeError::Build {
            platform: target.to_string(),
            message: format!(
                "{} publish exited with code {}\n{}",
                options.dotnet,
                output.code(),
                tail_lines(&output.combined(), BUILD_LOG_TAIL_LINES)
            ),
        });
    }

    emit(options, PublishProgress::Finished { target });
    Ok(BuildOutput {
        target,
        dir: out_dir,
        log: output.combined(),
    })
}

/// Publish every target.
///
/// Sequential mode stops at the first failure. Parallel mode waits for every
/// platform, then fails if any failed, reporting all failures.
pub async fn publish_all(
    project: &Path,
    targets: &[PlatformTarget],
    out_root: &Path,
    options: &PublishOptions,
) -> ForgeResult<Vec<BuildOutput>> {
    if !options.parallel {
        let mut outputs = Vec::with_capacity(targets.len());
        for target in targets {
            outputs.push(publish_platform(project, *target, out_root, options).await?);
        }
        return Ok(outputs);
    }

    let results = join_all(
        targets
            .iter()
            .map(|target| publish_platform(project, *target, out_root, options)),
    )
    .await;

    let mut outputs = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => failures.push(e),
        }
    }

    match failures.len() {
        0 => Ok(outputs),
        1 => Err(failures.remove(0)),
        _ => Err(ForgeError::BuildFailures(failures)),
    }
}

fn emit(options: &PublishOptions, event: PublishProgress) {
    if let Some(ref cb) = options.on_progress {
        cb(event);
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_publish_args() {
        let options = PublishOptions {
            framework: Some(ToolchainVersion::new(8, 0)),
            ..Default::default()
        };
        let args = publish_args(
            Path::new("/src/Server/Server.csproj"),
            PlatformTarget::OsxArm64,
            Path::new("/work/publish/osx-arm64"),
            &options,
        );

        assert_eq!(
            args,
            vec![
                "publish",
                "/src/Server/Server.csproj",
                "-c",
                "Release",
                "-r",
                "osx-arm64",
                "--self-contained",
                "true",
                "-p:PublishSingleFile=true",
                "-p:PublishTrimmed=true",
                "-p:UseSharedCompilation=false",
                "-nodeReuse:false",
                "-o",
                "/work/publish/osx-arm64",
                "-f",
                "net8.0",
            ]
        );
    }

    #[test]
    fn test_publish_args_without_framework() {
        let args = publish_args(
            Path::new("Server.csproj"),
            PlatformTarget::WinX64,
            Path::new("out"),
            &PublishOptions::default(),
        );
        assert!(!args.iter().any(|a| a == "-f"));
    }

    #[tokio::test]
    async fn test_missing_dotnet_is_toolchain_error() {
        let dir = TempDir::new().unwrap();
        let options = PublishOptions {
            dotnet: "ext-forge-missing-dotnet".to_string(),
            ..Default::default()
        };
        let result = publish_platform(
            &dir.path().join("Server.csproj"),
            PlatformTarget::WinX64,
            &dir.path().join("publish"),
            &options,
        )
        .await;
        assert!(matches!(result, Err(ForgeError::Toolchain(_))));
    }

    /// Write a fake `dotnet` that emits `srv` into `-o`, failing for `fail_rid`.
    #[cfg(unix)]
    fn fake_dotnet(dir: &Path, fail_rid: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            r#"#!/bin/sh
rid=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -r) rid="$2"; shift ;;
    -o) out="$2"; shift ;;
  esac
  shift
done
if [ "$rid" = "{}" ]; then
  echo "error NETSDK1083: unsupported runtime $rid" >&2
  exit 1
fi
mkdir -p "$out"
echo "binary for $rid" > "$out/srv"
echo "published $rid"
"#,
            fail_rid
        );
        let path = dir.join("fake-dotnet");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_platform_writes_per_platform_dir() {
        let dir = TempDir::new().unwrap();
        let options = PublishOptions {
            dotnet: fake_dotnet(dir.path(), "none"),
            ..Default::default()
        };

        let output = publish_platform(
            &dir.path().join("Server.csproj"),
            PlatformTarget::LinuxX64,
            &dir.path().join("publish"),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(output.dir, dir.path().join("publish/linux-x64"));
        assert!(output.dir.join("srv").exists());
        assert!(output.log.contains("published linux-x64"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sequential_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let options = PublishOptions {
            dotnet: fake_dotnet(dir.path(), "win-x64"),
            ..Default::default()
        };

        let result = publish_all(
            &dir.path().join("Server.csproj"),
            &[PlatformTarget::WinX64, PlatformTarget::OsxArm64],
            &dir.path().join("publish"),
            &options,
        )
        .await;

        match result {
            Err(ForgeError::Build { platform, message }) => {
                assert_eq!(platform, "win-x64");
                assert!(message.contains("NETSDK1083"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!dir.path().join("publish/osx-arm64/srv").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_parallel_collects_all_results_before_failing() {
        let dir = TempDir::new().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let options = PublishOptions {
            dotnet: fake_dotnet(dir.path(), "win-x64"),
            parallel: true,
            on_progress: Some(Arc::new(move |e| sink.lock().unwrap().push(e))),
            ..Default::default()
        };

        let result = publish_all(
            &dir.path().join("Server.csproj"),
            &[PlatformTarget::WinX64, PlatformTarget::OsxArm64],
            &dir.path().join("publish"),
            &options,
        )
        .await;

        assert!(matches!(result, Err(ForgeError::Build { ref platform, .. }) if platform == "win-x64"));
        // The healthy platform still ran to completion
        assert!(dir.path().join("publish/osx-arm64/srv").exists());

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            PublishProgress::Finished {
                target: PlatformTarget::OsxArm64
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            PublishProgress::Failed {
                target: PlatformTarget::WinX64
            }
        )));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_parallel_success_returns_all_outputs() {
        let dir = TempDir::new().unwrap();
        let options = PublishOptions {
            dotnet: fake_dotnet(dir.path(), "none"),
            parallel: true,
            ..Default::default()
        };

        let outputs = publish_all(
            &dir.path().join("Server.csproj"),
            &[PlatformTarget::WinX64, PlatformTarget::OsxX64],
            &dir.path().join("publish"),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].target, PlatformTarget::WinX64);
        assert_eq!(outputs[1].target, PlatformTarget::OsxX64);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_finishes_while_build_server_lingers() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-dotnet");
        std::fs::write(
            &script,
            r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
  esac
  shift
done
mkdir -p "$out"
echo "binary" > "$out/srv"
sleep 5 &
echo "publish succeeded"
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let options = PublishOptions {
            dotnet: script.to_string_lossy().into_owned(),
            timeout: Duration::from_secs(3),
            ..Default::default()
        };
        let output = publish_platform(
            &dir.path().join("Server.csproj"),
            PlatformTarget::LinuxArm64,
            &dir.path().join("publish"),
            &options,
        )
        .await
        .unwrap();

        assert!(output.dir.join("srv").exists());
        assert!(output.log.contains("publish succeeded"));
    }
}
