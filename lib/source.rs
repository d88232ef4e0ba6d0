//! Source tree acquisition.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::BUILD_LOG_TAIL_LINES;
use crate::error::{ForgeError, ForgeResult};
use crate::process::{RunError, run_captured, tail_lines};
use crate::workdir::WorkDir;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where the source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Use an existing checkout as-is.
    Reuse(PathBuf),

    /// Shallow-clone a repository into the work directory.
    Clone {
        /// Repository URL.
        url: String,
        /// Branch or tag to check out (remote default when `None`).
        branch: Option<String>,
    },
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Obtain a source tree and return its root.
pub async fn acquire_source(
    spec: &SourceSpec,
    work: &WorkDir,
    timeout: Duration,
) -> ForgeResult<PathBuf> {
    match spec {
        SourceSpec::Reuse(path) => reuse_source(path),
        SourceSpec::Clone { url, branch } => {
            clone_source(url, branch.as_deref(), &work.source_dir(), timeout).await
        }
    }
}

/// Validate an existing source path.
fn reuse_source(path: &Path) -> ForgeResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(ForgeError::Configuration(
            "source path is empty".to_string(),
        ));
    }
    if !path.is_dir() {
        return Err(ForgeError::Configuration(format!(
            "source path does not exist or is not a directory: {}",
            path.display()
        )));
    }

    tracing::info!("Reusing source tree at {}", path.display());
    Ok(path.to_path_buf())
}

/// Shallow-clone `url` into `dest`, replacing any stale copy.
async fn clone_source(
    url: &str,
    branch: Option<&str>,
    dest: &Path,
    timeout: Duration,
) -> ForgeResult<PathBuf> {
    if dest.exists() {
        tracing::debug!("Removing stale checkout at {}", dest.display());
        std::fs::remove_dir_all(dest)?;
    }

    let args = clone_args(url, branch, dest);
    tracing::info!("Cloning {} into {}", url, dest.display());

    let output = run_captured("git", &args, None, timeout)
        .await
        .map_err(|e| match e {
            RunError::NotFound(program) => {
                ForgeError::Toolchain(format!("{} is required to clone the source", program))
            }
            other => ForgeError::Acquisition(other.to_string()),
        })?;

    if !output.status.success() {
        return Err(ForgeError::Acquisition(format!(
            "git clone of {} failed with exit code {}\n{}",
            url,
            output.code(),
            tail_lines(&output.stderr, BUILD_LOG_TAIL_LINES)
        )));
    }

    Ok(dest.to_path_buf())
}

/// Arguments for a depth-1 clone.
fn clone_args(url: &str, branch: Option<&str>, dest: &Path) -> Vec<String> {
    let mut args = vec![
        "clone".to_string(),
        "--depth".to_string(),
        "1".to_string(),
    ];
    if let Some(branch) = branch {
        args.push("--branch".to_string());
        args.push(branch.to_string());
    }
    args.push(url.to_string());
    args.push(dest.to_string_lossy().into_owned());
    args
}

/// Resolve the primary project file under `root`, failing if it is missing.
pub fn locate_project(root: &Path, project: &Path) -> ForgeResult<PathBuf> {
    let path = if project.is_absolute() {
        project.to_path_buf()
    } else {
        root.join(project)
    };

    if !path.is_file() {
        return Err(ForgeError::Configuration(format!(
            "project file not found: {}",
            path.display()
        )));
    }

    Ok(path)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reuse_existing_path() {
        let dir = TempDir::new().unwrap();
        let work = WorkDir::new().unwrap();
        let spec = SourceSpec::Reuse(dir.path().to_path_buf());

        let root = acquire_source(&spec, &work, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(root, dir.path());
    }

    #[tokio::test]
    async fn test_reuse_missing_path_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let work = WorkDir::new().unwrap();
        let spec = SourceSpec::Reuse(dir.path().join("missing"));

        let result = acquire_source(&spec, &work, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ForgeError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_reuse_empty_path_is_configuration_error() {
        let work = WorkDir::new().unwrap();
        let spec = SourceSpec::Reuse(PathBuf::new());

        let result = acquire_source(&spec, &work, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ForgeError::Configuration(_))));
    }

    #[test]
    fn test_clone_args_are_shallow() {
        let args = clone_args(
            "https://example.com/server.git",
            Some("main"),
            Path::new("/tmp/src"),
        );
        assert_eq!(
            args,
            vec![
                "clone",
                "--depth",
                "1",
                "--branch",
                "main",
                "https://example.com/server.git",
                "/tmp/src"
            ]
        );
    }

    #[test]
    fn test_locate_project() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/Server")).unwrap();
        std::fs::write(dir.path().join("src/Server/Server.csproj"), "<Project/>").unwrap();

        let found = locate_project(dir.path(), Path::new("src/Server/Server.csproj")).unwrap();
        assert!(found.ends_with("src/Server/Server.csproj"));

        let missing = locate_project(dir.path(), Path::new("src/Other.csproj"));
        assert!(matches!(missing, Err(ForgeError::Configuration(_))));
    }
}
