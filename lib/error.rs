//! Error types for ext-forge.

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Result type for ext-forge operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Error type for ext-forge operations.
///
/// Every variant except the incidental `Io`/`Json` conversions names the
/// pipeline stage that failed, see [`ForgeError::stage`].
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Bad or missing required input.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Required tool (dotnet, git) absent or unusable.
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    /// Source checkout failed.
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// A platform publish failed.
    #[error("Build error: {platform}: {message}")]
    Build {
        /// Runtime identifier of the failed platform.
        platform: String,
        /// Failure summary, including the tail of compiler output.
        message: String,
    },

    /// Several platform publishes failed (parallel mode).
    #[error("Build error: {} platform(s) failed", .0.len())]
    BuildFailures(Vec<ForgeError>),

    /// Manifest or archive failure while assembling the bundle.
    #[error("Packaging error: {0}")]
    Packaging(String),

    /// The written archive could not be read back.
    #[error("Packaging verification error: {0}")]
    PackagingVerification(String),

    /// The run was stopped with Ctrl+C.
    #[error("Interrupted")]
    Interrupted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ForgeError {
    /// Short stage tag used when rendering the error (`error[build]`).
    pub fn stage(&self) -> &'static str {
        match self {
            ForgeError::Configuration(_) => "configuration",
            ForgeError::Toolchain(_) => "toolchain",
            ForgeError::Acquisition(_) => "acquisition",
            ForgeError::Build { .. } | ForgeError::BuildFailures(_) => "build",
            ForgeError::Packaging(_) => "packaging",
            ForgeError::PackagingVerification(_) => "verification",
            ForgeError::Interrupted => "interrupted",
            ForgeError::Io(_) => "io",
            ForgeError::Json(_) => "json",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<crate::pack::PackError> for ForgeError {
    fn from(err: crate::pack::PackError) -> Self {
        ForgeError::Packaging(err.to_string())
    }
}

impl From<toml::de::Error> for ForgeError {
    fn from(err: toml::de::Error) -> Self {
        ForgeError::Configuration(format!("invalid config file: {}", err))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        assert_eq!(
            ForgeError::Configuration("x".into()).stage(),
            "configuration"
        );
        assert_eq!(
            ForgeError::Build {
                platform: "win-x64".into(),
                message: "exit 1".into()
            }
            .stage(),
            "build"
        );
        assert_eq!(
            ForgeError::PackagingVerification("bad".into()).stage(),
            "verification"
        );
        assert_eq!(ForgeError::Interrupted.stage(), "interrupted");
    }

    #[test]
    fn test_build_error_display_names_platform() {
        let err = ForgeError::Build {
            platform: "osx-arm64".into(),
            message: "dotnet publish exited with code 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Build error: osx-arm64: dotnet publish exited with code 1"
        );
    }
}
