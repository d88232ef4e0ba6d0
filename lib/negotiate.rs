//! Target framework negotiation against the installed SDK.
//!
//! A source tree may declare a newer target framework (`net10.0`) than the
//! installed SDK can build. Negotiation picks the effective framework version
//! and, when it differs from the declared one, rewrites the declarations in
//! every build-configuration file of the tree.

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::constants::{BUILD_CONFIG_EXTENSIONS, SCAN_SKIP_DIRS};
use crate::error::{ForgeError, ForgeResult};
use crate::prompt;
use crate::toolchain::ToolchainVersion;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Matches `<TargetFramework>` and `<TargetFrameworks>` elements, with or
/// without attributes (`Condition="..."`).
static TARGET_FRAMEWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<open><TargetFrameworks?(?:\s[^>]*)?>)(?P<value>[^<]*)(?P<close></TargetFrameworks?>)",
    )
    .expect("valid target framework pattern")
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How the effective version was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Operator supplied an explicit version.
    Override,
    /// The declared version is buildable (or nothing is known to compare).
    Declared,
    /// The installed SDK is older; fall back to its major version.
    Fallback,
}

/// Pure outcome of comparing declared, installed and override versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationPlan {
    /// Version declared by the project, if found.
    pub declared: Option<ToolchainVersion>,

    /// Highest installed SDK version, if detected.
    pub installed: Option<ToolchainVersion>,

    /// Version to build with, `None` when nothing is known.
    pub effective: Option<ToolchainVersion>,

    /// Why `effective` was chosen.
    pub decision: Decision,
}

/// How a required fallback gets approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// Pre-authorized (`--yes`): accept without asking.
    Unattended,
    /// Ask the operator on the terminal.
    Interactive,
    /// The answer was collected up front, e.g. by an embedding front end.
    Decided(bool),
    /// No terminal and no pre-authorization: refuse.
    Refuse,
}

/// Negotiation inputs supplied by the operator.
#[derive(Debug, Clone, Copy)]
pub struct NegotiateOptions {
    /// Explicit framework version; always wins.
    pub override_version: Option<ToolchainVersion>,

    /// Fallback approval policy.
    pub approval: Approval,
}

/// Result of a completed negotiation.
#[derive(Debug, Clone)]
pub struct NegotiationReport {
    /// The plan that was applied.
    pub plan: NegotiationPlan,

    /// Build-configuration files rewritten to the effective version.
    pub patched: Vec<PathBuf>,
}

/// Outcome of negotiation: proceed, or stop because the operator declined.
#[derive(Debug, Clone)]
pub enum Negotiated {
    /// Continue building.
    Proceed(NegotiationReport),
    /// The operator declined the fallback.
    Cancelled,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NegotiationPlan {
    /// Whether declarations need rewriting.
    pub fn needs_patch(&self) -> bool {
        match (self.declared, self.effective) {
            (Some(declared), Some(effective)) => declared != effective,
            _ => false,
        }
    }
}

impl Approval {
    /// Pick a policy from the `--yes` flag and whether a terminal is attached.
    pub fn detect(yes: bool) -> Self {
        if yes {
            Self::Unattended
        } else if console::user_attended() {
            Self::Interactive
        } else {
            Self::Refuse
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Compare versions and pick the effective one. No side effects.
pub fn plan_negotiation(
    declared: Option<ToolchainVersion>,
    installed: Option<ToolchainVersion>,
    override_version: Option<ToolchainVersion>,
) -> NegotiationPlan {
    if let Some(version) = override_version {
        return NegotiationPlan {
            declared,
            installed,
            effective: Some(version),
            decision: Decision::Override,
        };
    }

    match (declared, installed) {
        (Some(declared), Some(installed)) if installed < declared => NegotiationPlan {
            declared: Some(declared),
            installed: Some(installed),
            effective: Some(installed.fallback()),
            decision: Decision::Fallback,
        },
        _ => NegotiationPlan {
            declared,
            installed,
            effective: declared,
            decision: Decision::Declared,
        },
    }
}

/// Negotiate the framework version for the tree at `root`.
///
/// Reads the declaration from `project`, applies the approval policy when a
/// fallback is required, and rewrites declarations when the effective
/// version differs from the declared one.
pub fn negotiate(
    root: &Path,
    project: &Path,
    installed: Option<ToolchainVersion>,
    options: &NegotiateOptions,
) -> ForgeResult<Negotiated> {
    let declared = read_declared_version(project)?;
    if declared.is_none() {
        tracing::warn!(
            "No target framework declaration found in {}",
            project.display()
        );
    }

    let plan = plan_negotiation(declared, installed, options.override_version);
    tracing::info!(
        "Framework negotiation: declared={:?} installed={:?} effective={:?} ({:?})",
        plan.declared,
        plan.installed,
        plan.effective,
        plan.decision
    );

    if plan.decision == Decision::Fallback
        && let (Some(declared), Some(effective)) = (plan.declared, plan.effective)
    {
        match options.approval {
            Approval::Unattended | Approval::Decided(true) => {}
            Approval::Decided(false) => {
                tracing::info!("Fallback to {} declined", effective.moniker());
                return Ok(Negotiated::Cancelled);
            }
            Approval::Interactive => {
                if !prompt::confirm_fallback(declared, effective)? {
                    return Ok(Negotiated::Cancelled);
                }
            }
            Approval::Refuse => {
                return Err(ForgeError::Toolchain(format!(
                    "project targets {} but the newest installed SDK is {}; \
                     rerun with --yes to build against {} or pass --framework-version",
                    declared.moniker(),
                    plan.installed.map(|v| v.to_string()).unwrap_or_default(),
                    effective.moniker()
                )));
            }
        }
    }

    let patched = match (plan.declared, plan.effective) {
        (Some(declared), Some(effective)) if plan.needs_patch() => {
            patch_declarations(root, declared, effective)?
        }
        _ => Vec::new(),
    };

    Ok(Negotiated::Proceed(NegotiationReport { plan, patched }))
}

/// Read the declared target framework from a project file.
///
/// Multi-targeting lists yield their highest framework version.
pub fn read_declared_version(project: &Path) -> ForgeResult<Option<ToolchainVersion>> {
    let content = std::fs::read_to_string(project).map_err(|e| {
        ForgeError::Configuration(format!("failed to read {}: {}", project.display(), e))
    })?;
    Ok(declared_version_in(&content))
}

/// First framework declaration in `content`, if any.
fn declared_version_in(content: &str) -> Option<ToolchainVersion> {
    TARGET_FRAMEWORK_RE.captures_iter(content).find_map(|caps| {
        caps["value"]
            .split(';')
            .filter_map(ToolchainVersion::from_moniker)
            .max()
    })
}

/// Rewrite `old` declarations to `new` in every build-configuration file
/// under `root`. Returns the rewritten files.
pub fn patch_declarations(
    root: &Path,
    old: ToolchainVersion,
    new: ToolchainVersion,
) -> ForgeResult<Vec<PathBuf>> {
    let mut patched = Vec::new();
    if old == new {
        return Ok(patched);
    }

    for path in find_build_config_files(root) {
        let content = std::fs::read_to_string(&path)?;
        if let Some(rewritten) = rewrite_declarations(&content, old, new) {
            std::fs::write(&path, rewritten)?;
            tracing::info!("Patched {} ({} -> {})", path.display(), old, new);
            patched.push(path);
        }
    }

    Ok(patched)
}

/// Rewrite matching declarations in one document. `None` when nothing changed.
///
/// Only whole list items equal to the old moniker are replaced, so
/// `net10.0-windows` or `net10` survive untouched. A list that already holds
/// the new moniker keeps it once (`net10.0;net9.0` becomes `net9.0`).
pub fn rewrite_declarations(
    content: &str,
    old: ToolchainVersion,
    new: ToolchainVersion,
) -> Option<String> {
    let old_moniker = old.moniker();
    let new_moniker = new.moniker();

    let rewritten = TARGET_FRAMEWORK_RE.replace_all(content, |caps: &Captures| {
        let items: Vec<&str> = caps["value"].split(';').collect();
        if !items.iter().any(|item| item.trim() == old_moniker) {
            return caps[0].to_string();
        }

        let mut kept_new = false;
        let value = items
            .into_iter()
            .filter_map(|item| {
                let item = if item.trim() == old_moniker {
                    item.replacen(&old_moniker, &new_moniker, 1)
                } else {
                    item.to_string()
                };
                if item.trim() == new_moniker {
                    if kept_new {
                        return None;
                    }
                    kept_new = true;
                }
                Some(item)
            })
            .collect::<Vec<_>>()
            .join(";");
        format!("{}{}{}", &caps["open"], value, &caps["close"])
    });

    if rewritten == content {
        None
    } else {
        Some(rewritten.into_owned())
    }
}

/// Build-configuration files under `root`, skipping output and VCS dirs.
fn find_build_config_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && SCAN_SKIP_DIRS
                    .iter()
                    .any(|skip| e.file_name().to_string_lossy() == *skip))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| {
                    BUILD_CONFIG_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                })
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
