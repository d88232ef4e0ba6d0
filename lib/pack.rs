//! Extension bundle staging and packing.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;
use zip::DateTime as ZipDateTime;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::constants::{
    BUNDLE_SERVER_DIR, MCPB_EXT, MCPB_MANIFEST_FILE, OS_METADATA_IGNORES,
};
use crate::manifest::ExtensionManifest;
use crate::platform::PlatformTarget;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How built platforms map onto bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PackagingMode {
    /// One bundle with every built executable under a platform-qualified
    /// name; the manifest is staged as authored.
    #[value(name = "multi")]
    #[serde(rename = "multi")]
    MultiPlatform,

    /// One bundle for the first requested platform; the manifest is
    /// rewritten to launch its executable.
    #[default]
    #[value(name = "single")]
    #[serde(rename = "single")]
    SinglePrimary,
}

/// Progress event emitted during packing.
#[derive(Debug, Clone)]
pub enum PackProgress {
    /// A requested platform had no build output and was left out.
    PlatformSkipped { target: PlatformTarget },
    /// Starting to write the archive, with total file count.
    Started { total_files: usize },
    /// A file was added to the archive.
    FileAdded { path: String, current: usize },
    /// Packing completed.
    Finished,
}

/// Callback type for progress events.
pub type ProgressCallback = Arc<dyn Fn(PackProgress) + Send + Sync>;

/// Error types for pack operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// IO error during packing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Walkdir error.
    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Path strip error.
    #[error("path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Ignore pattern error.
    #[error("ignore pattern error: {0}")]
    Ignore(#[from] ignore::Error),

    /// Manifest template not found.
    #[error("manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// Manifest is JSON but not a usable manifest.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// No platform requested.
    #[error("no platforms requested")]
    NoPlatforms,

    /// The primary platform has no build output.
    #[error("build output for primary platform {platform} not found at {}", .path.display())]
    PrimaryMissing {
        platform: PlatformTarget,
        path: PathBuf,
    },

    /// No requested platform had build output.
    #[error("no platform executables found to bundle")]
    NothingToPack,
}

/// Static files copied into every bundle.
#[derive(Debug, Clone)]
pub struct BundleAssets {
    /// Manifest template.
    pub manifest: PathBuf,

    /// Optional icon; skipped when the file is absent.
    pub icon: Option<PathBuf>,

    /// Optional README; skipped when the file is absent.
    pub readme: Option<PathBuf>,
}

/// Options for packing.
#[derive(Clone)]
pub struct PackOptions {
    /// Packaging mode.
    pub mode: PackagingMode,

    /// Assembly name of the server executable (without `.exe`).
    pub binary: String,

    /// Directory receiving the archive.
    pub output_dir: PathBuf,

    /// Progress callback for reporting packing progress.
    pub on_progress: Option<ProgressCallback>,
}

/// A bundle directory ready for archiving.
#[derive(Debug)]
pub struct StagedBundle {
    /// Staging directory.
    pub dir: PathBuf,

    /// Manifest as staged.
    pub manifest: ExtensionManifest,

    /// Platforms whose executables were staged, in request order.
    pub staged: Vec<PlatformTarget>,

    /// Requested platforms left out of the bundle.
    pub skipped: Vec<PlatformTarget>,

    /// Primary platform in single-primary mode.
    pub primary: Option<PlatformTarget>,
}

/// One file written into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    /// Entry name, `/`-separated.
    pub path: String,

    /// Uncompressed size in bytes.
    pub size: u64,
}

/// Statistics of a written archive.
#[derive(Debug)]
pub struct ArchiveStats {
    /// Number of files written.
    pub file_count: usize,

    /// Total uncompressed size in bytes.
    pub total_size: u64,

    /// Files written, in archive order.
    pub entries: Vec<PackedEntry>,

    /// Files that were excluded as OS metadata.
    pub ignored_files: Vec<String>,
}

/// Result of packing operation.
#[derive(Debug)]
pub struct PackResult {
    /// Path to the created archive.
    pub output_path: PathBuf,

    /// Number of files included.
    pub file_count: usize,

    /// Total uncompressed size in bytes.
    pub total_size: u64,

    /// Compressed size in bytes.
    pub compressed_size: u64,

    /// SHA-256 checksum of the archive.
    pub checksum: String,

    /// Platforms bundled.
    pub staged: Vec<PlatformTarget>,

    /// Requested platforms left out.
    pub skipped: Vec<PlatformTarget>,

    /// Files written, in archive order.
    pub entries: Vec<PackedEntry>,

    /// Staged files excluded as OS metadata.
    pub ignored: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for PackOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackOptions")
            .field("mode", &self.mode)
            .field("binary", &self.binary)
            .field("output_dir", &self.output_dir)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl std::fmt::Display for PackagingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultiPlatform => write!(f, "multi"),
            Self::SinglePrimary => write!(f, "single"),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Stage assets and build outputs, then write the archive.
pub fn pack_extension(
    bundle_dir: &Path,
    assets: &BundleAssets,
    requested: &[PlatformTarget],
    publish_root: &Path,
    options: &PackOptions,
) -> Result<PackResult, PackError> {
    let staged = stage_bundle(bundle_dir, assets, requested, publish_root, options)?;

    let file_name = archive_file_name(&staged.manifest, options.mode, staged.primary);
    std::fs::create_dir_all(&options.output_dir)?;
    let output_path = options.output_dir.join(file_name);

    let stats = write_archive(&staged.dir, &output_path, options.on_progress.as_ref())?;

    let compressed_size = std::fs::metadata(&output_path)?.len();
    let checksum = compute_sha256(&std::fs::read(&output_path)?);

    Ok(PackResult {
        output_path,
        file_count: stats.file_count,
        total_size: stats.total_size,
        compressed_size,
        checksum,
        staged: staged.staged,
        skipped: staged.skipped,
        entries: stats.entries,
        ignored: stats.ignored_files,
    })
}

/// Populate an empty `bundle_dir` with the manifest, optional icon and
/// README, and the executables selected by the packaging mode.
pub fn stage_bundle(
    bundle_dir: &Path,
    assets: &BundleAssets,
    requested: &[PlatformTarget],
    publish_root: &Path,
    options: &PackOptions,
) -> Result<StagedBundle, PackError> {
    if requested.is_empty() {
        return Err(PackError::NoPlatforms);
    }

    let mut manifest = ExtensionManifest::load(&assets.manifest)?;

    if bundle_dir.exists() {
        std::fs::remove_dir_all(bundle_dir)?;
    }
    let server_dir = bundle_dir.join(BUNDLE_SERVER_DIR);
    std::fs::create_dir_all(&server_dir)?;

    // 1. Static files
    for asset in [&assets.icon, &assets.readme].into_iter().flatten() {
        if let Some(name) = asset.file_name()
            && asset.is_file()
        {
            std::fs::copy(asset, bundle_dir.join(name))?;
        } else {
            tracing::debug!("Optional asset {} not found, skipping", asset.display());
        }
    }

    // 2. Executables
    let mut staged = Vec::new();
    let mut skipped = Vec::new();
    let primary = match options.mode {
        PackagingMode::MultiPlatform => {
            for target in requested {
                let source = built_executable(publish_root, *target, &options.binary);
                if !source.is_file() {
                    tracing::warn!(
                        "No build output for {} at {}, leaving it out of the bundle",
                        target,
                        source.display()
                    );
                    emit(options, PackProgress::PlatformSkipped { target: *target });
                    skipped.push(*target);
                    continue;
                }

                let dest = server_dir.join(target.destination_name(&options.binary, true));
                copy_executable(&source, &dest, *target)?;
                staged.push(*target);
            }

            if staged.is_empty() {
                return Err(PackError::NothingToPack);
            }
            None
        }
        PackagingMode::SinglePrimary => {
            let target = requested[0];
            let source = built_executable(publish_root, target, &options.binary);
            if !source.is_file() {
                return Err(PackError::PrimaryMissing {
                    platform: target,
                    path: source,
                });
            }

            let file_name = target.destination_name(&options.binary, false);
            copy_executable(&source, &server_dir.join(&file_name), target)?;
            manifest.apply_platform(target, &file_name);
            staged.push(target);

            for other in &requested[1..] {
                tracing::debug!("{} is built but not merged into the {} bundle", other, target);
            }
            Some(target)
        }
    };

    // 3. Manifest
    let manifest_dest = bundle_dir.join(MCPB_MANIFEST_FILE);
    match options.mode {
        PackagingMode::MultiPlatform => {
            std::fs::copy(&assets.manifest, &manifest_dest)?;
        }
        PackagingMode::SinglePrimary => {
            std::fs::write(&manifest_dest, manifest.to_vec_pretty()?)?;
        }
    }

    Ok(StagedBundle {
        dir: bundle_dir.to_path_buf(),
        manifest,
        staged,
        skipped,
        primary,
    })
}

/// Archive file name: `<name>-<version>.mcpb`, with `-<rid>` for a primary platform.
///
/// Name and version come from the manifest and are reduced to a single path
/// component, so the archive always lands inside the output directory.
pub fn archive_file_name(
    manifest: &ExtensionManifest,
    mode: PackagingMode,
    primary: Option<PlatformTarget>,
) -> String {
    let name = file_name_component(manifest.name(), "extension");
    let version = file_name_component(manifest.version(), "0.0.0");
    match (mode, primary) {
        (PackagingMode::SinglePrimary, Some(target)) => {
            format!("{}-{}-{}.{}", name, version, target, MCPB_EXT)
        }
        _ => format!("{}-{}.{}", name, version, MCPB_EXT),
    }
}

/// Replace separators, parent references and reserved characters with `_`.
fn file_name_component(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.replace("..", "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Where `dotnet publish` leaves the executable for `target`.
pub fn built_executable(publish_root: &Path, target: PlatformTarget, binary: &str) -> PathBuf {
    publish_root
        .join(target.runtime_identifier())
        .join(target.executable_name(binary))
}

/// Copy an executable, marking non-Windows targets executable.
fn copy_executable(source: &Path, dest: &Path, target: PlatformTarget) -> Result<(), PackError> {
    std::fs::copy(source, dest)?;

    #[cfg(unix)]
    if !target.is_windows() {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = target;

    tracing::debug!("Staged {} -> {}", source.display(), dest.display());
    Ok(())
}

/// Write `bundle_dir` into a zip archive at `output_path`.
///
/// The archive is written to a sibling temporary file first; the previous
/// archive is removed only once the new one is complete. Entries are the
/// bundle's files relative to its root, OS metadata excluded.
pub fn write_archive(
    bundle_dir: &Path,
    output_path: &Path,
    on_progress: Option<&ProgressCallback>,
) -> Result<ArchiveStats, PackError> {
    let ignore_matcher = build_ignore_matcher(bundle_dir)?;

    // 1. Collect files first (for progress reporting)
    let mut entries: Vec<(PathBuf, String)> = Vec::new();
    let mut ignored_files = Vec::new();

    for entry in WalkDir::new(bundle_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.path() == bundle_dir
                || !e
                    .path()
                    .strip_prefix(bundle_dir)
                    .map(|rel| {
                        ignore_matcher
                            .matched_path_or_any_parents(rel, e.file_type().is_dir())
                            .is_ignore()
                    })
                    .unwrap_or(false)
        })
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        let relative_path = entry.path().strip_prefix(bundle_dir)?;
        entries.push((entry.path().to_path_buf(), zip_entry_name(relative_path)));
    }

    // Report what the metadata filter dropped
    for entry in WalkDir::new(bundle_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if let Ok(rel) = entry.path().strip_prefix(bundle_dir)
            && !rel.as_os_str().is_empty()
            && ignore_matcher
                .matched_path_or_any_parents(rel, entry.file_type().is_dir())
                .is_ignore()
            && entry.file_type().is_file()
        {
            ignored_files.push(zip_entry_name(rel));
        }
    }

    if let Some(cb) = on_progress {
        cb(PackProgress::Started {
            total_files: entries.len(),
        });
    }

    // 2. Write to a temporary file next to the destination
    let parent = output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".forge-")
        .suffix(".partial")
        .tempfile_in(parent)?;

    let mut zip = ZipWriter::new(temp.reopen()?);
    let zip_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut file_count = 0;
    let mut total_size = 0u64;
    let mut written = Vec::with_capacity(entries.len());

    for (path, name) in entries {
        let metadata = std::fs::metadata(&path)?;
        let mut opts = zip_options;

        if let Ok(modified) = metadata.modified()
            && let Some(dt) = system_time_to_zip_datetime(modified)
        {
            opts = opts.last_modified_time(dt);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            opts = opts.unix_permissions(metadata.permissions().mode());
        }

        let mut contents = Vec::new();
        File::open(&path)?.read_to_end(&mut contents)?;

        total_size += contents.len() as u64;
        file_count += 1;

        zip.start_file(&name, opts)?;
        zip.write_all(&contents)?;
        written.push(PackedEntry {
            path: name.clone(),
            size: contents.len() as u64,
        });

        if let Some(cb) = on_progress {
            cb(PackProgress::FileAdded {
                path: name,
                current: file_count,
            });
        }
    }

    let file = zip.finish()?;
    file.sync_all()?;
    drop(file);

    // 3. Replace the previous archive
    if output_path.exists() {
        tracing::debug!("Removing previous archive {}", output_path.display());
        std::fs::remove_file(output_path)?;
    }
    temp.persist(output_path).map_err(|e| PackError::Io(e.error))?;

    if let Some(cb) = on_progress {
        cb(PackProgress::Finished);
    }

    Ok(ArchiveStats {
        file_count,
        total_size,
        entries: written,
        ignored_files,
    })
}

/// Zip entry name for a relative path, always `/`-separated.
fn zip_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the gitignore-style matcher for OS metadata files.
fn build_ignore_matcher(dir: &Path) -> Result<Gitignore, PackError> {
    let mut builder = GitignoreBuilder::new(dir);
    for pattern in OS_METADATA_IGNORES {
        builder.add_line(None, pattern)?;
    }
    Ok(builder.build()?)
}

fn emit(options: &PackOptions, event: PackProgress) {
    if let Some(ref cb) = options.on_progress {
        cb(event);
    }
}

/// Convert SystemTime to zip DateTime, preserving file modification times.
fn system_time_to_zip_datetime(time: std::time::SystemTime) -> Option<ZipDateTime> {
    let secs = time.duration_since(std::time::UNIX_EPOCH).ok()?.as_secs();

    let days = (secs / 86400) as i64;
    let time_of_day = secs % 86400;

    let hours = (time_of_day / 3600) as u8;
    let minutes = ((time_of_day % 3600) / 60) as u8;
    let seconds = (time_of_day % 60) as u8;

    let (year, month, day) = civil_from_days(days);

    // ZIP format only supports years 1980-2107
    if !(1980..=2107).contains(&year) {
        return None;
    }

    ZipDateTime::from_date_and_time(year as u16, month as u8, day as u8, hours, minutes, seconds)
        .ok()
}

/// Convert days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days_since_epoch: i64) -> (i64, u32, u32) {
    let z = days_since_epoch + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Compute SHA-256 checksum of data and return as hex string.
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
