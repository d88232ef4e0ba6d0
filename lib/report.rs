//! Archive verification listing.

use colored::Colorize;
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::error::{ForgeError, ForgeResult};
use crate::pack::PackedEntry;
use crate::styles::format_size;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One file entry of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive.
    pub path: String,

    /// Uncompressed size in bytes.
    pub size: u64,

    /// Compressed size in bytes.
    pub compressed_size: u64,
}

/// Contents of a reopened archive.
#[derive(Debug, Clone)]
pub struct ArchiveListing {
    /// Archive that was read.
    pub path: PathBuf,

    /// File entries in archive order.
    pub entries: Vec<ArchiveEntry>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArchiveListing {
    /// Sum of uncompressed sizes.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Sum of compressed sizes.
    pub fn total_compressed(&self) -> u64 {
        self.entries.iter().map(|e| e.compressed_size).sum()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reopen an archive read-only and list its file entries.
pub fn list_archive(path: &Path) -> ForgeResult<ArchiveListing> {
    let file = File::open(path).map_err(|e| verification_error(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| verification_error(path, e))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| verification_error(path, e))?;
        if entry.is_dir() {
            continue;
        }
        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
        });
    }

    tracing::debug!("Read {} entries from {}", entries.len(), path.display());
    Ok(ArchiveListing {
        path: path.to_path_buf(),
        entries,
    })
}

/// Check that a reopened archive holds exactly the files that were written,
/// by name and uncompressed size, in the same order.
pub fn verify_listing(listing: &ArchiveListing, written: &[PackedEntry]) -> ForgeResult<()> {
    if listing.entries.len() != written.len() {
        return Err(verification_error(
            &listing.path,
            format!(
                "holds {} entries, expected {}",
                listing.entries.len(),
                written.len()
            ),
        ));
    }

    for (found, expected) in listing.entries.iter().zip(written) {
        if found.path != expected.path {
            return Err(verification_error(
                &listing.path,
                format!("found entry {}, expected {}", found.path, expected.path),
            ));
        }
        if found.size != expected.size {
            return Err(verification_error(
                &listing.path,
                format!(
                    "{} is {} bytes, expected {}",
                    found.path, found.size, expected.size
                ),
            ));
        }
    }

    Ok(())
}

/// Render a listing as aligned text lines.
pub fn render_listing(listing: &ArchiveListing) -> String {
    let width = listing
        .entries
        .iter()
        .map(|e| e.path.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for entry in &listing.entries {
        out.push_str(&format!(
            "    {:<width$}  {:>10}  {}\n",
            entry.path,
            format_size(entry.size),
            format!("{:>10}", format_size(entry.compressed_size)).dimmed(),
            width = width
        ));
    }

    out.push_str(&format!(
        "    {} {} file(s), {} ({} compressed)\n",
        "Total:".bold(),
        listing.entries.len(),
        format_size(listing.total_size()),
        format_size(listing.total_compressed())
    ));
    out
}

fn verification_error(path: &Path, err: impl std::fmt::Display) -> ForgeError {
    ForgeError::PackagingVerification(format!("{}: {}", path.display(), err))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
