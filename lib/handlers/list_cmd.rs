//! List command handler.

use colored::Colorize;
use std::path::PathBuf;

use crate::error::ForgeResult;
use crate::pack::compute_sha256;
use crate::report::{list_archive, render_listing};
use crate::styles::format_size;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Print the contents of an existing bundle.
pub fn list_bundle(archive: PathBuf) -> ForgeResult<()> {
    let listing = list_archive(&archive)?;
    let bytes = std::fs::read(&archive)?;

    println!(
        "  {} {} ({})",
        "✓".bright_green(),
        archive.display().to_string().bright_green(),
        format_size(bytes.len() as u64)
    );
    println!("    {}: {}", "SHA-256".dimmed(), compute_sha256(&bytes));
    println!();
    print!("{}", render_listing(&listing));

    Ok(())
}
