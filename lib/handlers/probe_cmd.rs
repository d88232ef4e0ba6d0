//! Probe and platforms command handlers.

use colored::Colorize;

use crate::constants::DOTNET_PROGRAM;
use crate::platform::PlatformTarget;
use crate::toolchain::probe_toolchain;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Print installed .NET SDKs.
pub async fn probe_sdks() {
    let probe = probe_toolchain(DOTNET_PROGRAM).await;

    let Some(highest) = probe.highest else {
        println!(
            "  {} No .NET SDK found (is {} on PATH?)",
            "!".bright_yellow(),
            DOTNET_PROGRAM.bold()
        );
        return;
    };

    println!(
        "  {} Highest SDK: {} ({})",
        "✓".bright_green(),
        highest.to_string().bold(),
        highest.moniker().dimmed()
    );
    for sdk in probe.sdks.iter().rev() {
        println!("    {}", sdk);
    }
}

/// Print supported platform targets.
pub fn list_platforms() {
    let header = format!(
        "{:<12} {:<8} {:<18} {}",
        "RID", "TAG", "EXECUTABLE", "BUNDLED AS (multi)"
    );
    println!("  {}", header.bold());
    for target in PlatformTarget::ALL {
        println!(
            "  {:<12} {:<8} {:<18} {}",
            target.runtime_identifier(),
            target.compatibility_tag(),
            target.executable_name("<binary>"),
            format!("server/{}", target.destination_name("<binary>", true)).dimmed()
        );
    }
}
