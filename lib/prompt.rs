//! Interactive CLI prompts.
//!
//! Uses cliclack with a custom theme (emerald green accents).

use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use cliclack::{Theme, ThemeState, confirm, outro, outro_cancel, set_theme};
use console::{Style, Term};
use tokio::sync::Notify;

use crate::error::{ForgeError, ForgeResult};
use crate::toolchain::ToolchainVersion;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

static CTRLC_HANDLER_SET: AtomicBool = AtomicBool::new(false);

static INTERRUPT_SEEN: AtomicBool = AtomicBool::new(false);

static INTERRUPT: LazyLock<Notify> = LazyLock::new(Notify::new);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Prompt theme using emerald green as the accent color.
pub struct ForgeTheme;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Theme for ForgeTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().color256(42),
            ThemeState::Error(_) => Style::new().red(),
            _ => Style::new().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active | ThemeState::Submit => Style::new().color256(42),
            ThemeState::Error(_) => Style::new().red(),
            _ => Style::new().dim(),
        }
    }

    fn input_style(&self, _state: &ThemeState) -> Style {
        Style::new()
    }

    fn placeholder_style(&self, _state: &ThemeState) -> Style {
        Style::new().dim()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Initialize the prompt theme and set up the Ctrl+C handler.
pub fn init_theme() {
    set_theme(ForgeTheme);
    install_interrupt_handler();
}

/// Route Ctrl+C to [`interrupted`] instead of terminating the process.
///
/// The first press restores the cursor and wakes whoever awaits
/// [`interrupted`], so the run unwinds and releases its resources. A second
/// press exits immediately.
pub fn install_interrupt_handler() {
    if CTRLC_HANDLER_SET.swap(true, Ordering::SeqCst) {
        return;
    }

    let result = ctrlc::set_handler(|| {
        let _ = Term::stderr().show_cursor();
        if INTERRUPT_SEEN.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        INTERRUPT.notify_one();
    });
    if let Err(e) = result {
        tracing::warn!("Could not install Ctrl+C handler: {}", e);
    }
}

/// Resolves once Ctrl+C was pressed. Never resolves without
/// [`install_interrupt_handler`].
pub async fn interrupted() {
    INTERRUPT.notified().await;
}

/// Ask whether to build against `fallback` instead of the declared version.
///
/// ESC counts as declining.
pub fn confirm_fallback(
    declared: ToolchainVersion,
    fallback: ToolchainVersion,
) -> ForgeResult<bool> {
    init_theme();
    println!();

    let answer = confirm(format!(
        "Project targets {} but the installed SDK is older. Build against {} instead?",
        declared.moniker(),
        fallback.moniker()
    ))
    .initial_value(true)
    .interact();

    let accepted = match answer {
        Ok(accepted) => accepted,
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => false,
        Err(e) => return Err(ForgeError::Io(e)),
    };

    if accepted {
        outro(format!("Building against {}", fallback.moniker()))?;
    } else {
        outro_cancel("Cancelled.")?;
    }

    Ok(accepted)
}
