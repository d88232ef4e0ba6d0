//! Build command handler.

use colored::Colorize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::commands::BuildArgs;
use crate::config::{BuildConfig, BuildOverrides, ForgeConfig};
use crate::constants::get_repository_override;
use crate::error::ForgeResult;
use crate::negotiate::{Approval, Decision, NegotiationReport};
use crate::pack::PackProgress;
use crate::pipeline::{PipelineEvent, PipelineOutcome, PipelineSummary, run_pipeline};
use crate::platform::{PlatformTarget, parse_platform_list};
use crate::prompt::install_interrupt_handler;
use crate::publish::PublishProgress;
use crate::report::render_listing;
use crate::source::SourceSpec;
use crate::styles::{Spinner, format_size};
use crate::toolchain::ProbeResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Terminal rendering of pipeline progress.
struct BuildView {
    source_label: String,
    spinner: Mutex<Option<Spinner>>,
    in_flight: Mutex<Vec<PlatformTarget>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BuildView {
    fn new(source: &SourceSpec) -> Self {
        let source_label = match source {
            SourceSpec::Reuse(path) => format!("Checking {}", path.display()),
            SourceSpec::Clone { url, branch: None } => format!("Cloning {}", url),
            SourceSpec::Clone {
                url,
                branch: Some(branch),
            } => format!("Cloning {} ({})", url, branch),
        };

        Self {
            source_label,
            spinner: Mutex::new(None),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    fn handle(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Probed(probe) => self.probed(&probe),
            PipelineEvent::Acquiring => self.start_spinner(&self.source_label),
            PipelineEvent::SourceReady(root) => {
                self.stop_spinner();
                self.line(format!(
                    "  {} Source ready at {}",
                    "✓".bright_green(),
                    root.display().to_string().dimmed()
                ));
            }
            PipelineEvent::Negotiated(report) => self.negotiated(&report),
            PipelineEvent::Publish(progress) => self.publish(progress),
            PipelineEvent::Pack(progress) => self.pack(progress),
        }
    }

    fn probed(&self, probe: &ProbeResult) {
        match probe.highest {
            Some(version) => self.line(format!(
                "  {} .NET SDK {} detected",
                "✓".bright_green(),
                version.to_string().bold()
            )),
            None => self.line(format!(
                "  {} No .NET SDK detected, framework negotiation disabled",
                "!".bright_yellow()
            )),
        }
    }

    fn negotiated(&self, report: &NegotiationReport) {
        let plan = &report.plan;
        let Some(effective) = plan.effective else {
            self.line(format!(
                "  {} Target framework unknown, using project defaults",
                "!".bright_yellow()
            ));
            return;
        };

        let message = match (plan.decision, plan.declared) {
            (Decision::Fallback, Some(declared)) => format!(
                "Target framework {} → {}",
                declared.moniker().dimmed(),
                effective.moniker().bold()
            ),
            (Decision::Override, _) => {
                format!("Target framework {} (override)", effective.moniker().bold())
            }
            _ => format!("Target framework {}", effective.moniker().bold()),
        };
        self.line(format!("  {} {}", "✓".bright_green(), message));

        if !report.patched.is_empty() {
            self.line(format!("    Patched {} build file(s)", report.patched.len()));
        } else if plan.needs_patch() {
            self.line(format!(
                "  {} No build files declared {}, nothing patched",
                "!".bright_yellow(),
                plan.declared.map(|v| v.moniker()).unwrap_or_default()
            ));
        }
    }

    fn publish(&self, progress: PublishProgress) {
        match progress {
            PublishProgress::Started { target } => {
                let message = {
                    let mut in_flight = lock(&self.in_flight);
                    in_flight.push(target);
                    publishing_message(&in_flight)
                };
                self.start_spinner(&message);
            }
            PublishProgress::Finished { target } | PublishProgress::Failed { target } => {
                let failed = matches!(progress, PublishProgress::Failed { .. });
                let remaining = {
                    let mut in_flight = lock(&self.in_flight);
                    in_flight.retain(|t| *t != target);
                    (!in_flight.is_empty()).then(|| publishing_message(&in_flight))
                };

                let line = if failed {
                    format!("  {} Publish failed for {}", "✗".bright_red(), target)
                } else {
                    format!("  {} Published {}", "✓".bright_green(), target)
                };
                self.line(line);

                match remaining {
                    Some(message) => self.start_spinner(&message),
                    None => self.stop_spinner(),
                }
            }
        }
    }

    fn pack(&self, progress: PackProgress) {
        match progress {
            PackProgress::PlatformSkipped { target } => self.line(format!(
                "  {} No build output for {}, left out of the bundle",
                "!".bright_yellow(),
                target
            )),
            PackProgress::Started { total_files } => {
                self.start_spinner(&format!("Packing {} file(s)", total_files))
            }
            PackProgress::FileAdded { path, .. } => {
                if let Some(spinner) = lock(&self.spinner).as_ref() {
                    spinner.set_message(format!("Packing {}", path));
                }
            }
            PackProgress::Finished => self.stop_spinner(),
        }
    }

    /// Start the spinner, or retitle it if already running.
    fn start_spinner(&self, message: &str) {
        let mut spinner = lock(&self.spinner);
        if let Some(active) = spinner.as_ref() {
            active.set_message(message.to_string());
            return;
        }
        *spinner = Some(Spinner::start(message.to_string()));
    }

    fn stop_spinner(&self) {
        if let Some(spinner) = lock(&self.spinner).take() {
            spinner.finish();
        }
    }

    /// Print a status line without tearing an active spinner.
    fn line(&self, text: String) {
        match lock(&self.spinner).as_ref() {
            Some(spinner) => spinner.println(text),
            None => println!("{}", text),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Build and package an extension.
pub async fn build_extension(args: BuildArgs) -> ForgeResult<()> {
    let cwd = std::env::current_dir()?;
    let file = ForgeConfig::discover(args.config.as_deref(), &cwd)?;
    let platforms = args
        .platforms
        .as_deref()
        .map(parse_platform_list)
        .transpose()?;

    let approval = Approval::detect(args.yes);
    let overrides = BuildOverrides {
        output: args.output,
        platforms,
        skip_clone: args.skip_clone,
        source: args.source,
        framework_version: args.framework_version,
        yes: args.yes,
        mode: args.mode,
        repository: args.repo,
        branch: args.branch,
        project: args.project,
        binary: args.binary,
        assets: args.assets,
        parallel: args.parallel,
        clone_timeout: args.clone_timeout,
        build_timeout: args.build_timeout,
    };
    let config = BuildConfig::resolve(file, get_repository_override(), overrides, approval)?;

    println!(
        "  {} Building {} for {} ({} mode)",
        "→".bright_cyan(),
        config.binary.bold(),
        config
            .platforms
            .iter()
            .map(|p| p.runtime_identifier())
            .collect::<Vec<_>>()
            .join(", "),
        config.mode
    );

    install_interrupt_handler();
    let view = Arc::new(BuildView::new(&config.source));
    let sink = view.clone();
    let result = run_pipeline(
        &config,
        Some(Arc::new(move |e: PipelineEvent| sink.handle(e))),
    )
    .await;
    view.stop_spinner();

    match result? {
        PipelineOutcome::Cancelled => {
            println!("  {} Build cancelled", "✗".bright_red());
        }
        PipelineOutcome::Packaged(summary) => print_summary(&summary),
    }

    Ok(())
}

fn print_summary(summary: &PipelineSummary) {
    let pack = &summary.pack;
    println!(
        "  {} Created {} ({})",
        "✓".bright_green(),
        pack.output_path.display().to_string().bright_green(),
        format_size(pack.compressed_size)
    );
    println!(
        "    Files: {}, Compressed: {} (from {})",
        pack.file_count,
        format_size(pack.compressed_size),
        format_size(pack.total_size)
    );
    println!("    {}: {}", "SHA-256".dimmed(), pack.checksum);
    if !pack.ignored.is_empty() {
        println!(
            "    {}: {}",
            "Excluded".dimmed(),
            pack.ignored.join(", ").dimmed()
        );
    }
    println!();
    print!("{}", render_listing(&summary.listing));
}

fn publishing_message(in_flight: &[PlatformTarget]) -> String {
    format!(
        "Publishing {}",
        in_flight
            .iter()
            .map(|t| t.runtime_identifier())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
