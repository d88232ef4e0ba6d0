//! End-to-end build pipeline.
//!
//! Stages run strictly in order and each must succeed before the next:
//! probe, acquire, negotiate, publish, pack, verify. The work directory lives
//! for the duration of one run and is removed on every exit path.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BuildConfig;
use crate::constants::BUILD_LOG_TAIL_LINES;
use crate::error::{ForgeError, ForgeResult};
use crate::negotiate::{Negotiated, NegotiationReport, negotiate};
use crate::pack::{PackOptions, PackProgress, PackResult, pack_extension};
use crate::process::tail_lines;
use crate::prompt::interrupted;
use crate::publish::{BuildOutput, PublishOptions, PublishProgress, publish_all};
use crate::report::{ArchiveListing, list_archive, verify_listing};
use crate::source::{acquire_source, locate_project};
use crate::toolchain::{ProbeResult, probe_toolchain};
use crate::workdir::WorkDir;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Progress event emitted by the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Installed SDKs were probed.
    Probed(ProbeResult),
    /// Source acquisition is starting.
    Acquiring,
    /// The source tree is ready at this root.
    SourceReady(PathBuf),
    /// Framework negotiation finished.
    Negotiated(NegotiationReport),
    /// Platform publish progress.
    Publish(PublishProgress),
    /// Archive packing progress.
    Pack(PackProgress),
}

/// Callback type for pipeline events.
pub type PipelineCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// What a successful run produced.
#[derive(Debug)]
pub struct PipelineSummary {
    /// Installed SDKs seen at the start.
    pub probe: ProbeResult,

    /// Framework negotiation result.
    pub negotiation: NegotiationReport,

    /// Per-platform publish outputs.
    pub builds: Vec<BuildOutput>,

    /// Written archive.
    pub pack: PackResult,

    /// The archive as read back.
    pub listing: ArchiveListing,
}

/// How a run ended without error.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// An archive was written and verified.
    Packaged(Box<PipelineSummary>),
    /// The operator declined the framework fallback.
    Cancelled,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Run every stage for `config`.
///
/// Ctrl+C (once the interrupt handler is installed) abandons the run: the
/// work directory is removed and running children are killed before
/// [`ForgeError::Interrupted`] is returned.
pub async fn run_pipeline(
    config: &BuildConfig,
    on_event: Option<PipelineCallback>,
) -> ForgeResult<PipelineOutcome> {
    run_until_interrupted(run_stages(config, on_event), interrupted()).await
}

/// Drive `stages` until it finishes or `interrupt` fires, dropping `stages`
/// on interrupt.
async fn run_until_interrupted<F, I>(stages: F, interrupt: I) -> ForgeResult<PipelineOutcome>
where
    F: Future<Output = ForgeResult<PipelineOutcome>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        outcome = stages => outcome,
        () = interrupt => {
            tracing::warn!("Interrupted, cleaning up");
            Err(ForgeError::Interrupted)
        }
    }
}

async fn run_stages(
    config: &BuildConfig,
    on_event: Option<PipelineCallback>,
) -> ForgeResult<PipelineOutcome> {
    let emit = |event: PipelineEvent| {
        if let Some(ref cb) = on_event {
            cb(event);
        }
    };

    // 1. Toolchain
    let probe = probe_toolchain(&config.dotnet).await;
    if probe.highest.is_none() {
        tracing::warn!("Could not detect installed .NET SDKs; framework negotiation is limited");
    }
    emit(PipelineEvent::Probed(probe.clone()));

    // 2. Source
    let work = WorkDir::new()?;
    emit(PipelineEvent::Acquiring);
    let root = acquire_source(&config.source, &work, config.clone_timeout).await?;
    let project = locate_project(&root, &config.project)?;
    emit(PipelineEvent::SourceReady(root.clone()));

    // 3. Negotiation
    let negotiation = match negotiate(&root, &project, probe.highest, &config.negotiate)? {
        Negotiated::Proceed(report) => report,
        Negotiated::Cancelled => {
            tracing::info!("Framework fallback declined, stopping");
            return Ok(PipelineOutcome::Cancelled);
        }
    };
    if negotiation.plan.needs_patch() && negotiation.patched.is_empty() {
        tracing::warn!(
            "No build-configuration files matched the declared framework; nothing was patched"
        );
    }
    emit(PipelineEvent::Negotiated(negotiation.clone()));

    // 4. Publish
    let publish_root = work.publish_dir();
    let publish_options = PublishOptions {
        dotnet: config.dotnet.clone(),
        framework: negotiation.plan.effective,
        timeout: config.build_timeout,
        parallel: config.parallel,
        on_progress: on_event.clone().map(|cb| {
            Arc::new(move |p: PublishProgress| cb(PipelineEvent::Publish(p)))
                as crate::publish::PublishCallback
        }),
        ..Default::default()
    };
    let builds = publish_all(&project, &config.platforms, &publish_root, &publish_options).await?;
    for build in &builds {
        tracing::debug!(
            "{} publish output:\n{}",
            build.target,
            tail_lines(&build.log, BUILD_LOG_TAIL_LINES)
        );
    }

    // 5. Pack
    let pack_options = PackOptions {
        mode: config.mode,
        binary: config.binary.clone(),
        output_dir: config.output_dir.clone(),
        on_progress: on_event.clone().map(|cb| {
            Arc::new(move |p: PackProgress| cb(PipelineEvent::Pack(p)))
                as crate::pack::ProgressCallback
        }),
    };
    let pack = pack_extension(
        &work.bundle_dir(),
        &config.assets,
        &config.platforms,
        &publish_root,
        &pack_options,
    )?;

    // 6. Verify
    let listing = list_archive(&pack.output_path)?;
    verify_listing(&listing, &pack.entries)?;

    tracing::info!("Packaged {}", pack.output_path.display());
    Ok(PipelineOutcome::Packaged(Box::new(PipelineSummary {
        probe,
        negotiation,
        builds,
        pack,
        listing,
    })))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
