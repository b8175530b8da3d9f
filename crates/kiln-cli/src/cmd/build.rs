//! Build command

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use kiln_core::{
    BuildBackend, CancellationToken, CmakeBackend, DryRunBackend, ExecuteOptions, Executor,
    PackageRequest, Reporter,
};

use super::Context;
use crate::ui::TerminalReporter;

/// Resolve `packages` and build the plan.
///
/// Ctrl-C stops scheduling new packages; builds already running finish.
pub async fn build(
    ctx: &Context,
    packages: &[PackageRequest],
    concurrency: Option<usize>,
    dry_run: bool,
) -> Result<ExitCode> {
    let plan = kiln_core::plan(&ctx.store, packages)?;

    let backend: Arc<dyn BuildBackend> = if dry_run {
        Arc::new(DryRunBackend)
    } else {
        Arc::new(
            CmakeBackend::new(ctx.config.cmake.clone())
                .context("cmake not found on PATH (use --dry-run to walk the plan without it)")?,
        )
    };

    let reporter = Arc::new(TerminalReporter::new(ctx.quiet));
    let cancel = CancellationToken::new();
    let options = ExecuteOptions {
        concurrency: concurrency.unwrap_or(ctx.config.concurrency).max(1),
        cancel: cancel.clone(),
    };

    let interrupt = tokio::spawn({
        let reporter = reporter.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                reporter.warning("Interrupted, waiting for running builds to finish");
                cancel.cancel();
            }
        }
    });

    let executor = Executor::new(plan, backend, reporter.clone());
    let report = executor.run(options).await;
    interrupt.abort();

    reporter.print_failures(&report);
    if report.cancelled {
        reporter.warning("Build cancelled");
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
