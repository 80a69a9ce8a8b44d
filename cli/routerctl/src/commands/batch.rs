//! Batch rebuild command.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use fleet_rebuild::config::DEFAULT_BATCH_SIZE;
use fleet_rebuild::{
    BatchRebuilder, BatchSize, Collaborators, InterruptHandle, InterruptOutcome, Interrupts,
    RebuildConfig, RunSummary, TerminalReporter,
};
use serde::Serialize;
use tabled::Tabled;
use tracing::{debug, warn};

use crate::error::CliError;
use crate::output::print_single;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct BatchRebuildArgs {
    /// Routers rebuilt per batch; also caps the number of workers.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_batch_size)]
    batch: usize,
}

fn parse_batch_size(value: &str) -> Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    BatchSize::new(size)
        .map(BatchSize::get)
        .map_err(|e| e.to_string())
}

/// Run summary row for output.
#[derive(Debug, Serialize, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Routers")]
    total: usize,

    #[tabled(rename = "Batches")]
    batches: usize,

    #[tabled(rename = "Rebuilt")]
    rebuilt: usize,

    #[tabled(rename = "Converged")]
    converged: usize,

    #[tabled(rename = "Up to date")]
    up_to_date: usize,

    #[tabled(rename = "No instance")]
    missing: usize,

    #[tabled(rename = "Skipped waits")]
    interrupted: usize,
}

impl From<RunSummary> for SummaryRow {
    fn from(summary: RunSummary) -> Self {
        Self {
            total: summary.total,
            batches: summary.batches,
            rebuilt: summary.rebuilt,
            converged: summary.converged,
            up_to_date: summary.up_to_date,
            missing: summary.missing,
            interrupted: summary.interrupted,
        }
    }
}

pub async fn run(ctx: CommandContext, args: BatchRebuildArgs) -> Result<()> {
    let target_image = ctx.config.router_image_uuid.clone().ok_or_else(|| {
        CliError::Config(
            "No target router image configured (router_image_uuid / RCTL_ROUTER_IMAGE_UUID)"
                .to_string(),
        )
    })?;
    let config = RebuildConfig::new(BatchSize::new(args.batch)?, target_image)
        .with_intervals(ctx.config.intervals.to_poll_intervals());

    let control_plane = ctx.control_plane()?;
    let collaborators = Collaborators::new(control_plane, ctx.compute()?);
    let rebuilder = BatchRebuilder::new(
        collaborators,
        ctx.message_sender()?,
        Arc::new(TerminalReporter::detect()),
        config,
    );

    let (handle, interrupts) = Interrupts::channel();
    let forwarder = tokio::spawn(forward_interrupts(handle));
    let result = rebuilder.run(interrupts).await;
    forwarder.abort();

    let summary = result?;
    print_single(&SummaryRow::from(summary), ctx.format);
    Ok(())
}

/// Forward every Ctrl-C to the run: it skips the current batch wait, or
/// aborts the run outside one.
async fn forward_interrupts(handle: InterruptHandle) {
    loop {
        match tokio::signal::ctrl_c().await {
            Ok(()) => match handle.interrupt() {
                InterruptOutcome::SkipWait => debug!("Ctrl-C received, skipping batch wait"),
                InterruptOutcome::Abort => warn!("Ctrl-C received, aborting run"),
            },
            Err(e) => {
                warn!(error = %e, "Unable to listen for Ctrl-C");
                return;
            }
        }
    }
}
