//! Router commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use fleet_rebuild::ControlPlane;
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::message::RouterCommand as MessageCommand;
use crate::output::{print_output, print_success};

use super::batch::BatchRebuildArgs;
use super::CommandContext;

/// Router commands.
#[derive(Debug, Args)]
pub struct RouterCommand {
    #[command(subcommand)]
    command: RouterSubcommand,
}

#[derive(Debug, Subcommand)]
enum RouterSubcommand {
    /// List routers known to the control plane.
    List,

    /// Rebuild every router in batches, waiting for each batch to come back.
    BatchRebuild(BatchRebuildArgs),

    /// Force-rebuild a single router.
    Rebuild(RebuildArgs),

    /// Force-update a single router.
    Update(RouterIdArgs),

    /// Put a single router into debug mode.
    Debug(RouterIdArgs),

    /// Return a single router to management.
    Manage(RouterIdArgs),

    /// SSH into a router over the management network.
    Ssh(SshArgs),
}

#[derive(Debug, Args)]
struct RouterIdArgs {
    /// Router ID.
    router_id: String,
}

#[derive(Debug, Args)]
struct RebuildArgs {
    /// Router ID.
    router_id: String,

    /// Rebuild onto this image instead of the orchestrator's default.
    #[arg(long)]
    router_image_uuid: Option<String>,
}

#[derive(Debug, Args)]
struct SshArgs {
    /// Router ID.
    router_id: String,

    /// Extra arguments passed to ssh.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    remainder: Vec<String>,
}

impl RouterCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            RouterSubcommand::List => list_routers(ctx).await,
            RouterSubcommand::BatchRebuild(args) => super::batch::run(ctx, args).await,
            RouterSubcommand::Rebuild(args) => rebuild_router(ctx, args).await,
            RouterSubcommand::Update(args) => {
                send_command(ctx, MessageCommand::Update, args).await
            }
            RouterSubcommand::Debug(args) => {
                send_command(ctx, MessageCommand::Debug, args).await
            }
            RouterSubcommand::Manage(args) => {
                send_command(ctx, MessageCommand::Manage, args).await
            }
            RouterSubcommand::Ssh(args) => ssh_router(ctx, args).await,
        }
    }
}

/// Router row for table output.
#[derive(Debug, Clone, Serialize, Tabled)]
struct RouterRow {
    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "Tenant")]
    tenant_id: String,
}

async fn list_routers(ctx: CommandContext) -> Result<()> {
    let control_plane = ctx.control_plane()?;
    let rows: Vec<RouterRow> = control_plane
        .list_routers()
        .await?
        .into_iter()
        .map(|router| RouterRow {
            id: router.id,
            name: router.name,
            status: router.status.to_string(),
            tenant_id: router.tenant_id.unwrap_or_default(),
        })
        .collect();

    print_output(&rows, ctx.format);
    Ok(())
}

async fn rebuild_router(ctx: CommandContext, args: RebuildArgs) -> Result<()> {
    if let Some(image) = args.router_image_uuid.as_deref() {
        ctx.compute()?.ensure_image(image).await?;
    }

    let message = ctx
        .message_sender()?
        .send(MessageCommand::Rebuild, &args.router_id, args.router_image_uuid)
        .await?;

    print_success(&format!(
        "Sent {} for router {} (tenant {})",
        message.command, message.router_id, message.tenant_id
    ));
    Ok(())
}

async fn send_command(
    ctx: CommandContext,
    command: MessageCommand,
    args: RouterIdArgs,
) -> Result<()> {
    let message = ctx
        .message_sender()?
        .send(command, &args.router_id, None)
        .await?;

    print_success(&format!(
        "Sent {} for router {} (tenant {})",
        message.command, message.router_id, message.tenant_id
    ));
    Ok(())
}

async fn ssh_router(ctx: CommandContext, args: SshArgs) -> Result<()> {
    let router_id = args.router_id.to_lowercase();
    let router = ctx.control_plane()?.show_router(&router_id).await?;

    let address = router.management_address().ok_or_else(|| {
        CliError::NotFound(format!("Router '{}' has no management address", router_id))
    })?;

    let status = tokio::process::Command::new("ssh")
        .arg(format!("root@{}", address))
        .args(&args.remainder)
        .status()
        .await?;

    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
