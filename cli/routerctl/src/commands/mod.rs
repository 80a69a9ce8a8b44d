//! CLI commands.

mod batch;
mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::{HttpCompute, HttpControlPlane};
use crate::config::Config;
use crate::message::MessageSender;
use crate::output::OutputFormat;

/// routerctl - maintain a fleet of virtual routers.
#[derive(Debug, Parser)]
#[command(name = "rctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Path to a JSON config file.
    #[arg(long, global = true, env = "RCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage routers.
    Router(router::RouterCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn log_json(&self) -> bool {
        self.log_json
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        if let Commands::Version = self.command {
            println!("rctl {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let ctx = CommandContext {
            config: Config::load(self.config.as_deref())?,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Router(cmd) => cmd.run(ctx).await,
            Commands::Version => Ok(()),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn control_plane(&self) -> Result<Arc<HttpControlPlane>> {
        Ok(Arc::new(HttpControlPlane::new(&self.config)?))
    }

    pub fn compute(&self) -> Result<Arc<HttpCompute>> {
        Ok(Arc::new(HttpCompute::new(&self.config)?))
    }

    pub fn message_sender(&self) -> Result<Arc<MessageSender>> {
        Ok(Arc::new(MessageSender::new(
            &self.config,
            self.control_plane()?,
        )?))
    }
}
