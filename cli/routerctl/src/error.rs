//! Error handling and display for the CLI.

use colored::Colorize;
use fleet_rebuild::RebuildError;
use thiserror::Error;

/// Exit status after an operator abort, as for SIGINT.
const EXIT_ABORTED: i32 = 130;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let aborted = err
        .chain()
        .any(|e| matches!(e.downcast_ref::<RebuildError>(), Some(RebuildError::Aborted)));
    if aborted {
        EXIT_ABORTED
    } else {
        1
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let Some(cli_err) = err.chain().find_map(|e| e.downcast_ref::<CliError>()) else {
        return;
    };

    match cli_err {
        CliError::Api { status: 401, .. } => {
            eprintln!(
                "\n{}",
                "Hint: The auth token was rejected. Set auth_token or RCTL_AUTH_TOKEN.".yellow()
            );
        }
        CliError::Api { status: 403, .. } => {
            eprintln!(
                "\n{}",
                "Hint: The configured credentials may lack admin rights.".yellow()
            );
        }
        CliError::Network(_) => {
            eprintln!(
                "\n{}",
                "Hint: Check your network connection and the configured endpoints.".yellow()
            );
        }
        CliError::Config(_) => {
            eprintln!(
                "\n{}",
                "Hint: Pass --config or set the RCTL_* environment variables.".yellow()
            );
        }
        _ => {}
    }
}
