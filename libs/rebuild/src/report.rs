//! Human-readable progress output.
//!
//! Every state transition of a run (skip, rebuild, error, convergence,
//! shutdown) is written as one line through a [`Reporter`]. Whether lines
//! are colored is decided once, when the reporter is built.

use std::io::IsTerminal;
use std::sync::Mutex;

use colored::Colorize;

/// Kind of progress line; selects the color when styling is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warning,
    Failure,
}

/// Sink for progress lines.
pub trait Reporter: Send + Sync {
    fn report(&self, tone: Tone, message: &str);

    fn info(&self, message: &str) {
        self.report(Tone::Info, message);
    }

    fn success(&self, message: &str) {
        self.report(Tone::Success, message);
    }

    fn warning(&self, message: &str) {
        self.report(Tone::Warning, message);
    }

    fn failure(&self, message: &str) {
        self.report(Tone::Failure, message);
    }
}

/// Writes progress lines to stdout.
#[derive(Debug, Clone, Copy)]
pub struct TerminalReporter {
    styled: bool,
}

impl TerminalReporter {
    pub fn new(styled: bool) -> Self {
        Self { styled }
    }

    /// Style output only when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        let styled = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self::new(styled)
    }

    fn render(&self, tone: Tone, message: &str) -> String {
        if !self.styled {
            return message.to_string();
        }
        let styled = match tone {
            Tone::Info => message.blue(),
            Tone::Success => message.green(),
            Tone::Warning => message.yellow(),
            Tone::Failure => message.red(),
        };
        styled.to_string()
    }
}

impl Reporter for TerminalReporter {
    fn report(&self, tone: Tone, message: &str) {
        println!("{}", self.render(tone, message));
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<(Tone, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, line)| line).collect()
    }

    pub fn entries(&self) -> Vec<(Tone, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// True if any line contains `fragment`.
    pub fn contains(&self, fragment: &str) -> bool {
        self.lines().iter().any(|line| line.contains(fragment))
    }

    /// Number of lines containing `fragment`.
    pub fn count(&self, fragment: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(fragment))
            .count()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, tone: Tone, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((tone, message.to_string()));
    }
}
