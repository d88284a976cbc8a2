//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, MatchCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Release pipeline runner for version tag pushes
#[derive(Debug, Parser, Clone)]
#[command(name = "tagrelease")]
#[command(author = "tagrelease contributors")]
#[command(version)]
#[command(about = "Runs checkout, toolchain, test and publish for version tag pushes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print step output as it is produced
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Dispatch a push event and run the release job if it triggers
    Run(RunCommand),

    /// Check whether a reference would trigger a release
    Match(MatchCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "tagrelease",
            "run",
            "--ref",
            "refs/tags/v1.2.3",
            "--repository",
            "https://example.com/relay.git",
            "--env",
            "CARGO_TERM_COLOR=always",
            "--stream",
        ])
        .unwrap();

        assert!(cli.stream);
        match cli.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.reference, "refs/tags/v1.2.3");
                assert_eq!(cmd.env, vec![("CARGO_TERM_COLOR".to_string(), "always".to_string())]);
                assert!(cmd.file.is_none());
                assert!(!cmd.no_history);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_repository() {
        assert!(Cli::try_parse_from(["tagrelease", "run", "--ref", "v1.2.3"]).is_err());
    }

    #[test]
    fn test_global_verbose_reaches_history() {
        let cli = Cli::try_parse_from(["tagrelease", "history", "-v", "--details"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::History(ref cmd) if cmd.details));
    }

    #[test]
    fn test_parse_match() {
        let cli = Cli::try_parse_from(["tagrelease", "match", "--ref", "v1.2.3", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Match(ref cmd) if cmd.json));
    }
}
