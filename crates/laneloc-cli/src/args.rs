//! Command-line interface.
//!
//! ```text
//! laneloc [run] [--config PATH] [--port N]
//! laneloc replay FILE [--config PATH]
//! laneloc schema
//! laneloc init [--config PATH] [--force]
//! ```
//!
//! Without a subcommand `laneloc` runs the filter, so the `run` options are
//! also accepted at the top level.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "laneloc", version, about = "Histogram lane localisation")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// The command to execute, `run` when none was given.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(self.run))
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Configuration file (default: ~/.laneloc/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// WebSocket bridge port, overriding the configuration
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the bus, filter node and WebSocket bridge
    Run(RunArgs),

    /// Run the filter over a JSON-lines recording
    Replay {
        /// Recording with one inbound payload per line
        file: PathBuf,

        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the filter configuration JSON Schema
    Schema,

    /// Write the default configuration
    Init {
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(list: &[&str]) -> Result<Command, clap::Error> {
        let argv = std::iter::once("laneloc").chain(list.iter().copied());
        Cli::try_parse_from(argv).map(Cli::into_command)
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_run() {
        assert_eq!(parse(&[]).unwrap(), Command::Run(RunArgs::default()));
    }

    #[test]
    fn run_flags_without_subcommand() {
        assert_eq!(
            parse(&["--port", "9191", "--config", "/tmp/l.toml"]).unwrap(),
            Command::Run(RunArgs {
                config: Some(PathBuf::from("/tmp/l.toml")),
                port: Some(9191),
            })
        );
    }

    #[test]
    fn explicit_run_subcommand() {
        assert_eq!(
            parse(&["run", "-p", "7000"]).unwrap(),
            Command::Run(RunArgs {
                config: None,
                port: Some(7000),
            })
        );
    }

    #[test]
    fn replay_needs_exactly_one_file() {
        assert_eq!(
            parse(&["replay", "drive.jsonl"]).unwrap(),
            Command::Replay {
                file: PathBuf::from("drive.jsonl"),
                config: None
            }
        );
        assert!(parse(&["replay"]).is_err());
        assert!(parse(&["replay", "a", "b"]).is_err());
    }

    #[test]
    fn init_accepts_force() {
        assert_eq!(
            parse(&["init", "--force"]).unwrap(),
            Command::Init {
                config: None,
                force: true
            }
        );
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse(&["run", "--port", "seventy"]).is_err());
        assert!(parse(&["run", "--config"]).is_err());
        assert!(parse(&["schema", "--port", "1"]).is_err());
        assert!(parse(&["fly"]).is_err());
        assert!(parse(&["run", "--verbose"]).is_err());
        assert!(parse(&["--port", "1", "replay", "drive.jsonl"]).is_err());
    }

    #[test]
    fn help_is_reported_as_display_help() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
