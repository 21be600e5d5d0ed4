use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{config::Config, error::Error};

/// The command line interface for the laser emulator.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// The most verbose level printed to stdout.
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also log (at debug level) to a daily rolling file in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,
}

/// Run a subcommand instead of the emulator.
pub fn handle_command(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Examples(example) => match example {
            Examples::Config => {
                let c = Config::example();
                println!("{}", c.serialize_pretty()?);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["laser-emu"]).unwrap();

        assert!(cli.config.is_none());
        assert_eq!(cli.log_level, Level::INFO);
        assert!(cli.log_dir.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_and_logging() {
        let cli = Cli::try_parse_from([
            "laser-emu",
            "emu.ron",
            "--log-level",
            "trace",
            "--log-dir",
            "/tmp/logs",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("emu.ron")));
        assert_eq!(cli.log_level, Level::TRACE);
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn examples_config() {
        let cli = Cli::try_parse_from(["laser-emu", "examples", "config"]).unwrap();

        assert!(matches!(
            cli.command,
            Some(Commands::Examples(Examples::Config))
        ));
    }
}
