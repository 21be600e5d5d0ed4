use clap::Parser;
use color_eyre::Result;
use laser_emu::{cli, config::Config, emulator, logging};
use tracing::{debug, error, Level};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command)?;

        return Ok(());
    }

    logging::init(cli.log_level, cli.log_dir.map(|dir| (Level::DEBUG, dir)));

    let config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let result = emulator::run(&config);

    if let Err(e) = &result {
        error!(?e, "Emulator stopped");
    }

    logging::shutdown();

    Ok(result?)
}
