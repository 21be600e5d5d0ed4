use clap::Parser;
use color_eyre::Result;
use laser_emu::client;
use tracing::{error, info, Level};

/// Talks to the (emulated) instrument.
/// Sends one command, then prints everything the device sends back, unaltered.
#[derive(Parser, Debug)]
struct Args {
    /// Device path, for example the path the emulator printed.
    path: String,

    /// The command to send.
    #[arg(short, long, default_value = "DX")]
    command: String,

    /// Baud rate.
    #[arg(short, long, default_value_t = client::DEFAULT_BAUD)]
    baud: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Stdout carries the device output, keep logging quiet.
    laser_emu::logging::init(Level::WARN, None);

    let port = client::open(&args.path, args.baud)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        result = client::passthrough(port, &args.command, tokio::io::stdout()) => {
            if let Err(e) = result {
                error!(?e, "Device connection failed");
                return Err(e.into());
            }
        }
    }

    laser_emu::logging::shutdown();

    Ok(())
}
