use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{
    config::{Config, Source},
    error::Error,
    event::Event,
};

/// The command line interface for pedal relay.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Produce synthetic pedal events instead of reading a device.
    #[arg(long)]
    pub simulate: bool,

    /// Revolutions per minute when simulating.
    #[arg(long, requires = "simulate")]
    pub rpm: Option<f64>,

    /// The serial device to read.
    #[arg(long, conflicts_with = "simulate")]
    pub device: Option<String>,

    /// The baud rate of the serial device.
    #[arg(long, conflicts_with = "simulate")]
    pub baud: Option<u32>,

    /// The address to listen on.
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// The port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// The level of logging to stdout.
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also log (at debug level) to daily rotated files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone, Debug)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON message (from server to client) of a pedal event.
    Event,
}

impl Cli {
    /// Apply command line overrides on top of a configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if self.simulate {
            let rpm = match (self.rpm, &config.source) {
                (Some(rpm), _) => rpm,
                (None, Source::Simulated { rpm }) => *rpm,
                (None, Source::Serial { .. }) => crate::source::simulated::DEFAULT_RPM,
            };
            config.source = Source::Simulated { rpm };
        }

        if self.device.is_some() || self.baud.is_some() {
            let (path, baud) = match config.source {
                Source::Serial { path, baud } => (path, baud),
                Source::Simulated { .. } => (
                    crate::config::DEFAULT_DEVICE.to_owned(),
                    crate::serial::DEFAULT_BAUD,
                ),
            };

            config.source = Source::Serial {
                path: self.device.clone().unwrap_or(path),
                baud: self.baud.unwrap_or(baud),
            };
        }

        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }

        if let Some(port) = self.port {
            config.port = port;
        }

        config
    }
}

/// Print what the example asks for.
pub fn handle_command(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Examples(example) => match example {
            Examples::Config => {
                println!("{}", Config::example().serialize_pretty()?);
            }
            Examples::Event => {
                println!("{}", Event::Pedal.to_json());
            }
        },
    }

    Ok(())
}
