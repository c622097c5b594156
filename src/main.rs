use clap::Parser;
use color_eyre::Result;
use pedal_relay::{cli, config::Config, logging, server};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};

#[cfg(unix)]
async fn hangup() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::hangup()) {
        Ok(mut hangup) => {
            hangup.recv().await;
        }
        Err(e) => {
            warn!(%e, "Cannot listen for hangups");
            futures::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn hangup() {
    futures::future::pending::<()>().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let mut cli = cli::Cli::parse();

    if let Some(command) = cli.command.take() {
        cli::handle_command(command)?;

        return Ok(());
    }

    logging::init(
        cli.log_level,
        cli.log_dir.clone().map(|dir| (Level::DEBUG, dir)),
    )
    .await;

    let config = if let Some(config_path) = &cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };
    let config = cli.apply(config);

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(server::run_from_config(config, shutdown.clone()));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting");
            shutdown.cancel();
            server.await?
        }
        _ = hangup() => {
            info!("Told to hang up, quitting");
            shutdown.cancel();
            server.await?
        }
        result = &mut server => {
            error!("Server returned");
            result?
        }
    };

    if let Err(e) = &result {
        error!(%e, "Server stopped");
    }

    Ok(result?)
}
