use clap::Parser;
use color_eyre::Result;
use pedal_relay::{client::ClientHandle, config::DEFAULT_PORT};
use tracing::{error, info, Level};

/// Listens to a relay server and logs the events it sends.
#[derive(Parser, Debug)]
struct Args {
    /// Server address.
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

async fn run(args: Args) -> Result<()> {
    let mut client = ClientHandle::new(&args.address, args.port).await?;

    let mut count = 0u64;
    loop {
        let event = client.next_event().await?;
        count += 1;
        info!(%event, %count, "Event");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    pedal_relay::logging::init(Level::INFO, None).await;

    let args = Args::parse();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        result = run(args) => {
            error!("Listener stopped");
            return result;
        }
    }

    Ok(())
}
