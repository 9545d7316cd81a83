//! Connects to a Rialto control-plane server over a Unix-domain socket and prints lifecycle
//! events as they arrive. Exists to wire `rialto-core`, `rialto-transport-unix` and
//! `rialto-config` together end to end; not a general-purpose client CLI.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use rialto_config::{init_logging, ClientConfig};
use rialto_core::{ApplicationState, ClientListener, ControlFacade};
use rialto_transport_unix::UnixTransportChannel;

#[derive(Parser, Debug)]
#[command(about = "Connects to a Rialto control-plane server and prints lifecycle events")]
struct Cli {
    /// Path to the server's Unix-domain control socket.
    #[arg(long)]
    socket_path: String,

    #[arg(long, default_value = "info")]
    log_level: String,
}

struct PrintingListener;

impl ClientListener for PrintingListener {
    fn notify_application_state(&self, state: ApplicationState) {
        tracing::info!(?state, "application state changed");
    }

    fn ping(&self, id: u32) {
        tracing::debug!(id, "server ping");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = ClientConfig::new(cli.socket_path).load_from_env()?;
    tracing::info!(
        socket_path = ?config.socket_path,
        schema_version = %config.schema_version,
        "connecting to rialto server"
    );

    let channel = UnixTransportChannel::connect(&config.socket_path)?;
    let listener: Arc<dyn ClientListener> = Arc::new(PrintingListener);
    let facade = ControlFacade::new(channel, config.schema_version, listener)?;

    tracing::info!(state = ?facade.current_state(), "registered with control plane");

    std::thread::sleep(Duration::from_secs(3600));
    drop(facade);
    Ok(())
}
