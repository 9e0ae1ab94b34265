use std::time::Duration;

use clap::Parser;
use log::{error, info};
use server::{RelayConfig, SignalingServer};
use shared::DEFAULT_SIGNALING_PORT;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_SIGNALING_PORT)]
    port: u16,

    #[arg(long, default_value_t = 30)]
    ping_interval_secs: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = format!("{}:{}", args.host, args.port);
    let config = RelayConfig {
        ping_interval: Duration::from_secs(args.ping_interval_secs.max(1)),
        ..RelayConfig::default()
    };

    let server = match SignalingServer::bind(&addr, config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Error binding: {}", e);
            return;
        }
    };

    let shutdown = CancellationToken::new();
    let shutdown_for_handler = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || shutdown_for_handler.cancel()) {
        error!("Error installing Ctrl-C handler: {}", e);
    }

    info!("Signaling server running on ws://{}", addr);

    if let Err(e) = server.listen(shutdown).await {
        error!("{}", e);
    }
}
