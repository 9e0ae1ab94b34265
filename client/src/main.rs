mod cli_display;
mod raw_mode_guard;
mod terminal_client;

use std::time::Duration;

use clap::Parser;
use client::{SessionConfig, mesh::relay_mesh::MeshConfig};
use env_logger::{Builder, Env};
use shared::RoomId;

use crate::{
    cli_display::CliDisplay,
    terminal_client::{TerminalClient, TerminalOptions},
};

#[derive(Parser, Debug)]
struct Args {
    /// Room to join. A new room is created when omitted.
    #[arg(short, long)]
    room: Option<String>,

    /// Page URL; a `#room=` fragment selects the room.
    #[arg(short, long, default_value = "http://localhost:8080/")]
    url: String,

    #[arg(short, long)]
    name: Option<String>,

    /// Signaling relay, may be repeated.
    #[arg(short, long = "signaling")]
    signaling: Vec<String>,

    #[arg(long, default_value = "0.0.0.0:0")]
    listen: String,

    /// Host other peers dial for direct links.
    #[arg(long, default_value = "127.0.0.1")]
    advertise_host: String,

    /// SVG map shared with the room on join.
    #[arg(short, long)]
    map: Option<String>,

    /// Quiet period after a remote move before local writes resume.
    #[arg(long, default_value_t = 150)]
    cooldown_ms: u64,

    #[arg(long)]
    no_media: bool,

    /// Skip finding other clients on this host without a relay.
    #[arg(long)]
    no_loopback: bool,
}

#[tokio::main]
async fn main() {
    Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let room_id = match &args.room {
        Some(room) => match RoomId::parse(room) {
            Ok(room_id) => room_id,
            Err(e) => {
                eprintln!("Invalid room '{}': {}", room, e);
                return;
            }
        },
        None => {
            let (room_id, rewritten) = RoomId::resolve(&args.url);

            if let Some(url) = rewritten {
                CliDisplay::print_notice(&format!("Created room {}", url));
            }

            room_id
        }
    };

    let mut mesh = MeshConfig {
        listen_addr: args.listen,
        advertise_host: args.advertise_host,
        ..MeshConfig::default()
    };

    if !args.signaling.is_empty() {
        mesh.signaling_urls = args.signaling;
    }

    if args.no_loopback {
        mesh.loopback_ports = None;
    }

    let options = TerminalOptions {
        room_id,
        base_url: args.url,
        name: args.name,
        mesh,
        map_path: args.map,
        session: SessionConfig {
            remote_cooldown: Duration::from_millis(args.cooldown_ms),
            ..SessionConfig::default()
        },
        media: !args.no_media,
    };

    if let Err(e) = TerminalClient::run(options).await {
        eprintln!("{}", e);
    }
}
