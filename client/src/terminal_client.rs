use core::error::Error;
use std::time::{Duration, Instant};

use client::{
    Session, SessionConfig, SessionMode,
    board::{Board, MoveKey},
    game_host::GameHost,
    identity::PeerIdentity,
    media::{MediaConfig, MediaSession},
    mesh::relay_mesh::{MeshConfig, RelayMesh},
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{info, warn};
use scopeguard::defer;
use shared::RoomId;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    cli_display::{CliDisplay, StatusLine},
    raw_mode_guard::RawModeGuard,
};

const BOARD_WIDTH: f64 = 800.0;
const BOARD_HEIGHT: f64 = 600.0;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const STATUS_INTERVAL: Duration = Duration::from_millis(250);
const INPUT_POLL: Duration = Duration::from_millis(50);

pub struct TerminalOptions {
    pub room_id: RoomId,
    pub base_url: String,
    pub name: Option<String>,
    pub mesh: MeshConfig,
    pub map_path: Option<String>,
    pub session: SessionConfig,
    pub media: bool,
}

enum Command {
    Move(MoveKey),
    ToggleMode,
    ToggleVideo,
    ToggleAudio,
    Quit,
}

pub struct TerminalClient;

impl TerminalClient {
    pub async fn run(options: TerminalOptions) -> Result<(), Box<dyn Error + Send + Sync>> {
        let identity = PeerIdentity::generate().with_name(options.name.as_deref());
        let name = identity.name.clone();
        let start = Instant::now();

        let mesh = RelayMesh::start(&options.room_id, identity.client_id, options.mesh).await?;
        let link_addr = mesh.advertised_addr().to_string();

        let mut board = Board::new(BOARD_WIDTH, BOARD_HEIGHT, start);
        let map_text = match &options.map_path {
            Some(path) => Some(tokio::fs::read_to_string(path).await?),
            None => None,
        };

        if let Some(text) = &map_text {
            board.load_map(text)?;
        }

        let mut session = Session::new(
            options.room_id,
            &options.base_url,
            identity,
            Box::new(mesh),
            options.session,
            start,
        );

        if let Some(text) = &map_text {
            session.share_map(text);
        }

        session.on_users_changed(|users| CliDisplay::print_user_list(users));
        session.on_mode_changed(|mode| {
            CliDisplay::print_notice(&format!("Mode is now {}: {}", mode, describe_mode(mode)));
        });
        session.on_map_changed(|text| {
            CliDisplay::print_notice(&format!("Received a shared map ({} bytes)", text.len()));
        });

        let mut media = MediaSession::new(MediaConfig::default());
        media.on_stream_added(|peer_id, stream| {
            CliDisplay::print_notice(&format!(
                "Peer {} is streaming {} track(s)",
                peer_id,
                stream.tracks.len()
            ));
        });
        media.on_stream_removed(|peer_id| {
            CliDisplay::print_notice(&format!("Peer {} stopped streaming", peer_id));
        });

        if options.media {
            Self::start_media(&mut media, start).await;
        }

        let mut media = scopeguard::guard(media, |mut media| media.destroy());

        CliDisplay::print_joined(&session.room_url(), &name, &link_addr);

        let _raw_mode_guard = RawModeGuard::new()?;

        let input_shutdown = CancellationToken::new();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let input_task = tokio::task::spawn_blocking({
            let input_shutdown = input_shutdown.clone();
            move || read_commands(command_tx, input_shutdown)
        });

        let stop_input = input_shutdown.clone();
        defer! {
            stop_input.cancel();
        }

        let mut frames = tokio::time::interval(FRAME_INTERVAL);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_status = start;

        loop {
            tokio::select! {

                command = command_rx.recv() => {

                    let Some(command) = command else {
                        break;
                    };

                    let now = Instant::now();

                    match command {
                        Command::Move(key) => board.press(key, now),

                        Command::ToggleMode => {
                            let mode = session.mode().toggled();
                            session.set_mode(mode);
                        }

                        Command::ToggleVideo => {
                            if !media.toggle_video() {
                                CliDisplay::print_notice("No camera in this session");
                            }
                        }

                        Command::ToggleAudio => {
                            if !media.toggle_audio() {
                                CliDisplay::print_notice("No microphone in this session");
                            }
                        }

                        Command::Quit => break,
                    }
                }

                _ = frames.tick() => {

                    let now = Instant::now();

                    board.update(now);
                    session.tick(&mut board, now);
                    media.tick(session.mesh(), now);

                    if now.duration_since(last_status) >= STATUS_INTERVAL {
                        last_status = now;
                        Self::draw_status(&session, &board, &*media);
                    }
                }
            }
        }

        input_shutdown.cancel();
        session.destroy();

        if let Err(e) = input_task.await? {
            warn!("Input reader stopped with an error: {}", e);
        }

        info!("Left room after {:?}", start.elapsed());

        Ok(())
    }

    #[cfg(feature = "devices")]
    async fn start_media(media: &mut MediaSession, now: Instant) {
        use client::media::system_devices::SystemDevices;

        media.start(&SystemDevices::default(), now).await;
    }

    #[cfg(not(feature = "devices"))]
    async fn start_media(media: &mut MediaSession, now: Instant) {
        use client::media::NoDevices;

        media.start(&NoDevices, now).await;
    }

    fn draw_status(session: &Session, board: &Board, media: &MediaSession) {
        let has_stream = media.local_stream().is_some();

        CliDisplay::draw_status(&StatusLine {
            mode: session.mode(),
            player: board.player(),
            peers: session.mesh().live_links().len(),
            video: (has_stream && media.has_video()).then(|| media.video_enabled()),
            audio: has_stream.then(|| media.audio_enabled()),
            remote_streams: media.remote_streams().len(),
        });
    }
}

fn read_commands(
    command_tx: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    while !shutdown.is_cancelled() {
        if !event::poll(INPUT_POLL)? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };

        let Some(command) = command_for(key) else {
            continue;
        };

        let quit = matches!(command, Command::Quit);

        if command_tx.send(command).is_err() || quit {
            break;
        }
    }

    Ok(())
}

fn command_for(key: KeyEvent) -> Option<Command> {
    if key.kind == KeyEventKind::Release {
        return None;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c')).then_some(Command::Quit);
    }

    let command = match key.code {
        KeyCode::Up | KeyCode::Char('w') => Command::Move(MoveKey::Up),
        KeyCode::Down | KeyCode::Char('s') => Command::Move(MoveKey::Down),
        KeyCode::Left | KeyCode::Char('a') => Command::Move(MoveKey::Left),
        KeyCode::Right | KeyCode::Char('d') => Command::Move(MoveKey::Right),
        KeyCode::Char('m') => Command::ToggleMode,
        KeyCode::Char('v') => Command::ToggleVideo,
        KeyCode::Char('c') => Command::ToggleAudio,
        KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
        _ => return None,
    };

    Some(command)
}

fn describe_mode(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Shared => "everyone steers one character",
        SessionMode::Individual => "everyone walks their own pawn",
    }
}
