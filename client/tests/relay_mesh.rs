use std::time::{Duration, Instant};

use client::{
    Session, SessionConfig, SessionMode,
    board::{Board, MoveKey},
    game_host::GameHost,
    identity::{PeerColor, PeerIdentity},
    mesh::{
        peer_mesh::PeerMesh,
        relay_mesh::{MeshConfig, RelayMesh},
    },
};
use server::{RelayConfig, SignalingServer};
use shared::RoomId;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const MAP: &str = r#"<svg viewBox="0 0 400 300"><line x1="0" y1="150" x2="400" y2="150" stroke-width="40"/></svg>"#;

struct Peer {
    session: Session,
    board: Board,
}

impl Peer {
    async fn join(room: &RoomId, id: u32, signaling_url: &str) -> Self {
        let config = MeshConfig {
            signaling_urls: vec![signaling_url.to_string()],
            listen_addr: "127.0.0.1:0".to_string(),
            answer_dial_delay: Duration::from_millis(200),
            loopback_ports: None,
            ..MeshConfig::default()
        };

        Self::start(room, id, config).await
    }

    async fn start(room: &RoomId, id: u32, config: MeshConfig) -> Self {
        let mesh = RelayMesh::start(room, id, config).await.unwrap();
        let identity = PeerIdentity {
            client_id: id,
            name: format!("peer-{}", id),
            color: PeerColor::Mint,
        };

        Self {
            session: Session::new(
                room.clone(),
                "http://localhost:8080/",
                identity,
                Box::new(mesh),
                SessionConfig::default(),
                Instant::now(),
            ),
            board: Board::new(400.0, 300.0, Instant::now()),
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();
        self.board.update(now);
        self.session.tick(&mut self.board, now);
    }
}

async fn tick_until(
    peers: &mut [&mut Peer],
    limit: Duration,
    mut done: impl FnMut(&[&mut Peer]) -> bool,
) -> bool {
    let deadline = Instant::now() + limit;

    while Instant::now() < deadline {
        for peer in peers.iter_mut() {
            peer.tick();
        }

        if done(peers) {
            return true;
        }

        sleep(Duration::from_millis(16)).await;
    }

    false
}

async fn spawn_relay() -> (String, CancellationToken) {
    let server = SignalingServer::bind(
        "127.0.0.1:0",
        RelayConfig {
            ping_interval: Duration::from_secs(30),
            ..RelayConfig::default()
        },
    )
    .await
    .unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    let shutdown_for_server = shutdown.clone();

    tokio::spawn(async move {
        let _ = server.listen(shutdown_for_server).await;
    });

    (url, shutdown)
}

#[tokio::test]
async fn peers_meet_through_the_relay_and_sync() {
    let (url, shutdown) = spawn_relay().await;
    let room = RoomId::parse("relay-room").unwrap();

    let mut alice = Peer::join(&room, 10, &url).await;
    alice.board.load_map(MAP).unwrap();
    alice.session.share_map(MAP);

    let mut bob = Peer::join(&room, 20, &url).await;

    let linked = tick_until(&mut [&mut alice, &mut bob], Duration::from_secs(10), |peers| {
        peers
            .iter()
            .all(|peer| peer.session.mesh().live_links().len() == 1 && peer.session.users().len() == 2)
    })
    .await;
    assert!(linked, "peers never linked");

    assert_eq!(bob.session.shared_map(), Some(MAP));
    assert!(bob.board.map().is_some());

    alice.session.set_mode(SessionMode::Individual);
    alice.board.press(MoveKey::Left, Instant::now());

    let synced = tick_until(&mut [&mut alice, &mut bob], Duration::from_secs(5), |peers| {
        let bob = &peers[1];
        bob.session.mode() == SessionMode::Individual && !bob.session.remote_pawns().is_empty()
    })
    .await;
    assert!(synced, "mode and pawn never reached bob");

    alice.session.destroy();

    let gone = tick_until(&mut [&mut bob], Duration::from_secs(5), |peers| {
        peers[0].session.users().len() == 1
    })
    .await;
    assert!(gone, "alice never left bob's user list");

    shutdown.cancel();
}

#[tokio::test]
async fn player_follows_across_direct_links() {
    let (url, shutdown) = spawn_relay().await;
    let room = RoomId::parse("follow-room").unwrap();

    let mut alice = Peer::join(&room, 1, &url).await;
    let mut bob = Peer::join(&room, 2, &url).await;

    let linked = tick_until(&mut [&mut alice, &mut bob], Duration::from_secs(10), |peers| {
        peers.iter().all(|peer| peer.session.mesh().live_links().len() == 1)
    })
    .await;
    assert!(linked, "peers never linked");

    alice.board.press(MoveKey::Down, Instant::now());

    let followed = tick_until(&mut [&mut alice, &mut bob], Duration::from_secs(5), |peers| {
        let Some(shared) = peers[0].session.doc().player_transform() else {
            return false;
        };
        let bob = peers[1].board.player();

        !peers[0].board.has_local_input()
            && shared.y > 150.0
            && (shared.x - bob.x).abs() < 0.5
            && (shared.y - bob.y).abs() < 0.5
    })
    .await;
    assert!(followed, "bob never caught up with alice");

    shutdown.cancel();
}

#[tokio::test]
async fn same_host_peers_link_without_a_relay() {
    let config = MeshConfig {
        signaling_urls: Vec::new(),
        listen_addr: "127.0.0.1:0".to_string(),
        loopback_ports: Some(47700..=47705),
        beacon_interval: Duration::from_millis(100),
        ..MeshConfig::default()
    };
    let room = RoomId::parse("kitchen-table").unwrap();
    let elsewhere = RoomId::parse("attic").unwrap();

    let mut alice = Peer::start(&room, 31, config.clone()).await;
    alice.board.load_map(MAP).unwrap();
    alice.session.share_map(MAP);

    let mut bob = Peer::start(&room, 32, config.clone()).await;
    let mut carol = Peer::start(&elsewhere, 30, config).await;

    let linked = tick_until(
        &mut [&mut alice, &mut bob, &mut carol],
        Duration::from_secs(10),
        |peers| {
            peers[..2].iter().all(|peer| {
                peer.session.mesh().live_links().len() == 1 && peer.session.users().len() == 2
            }) && peers[1].session.shared_map() == Some(MAP)
        },
    )
    .await;
    assert!(linked, "same-host peers never linked");

    assert!(bob.board.map().is_some());
    assert!(carol.session.mesh().live_links().is_empty());
    assert_eq!(carol.session.users().len(), 1);
}
