use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use client::{
    Session, SessionConfig, SessionMode,
    board::{Board, MoveKey},
    doc_change::Region,
    game_host::GameHost,
    identity::{PeerColor, PeerIdentity},
    media::{LocalStream, MediaConfig, MediaConstraints, MediaDevices, MediaSession, TrackKind},
    mesh::local_bus::LocalBus,
    walkable_map::WalkableMap,
};
use shared::RoomId;

const TOPIC: &str = "pony-room";
const FRAME: Duration = Duration::from_millis(20);

const MAP: &str = r#"<svg viewBox="0 0 400 300">
  <polyline points="20,150 380,150 380,40" stroke-width="30"/>
  <path d="M 200 150 V 280" style="stroke:#333;stroke-width:24"/>
</svg>"#;

struct Peer {
    session: Session,
    board: Board,
}

impl Peer {
    fn join(bus: &LocalBus, id: u32, name: &str, now: Instant) -> Self {
        let identity = PeerIdentity {
            client_id: id,
            name: name.to_string(),
            color: PeerColor::Blue,
        };

        let session = Session::new(
            RoomId::parse(TOPIC).unwrap(),
            "http://localhost:8080/",
            identity,
            Box::new(bus.join(TOPIC, id)),
            SessionConfig::default(),
            now,
        );

        Self {
            session,
            board: Board::new(400.0, 300.0, now),
        }
    }

    fn tick(&mut self, now: Instant) {
        self.board.update(now);
        self.session.tick(&mut self.board, now);
    }
}

fn tick_all(peers: &mut [&mut Peer], start: Instant, frames: u32) -> Instant {
    let mut now = start;

    for _ in 0..frames {
        now += FRAME;

        for peer in peers.iter_mut() {
            peer.tick(now);
        }
    }

    now
}

#[test]
fn late_joiner_converges_on_the_shared_player() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);

    alice.board.press(MoveKey::Right, start);
    let now = tick_all(&mut [&mut alice], start, 10);
    let target = alice.board.player().x;
    assert!(target > 200.0);

    let mut bob = Peer::join(&bus, 2, "Bob", now);
    tick_all(&mut [&mut alice, &mut bob], now, 120);

    let shared = alice.session.doc().player_transform().unwrap();
    let (bx, by) = (bob.board.player().x, bob.board.player().y);

    assert!(shared.x >= target);
    assert!((shared.x - bx).abs() < 0.5, "shared at {}, bob at {}", shared.x, bx);
    assert!((shared.y - by).abs() < 0.5);
    assert_eq!(bob.session.doc().player_transform(), Some(shared));
    assert_eq!(bob.session.mode(), SessionMode::Shared);
}

#[test]
fn following_a_remote_player_never_writes_back() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);
    let mut bob_changes = bob.session.doc().observe();

    let mut now = start;

    for frame in 0..100 {
        now += FRAME;

        let key = if frame % 50 < 25 {
            MoveKey::Right
        } else {
            MoveKey::Down
        };
        alice.board.press(key, now);

        alice.tick(now);
        bob.tick(now);
    }

    let mut local_player_writes = 0;
    let mut remote_player_writes = 0;

    while let Some(change) = bob_changes.try_next() {
        if change.region != Region::Player {
            continue;
        }

        if change.is_remote() {
            remote_player_writes += 1;
        } else {
            local_player_writes += 1;
        }
    }

    assert_eq!(local_player_writes, 0);
    assert!(remote_player_writes > 20);
    assert!(bob.board.player().x > 250.0);
}

#[test]
fn mode_change_fires_once_on_every_peer() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);

    let alice_modes = Rc::new(RefCell::new(Vec::new()));
    let bob_modes = Rc::new(RefCell::new(Vec::new()));
    {
        let alice_modes = alice_modes.clone();
        alice
            .session
            .on_mode_changed(move |mode| alice_modes.borrow_mut().push(mode));
        let bob_modes = bob_modes.clone();
        bob.session
            .on_mode_changed(move |mode| bob_modes.borrow_mut().push(mode));
    }

    let now = tick_all(&mut [&mut alice, &mut bob], start, 3);
    alice.session.set_mode(SessionMode::Individual);
    tick_all(&mut [&mut alice, &mut bob], now, 10);

    assert_eq!(*alice_modes.borrow(), vec![SessionMode::Individual]);
    assert_eq!(*bob_modes.borrow(), vec![SessionMode::Individual]);
    assert_eq!(bob.session.mode(), SessionMode::Individual);
}

#[test]
fn shared_map_reaches_peers_intact() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);

    let received = Rc::new(RefCell::new(None));
    let received_in_callback = received.clone();
    bob.session
        .on_map_changed(move |text| *received_in_callback.borrow_mut() = Some(text.to_string()));

    alice.board.load_map(MAP).unwrap();
    alice.session.share_map(MAP);
    tick_all(&mut [&mut alice, &mut bob], start, 3);

    assert_eq!(bob.session.shared_map(), Some(MAP));
    assert_eq!(received.borrow().as_deref(), Some(MAP));
    assert_eq!(bob.session.doc().map_updated_by(), Some(1));

    let expected = WalkableMap::parse(MAP).unwrap();
    let loaded = bob.board.map().unwrap();

    for x in (0..400).step_by(10) {
        for y in (0..300).step_by(10) {
            let (x, y) = (x as f64, y as f64);
            assert_eq!(loaded.is_on_path(x, y), expected.is_on_path(x, y), "at ({}, {})", x, y);
        }
    }
}

#[test]
fn unparseable_map_is_stored_but_not_applied() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);

    let calls = Rc::new(RefCell::new(0));
    let counter = calls.clone();
    bob.session.on_map_changed(move |_| *counter.borrow_mut() += 1);

    alice.session.share_map("<svg></svg>");
    alice.session.share_map("");
    tick_all(&mut [&mut alice, &mut bob], start, 3);

    assert_eq!(bob.session.shared_map(), Some("<svg></svg>"));
    assert!(bob.board.map().is_none());
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn users_leave_when_a_peer_destroys_its_session() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);

    let user_counts = Rc::new(RefCell::new(Vec::new()));
    let counts = user_counts.clone();
    bob.session
        .on_users_changed(move |users| counts.borrow_mut().push(users.len()));

    let now = tick_all(&mut [&mut alice, &mut bob], start, 3);

    let names: Vec<String> = bob.session.users().into_iter().map(|user| user.name).collect();
    assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);

    alice.session.destroy();
    alice.session.destroy();
    tick_all(&mut [&mut bob], now, 2);

    assert_eq!(bob.session.users().len(), 1);
    assert_eq!(user_counts.borrow().last(), Some(&1));
    assert_eq!(bus.member_count(TOPIC), 1);
}

#[test]
fn renamed_peer_is_seen_with_the_new_name() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);

    let now = tick_all(&mut [&mut alice, &mut bob], start, 2);
    alice.session.set_user_name("  Applejack  ");
    alice.session.set_cursor(120.4, 80.6);
    tick_all(&mut [&mut alice, &mut bob], now, 2);

    let cursors = bob.session.remote_cursors();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].name, "Applejack");
    assert_eq!((cursors[0].x, cursors[0].y), (120.0, 81.0));
}

#[test]
fn remote_pawns_only_in_individual_mode() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);

    let now = tick_all(&mut [&mut alice, &mut bob], start, 2);
    assert!(bob.session.remote_pawns().is_empty());

    alice.session.set_mode(SessionMode::Individual);
    let now = tick_all(&mut [&mut alice, &mut bob], now, 3);

    alice.board.press(MoveKey::Left, now);
    let now = tick_all(&mut [&mut alice, &mut bob], now, 5);

    let pawns = bob.session.remote_pawns();
    assert_eq!(pawns.len(), 1);
    assert_eq!(pawns[0].id, 1);
    assert!(pawns[0].pawn.x < 200.0);
    assert!((bob.board.player().x - 200.0).abs() < f64::EPSILON);

    bob.session.set_mode(SessionMode::Shared);
    tick_all(&mut [&mut alice, &mut bob], now, 3);

    assert!(bob.session.remote_pawns().is_empty());
    assert!(bob.session.presence().get(1).unwrap().pawn.is_none());
}

struct CameraAndMic;

impl MediaDevices for CameraAndMic {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> anyhow::Result<LocalStream> {
        let mut tracks = vec![(TrackKind::Audio, "mic".to_string())];

        if constraints.video.is_some() {
            tracks.push((TrackKind::Video, "cam".to_string()));
        }

        Ok(LocalStream::new(tracks))
    }
}

#[tokio::test]
async fn media_attaches_to_session_links() {
    let bus = LocalBus::new();
    let start = Instant::now();
    let mut alice = Peer::join(&bus, 1, "Alice", start);
    let mut bob = Peer::join(&bus, 2, "Bob", start);

    let mut alice_media = MediaSession::new(MediaConfig::default());
    let mut bob_media = MediaSession::new(MediaConfig::default());
    alice_media.start(&CameraAndMic, start).await.unwrap();
    bob_media.start(&CameraAndMic, start).await.unwrap();

    let added = Rc::new(RefCell::new(Vec::new()));
    let added_in_callback = added.clone();
    bob_media.on_stream_added(move |peer_id, _| added_in_callback.borrow_mut().push(peer_id));

    let mut now = start;

    for _ in 0..40 {
        now += FRAME;
        alice.tick(now);
        bob.tick(now);
        alice_media.tick(alice.session.mesh(), now);
        bob_media.tick(bob.session.mesh(), now);
    }

    assert!(bob_media.remote_streams()[&1].has(TrackKind::Video));
    assert!(alice_media.remote_streams()[&2].has(TrackKind::Audio));
    assert_eq!(*added.borrow(), vec![1]);
}
