use std::time::Instant;

use log::{debug, info, warn};
use shared::RoomId;

use crate::{
    ClientId,
    doc_change::Region,
    game_host::GameHost,
    identity::{PeerColor, PeerIdentity, clean_name},
    mesh::peer_mesh::{MeshEvent, MeshMessage, PeerMesh},
    player::{Cursor, Pawn},
    presence::{Presence, PresenceObserver},
    presence_field::PresenceField,
    session_config::SessionConfig,
    session_mode::SessionMode,
    shared_doc::{DocObserver, SharedDoc},
    sync_policy::SyncPolicy,
};

#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub id: ClientId,
    pub name: String,
    pub color: PeerColor,
    pub cursor: Option<Cursor>,
    pub pawn: Option<Pawn>,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub id: ClientId,
    pub name: String,
    pub color: PeerColor,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePawn {
    pub id: ClientId,
    pub name: String,
    pub color: PeerColor,
    pub pawn: Pawn,
}

type UsersChangedCallback = Box<dyn FnMut(&[UserInfo])>;
type ModeChangedCallback = Box<dyn FnMut(SessionMode)>;
type MapChangedCallback = Box<dyn FnMut(&str)>;

/// One peer's membership in a room: the shared document, presence, the
/// mesh carrying both, and the policy applying them to the game.
pub struct Session {
    room_id: RoomId,
    base_url: String,
    identity: PeerIdentity,
    config: SessionConfig,
    doc: SharedDoc,
    doc_events: DocObserver,
    presence: Presence,
    presence_events: PresenceObserver,
    mesh: Box<dyn PeerMesh>,
    policy: SyncPolicy,
    on_users_changed: Option<UsersChangedCallback>,
    on_mode_changed: Option<ModeChangedCallback>,
    on_map_changed: Option<MapChangedCallback>,
    destroyed: bool,
}

impl Session {
    pub fn new(
        room_id: RoomId,
        base_url: &str,
        identity: PeerIdentity,
        mesh: Box<dyn PeerMesh>,
        config: SessionConfig,
        now: Instant,
    ) -> Self {
        let doc = SharedDoc::new(identity.client_id);
        let doc_events = doc.observe();
        let presence = Presence::new(identity.client_id, identity.profile(), now);
        let presence_events = presence.observe();

        info!(
            "Joined room {} as {} ({})",
            room_id, identity.name, identity.client_id
        );

        Self {
            room_id,
            base_url: base_url.to_string(),
            policy: SyncPolicy::new(config.clone()),
            identity,
            config,
            doc,
            doc_events,
            presence,
            presence_events,
            mesh,
            on_users_changed: None,
            on_mode_changed: None,
            on_map_changed: None,
            destroyed: false,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn room_url(&self) -> String {
        self.room_id.url_for(&self.base_url)
    }

    pub fn local_identity(&self) -> &PeerIdentity {
        &self.identity
    }

    pub fn client_id(&self) -> ClientId {
        self.identity.client_id
    }

    pub fn doc(&self) -> &SharedDoc {
        &self.doc
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn mesh(&self) -> &dyn PeerMesh {
        self.mesh.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn on_users_changed(&mut self, callback: impl FnMut(&[UserInfo]) + 'static) {
        self.on_users_changed = Some(Box::new(callback));
    }

    pub fn on_mode_changed(&mut self, callback: impl FnMut(SessionMode) + 'static) {
        self.on_mode_changed = Some(Box::new(callback));
    }

    pub fn on_map_changed(&mut self, callback: impl FnMut(&str) + 'static) {
        self.on_map_changed = Some(Box::new(callback));
    }

    /// Everyone with a presence identity, ordered by client id.
    pub fn users(&self) -> Vec<UserInfo> {
        self.presence
            .states()
            .into_iter()
            .filter_map(|(id, state)| {
                let profile = state.profile.as_ref()?;

                Some(UserInfo {
                    id,
                    name: profile.name.clone(),
                    color: profile.color,
                    cursor: state.cursor,
                    pawn: state.pawn,
                    is_local: id == self.identity.client_id,
                })
            })
            .collect()
    }

    pub fn mode(&self) -> SessionMode {
        self.policy.mode()
    }

    /// Writes the mode into the document. The local mode follows through
    /// the same change path a remote write takes.
    pub fn set_mode(&mut self, mode: SessionMode) {
        if self.destroyed {
            return;
        }

        self.doc.set_mode(mode);
    }

    /// Publishes the cursor in board coordinates. Negative coordinates mean
    /// the pointer left the board.
    pub fn set_cursor(&mut self, x: f64, y: f64) {
        let cursor = (x >= 0.0 && y >= 0.0).then(|| Cursor {
            x: x.round(),
            y: y.round(),
        });

        self.presence.set_field(PresenceField::Cursor(cursor));
    }

    pub fn clear_cursor(&mut self) {
        self.presence.set_field(PresenceField::Cursor(None));
    }

    /// Replaces the shared map for every peer. Empty text is ignored.
    pub fn share_map(&mut self, text: &str) {
        if self.destroyed || text.is_empty() {
            return;
        }

        info!("Sharing map ({} bytes)", text.len());
        self.doc.set_map_text(text);
    }

    pub fn shared_map(&self) -> Option<&str> {
        self.doc.map_text()
    }

    pub fn set_user_name(&mut self, name: &str) {
        let Some(name) = clean_name(name) else {
            return;
        };

        self.identity.name = name;
        self.presence
            .set_field(PresenceField::Identity(self.identity.profile()));
    }

    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.presence
            .remote_peers()
            .filter_map(|(id, state)| {
                let profile = state.profile.as_ref()?;
                let cursor = state.cursor?;

                Some(RemoteCursor {
                    id,
                    name: profile.name.clone(),
                    color: profile.color,
                    x: cursor.x,
                    y: cursor.y,
                })
            })
            .collect()
    }

    /// Other peers' pawns. Empty unless the room is in individual mode.
    pub fn remote_pawns(&self) -> Vec<RemotePawn> {
        if self.mode() != SessionMode::Individual {
            return Vec::new();
        }

        self.presence
            .remote_peers()
            .filter_map(|(id, state)| {
                let profile = state.profile.as_ref()?;

                Some(RemotePawn {
                    id,
                    name: profile.name.clone(),
                    color: profile.color,
                    pawn: state.pawn?,
                })
            })
            .collect()
    }

    /// Runs one frame of synchronization against the game.
    pub fn tick(&mut self, game: &mut dyn GameHost, now: Instant) {
        if self.destroyed {
            return;
        }

        self.process_mesh_events(now);
        self.process_doc_changes(game, now);

        self.policy.apply_remote_smooth(game);
        self.policy.sync_player(game, &mut self.doc, now);
        self.policy.sync_individual_pawn(game, &mut self.presence);

        // Mode writes made during this tick are applied before flushing.
        self.process_doc_changes(game, now);
        self.process_presence(now);

        self.flush(now);
    }

    /// Announces departure and closes the mesh. Safe to call twice.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        self.destroyed = true;

        self.mesh.broadcast(&MeshMessage::PresenceRemoved {
            client_id: self.identity.client_id,
            clock: self.presence.local().clock,
        });
        self.mesh.close();

        info!("Left room {}", self.room_id);
    }

    fn process_mesh_events(&mut self, now: Instant) {
        while let Some(event) = self.mesh.try_next_event() {
            match event {
                MeshEvent::PeerJoined(peer_id) => {
                    debug!("Peer {} joined, sending current state", peer_id);

                    self.mesh.send_to(
                        peer_id,
                        &MeshMessage::DocSync {
                            update: self.doc.snapshot(),
                        },
                    );
                    self.mesh.send_to(
                        peer_id,
                        &MeshMessage::Presence {
                            record: self.presence.local_record(),
                        },
                    );
                }

                MeshEvent::PeerLeft(peer_id) => {
                    debug!("Peer {} left", peer_id);
                    self.presence.remove_peer(peer_id);
                }

                MeshEvent::Message { from, message } => self.apply_message(from, message, now),
            }
        }
    }

    fn apply_message(&mut self, from: ClientId, message: MeshMessage, now: Instant) {
        match message {
            MeshMessage::DocSync { update } | MeshMessage::DocUpdate { update } => {
                self.doc.apply_remote(&update);
            }

            MeshMessage::Presence { record } => {
                if record.client_id != from {
                    warn!(
                        "Peer {} sent presence for {}, ignoring",
                        from, record.client_id
                    );
                    return;
                }

                if let Err(e) = self.presence.apply_remote(record, now) {
                    warn!("Rejected presence from peer {}: {}", from, e);
                }
            }

            MeshMessage::PresenceRemoved { client_id, clock } => {
                if client_id == from {
                    self.presence.remove_remote(client_id, clock);
                }
            }
        }
    }

    fn process_doc_changes(&mut self, game: &mut dyn GameHost, now: Instant) {
        while let Some(change) = self.doc_events.try_next() {
            match change.region {
                Region::Player => {
                    if change.is_remote() {
                        self.policy
                            .on_remote_player_change(&self.doc, game.player(), now);
                    }
                }

                Region::SvgMap => {
                    if !change.is_remote() {
                        continue;
                    }

                    let Some(text) = self.doc.map_text() else {
                        continue;
                    };

                    if !game.parse_map_text(text) {
                        warn!("Shared map could not be parsed, keeping the current map");
                        continue;
                    }

                    if let Some(callback) = self.on_map_changed.as_mut() {
                        callback(text);
                    }
                }

                Region::Settings => {
                    let Some(mode) = self.doc.mode() else {
                        continue;
                    };

                    if mode == self.policy.mode() {
                        continue;
                    }

                    info!("Mode changed to {}", mode);
                    self.policy.set_mode(mode);

                    if mode == SessionMode::Shared {
                        self.presence.set_field(PresenceField::Pawn(None));
                    }

                    if let Some(callback) = self.on_mode_changed.as_mut() {
                        callback(mode);
                    }
                }
            }
        }
    }

    fn process_presence(&mut self, now: Instant) {
        self.presence.expire(now, self.config.presence_timeout);

        let mut changed = false;

        while self.presence_events.try_next().is_some() {
            changed = true;
        }

        if changed && self.on_users_changed.is_some() {
            let users = self.users();

            if let Some(callback) = self.on_users_changed.as_mut() {
                callback(&users);
            }
        }
    }

    fn flush(&mut self, now: Instant) {
        for update in self.doc.take_outbox() {
            self.mesh.broadcast(&MeshMessage::DocUpdate { update });
        }

        if let Some(record) = self
            .presence
            .take_outbound(now, self.config.presence_renew_interval)
        {
            self.mesh.broadcast(&MeshMessage::Presence { record });
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}
