use core::error::Error;
use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    ClientId,
    media::local_stream::{LocalStream, RemoteStream},
    presence_field::PresenceRecord,
    shared_doc::DocUpdate,
};

/// Application payloads exchanged between peers of one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshMessage {
    /// Full document state, sent to a peer right after its link opens.
    DocSync { update: DocUpdate },
    DocUpdate { update: DocUpdate },
    Presence { record: PresenceRecord },
    PresenceRemoved { client_id: ClientId, clock: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    PeerJoined(ClientId),
    PeerLeft(ClientId),
    Message { from: ClientId, message: MeshMessage },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Stream(RemoteStream),
    Closed,
    Error(String),
}

/// One live connection to a remote peer, able to carry media.
pub trait PeerLink: Send + Sync {
    fn peer_id(&self) -> ClientId;

    fn is_closed(&self) -> bool;

    /// Offers the local tracks to the remote side.
    fn add_stream(&self, stream: &LocalStream) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// The stream the remote side has offered so far, if any.
    fn remote_stream(&self) -> Option<RemoteStream>;

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent>;
}

/// A room's peer-to-peer transport. Sends never fail loudly: with no
/// reachable peers they are simply dropped.
pub trait PeerMesh {
    fn local_id(&self) -> ClientId;

    fn broadcast(&self, message: &MeshMessage);

    fn send_to(&self, peer_id: ClientId, message: &MeshMessage);

    fn try_next_event(&mut self) -> Option<MeshEvent>;

    fn live_links(&self) -> HashMap<ClientId, Arc<dyn PeerLink>>;

    fn close(&mut self);
}
