use core::error::Error;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use log::debug;
use tokio::sync::{broadcast, mpsc};

use crate::{
    ClientId,
    media::local_stream::{LocalStream, RemoteStream},
    mesh::{
        lock,
        peer_mesh::{LinkEvent, MeshEvent, MeshMessage, PeerLink, PeerMesh},
    },
};

const LINK_EVENT_CAPACITY: usize = 32;

type Rooms = HashMap<String, HashMap<ClientId, BusMember>>;

struct BusMember {
    events_tx: mpsc::UnboundedSender<MeshEvent>,
    links: HashMap<ClientId, Arc<LocalLink>>,
}

/// In-process transport shared by every session created from the same
/// bus. Sessions on one device stay in sync through it even when no
/// signaling relay is reachable.
#[derive(Clone, Default)]
pub struct LocalBus {
    rooms: Arc<Mutex<Rooms>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `topic` as `local_id`. Every member already present gets a
    /// link to the newcomer and both sides see `PeerJoined`.
    pub fn join(&self, topic: &str, local_id: ClientId) -> LocalEndpoint {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut rooms = self.lock();
        let members = rooms.entry(topic.to_string()).or_default();

        let mut links = HashMap::new();

        for (peer_id, member) in members.iter_mut() {
            let (ours, theirs) = LocalLink::pair(local_id, *peer_id);

            member.links.insert(local_id, theirs);
            links.insert(*peer_id, ours);

            let _ = member.events_tx.send(MeshEvent::PeerJoined(local_id));
            let _ = events_tx.send(MeshEvent::PeerJoined(*peer_id));
        }

        members.insert(local_id, BusMember { events_tx, links });
        debug!("Client {} joined local bus topic '{}'", local_id, topic);

        LocalEndpoint {
            bus: self.clone(),
            topic: topic.to_string(),
            local_id,
            events_rx,
            closed: false,
        }
    }

    /// Removes the link between two members without telling either side,
    /// the way a dropped network path looks from the application.
    pub fn sever(&self, topic: &str, a: ClientId, b: ClientId) {
        let mut rooms = self.lock();
        let Some(members) = rooms.get_mut(topic) else {
            return;
        };

        for (owner, peer) in [(a, b), (b, a)] {
            if let Some(member) = members.get_mut(&owner) {
                member.links.remove(&peer);
            }
        }
    }

    pub fn member_count(&self, topic: &str) -> usize {
        self.lock().get(topic).map_or(0, HashMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, Rooms> {
        lock(&self.rooms)
    }

    fn leave(&self, topic: &str, local_id: ClientId) {
        let mut rooms = self.lock();
        let Some(members) = rooms.get_mut(topic) else {
            return;
        };

        if let Some(member) = members.remove(&local_id) {
            for link in member.links.values() {
                link.close();
            }
        }

        for member in members.values_mut() {
            if let Some(link) = member.links.remove(&local_id) {
                link.close();
            }

            let _ = member.events_tx.send(MeshEvent::PeerLeft(local_id));
        }

        if members.is_empty() {
            rooms.remove(topic);
        }
    }

    fn deliver(&self, topic: &str, from: ClientId, to: Option<ClientId>, message: &MeshMessage) {
        let rooms = self.lock();
        let Some(members) = rooms.get(topic) else {
            return;
        };

        for (peer_id, member) in members {
            if *peer_id == from || to.is_some_and(|to| to != *peer_id) {
                continue;
            }

            let _ = member.events_tx.send(MeshEvent::Message {
                from,
                message: message.clone(),
            });
        }
    }

    fn links_of(&self, topic: &str, local_id: ClientId) -> HashMap<ClientId, Arc<dyn PeerLink>> {
        let rooms = self.lock();

        rooms
            .get(topic)
            .and_then(|members| members.get(&local_id))
            .map(|member| {
                member
                    .links
                    .iter()
                    .filter(|(_, link)| !link.is_closed())
                    .map(|(id, link)| (*id, link.clone() as Arc<dyn PeerLink>))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One session's membership in a `LocalBus` topic.
pub struct LocalEndpoint {
    bus: LocalBus,
    topic: String,
    local_id: ClientId,
    events_rx: mpsc::UnboundedReceiver<MeshEvent>,
    closed: bool,
}

impl PeerMesh for LocalEndpoint {
    fn local_id(&self) -> ClientId {
        self.local_id
    }

    fn broadcast(&self, message: &MeshMessage) {
        if !self.closed {
            self.bus.deliver(&self.topic, self.local_id, None, message);
        }
    }

    fn send_to(&self, peer_id: ClientId, message: &MeshMessage) {
        if !self.closed {
            self.bus
                .deliver(&self.topic, self.local_id, Some(peer_id), message);
        }
    }

    fn try_next_event(&mut self) -> Option<MeshEvent> {
        self.events_rx.try_recv().ok()
    }

    fn live_links(&self) -> HashMap<ClientId, Arc<dyn PeerLink>> {
        if self.closed {
            return HashMap::new();
        }

        self.bus.links_of(&self.topic, self.local_id)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.bus.leave(&self.topic, self.local_id);
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Half of an in-process link. Offering a stream on one half delivers it
/// to the other.
pub struct LocalLink {
    peer_id: ClientId,
    closed: AtomicBool,
    events_tx: broadcast::Sender<LinkEvent>,
    remote_stream: Mutex<Option<RemoteStream>>,
    counterpart: Mutex<Weak<LocalLink>>,
}

impl LocalLink {
    fn new(peer_id: ClientId) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(LINK_EVENT_CAPACITY);

        Arc::new(Self {
            peer_id,
            closed: AtomicBool::new(false),
            events_tx,
            remote_stream: Mutex::new(None),
            counterpart: Mutex::new(Weak::new()),
        })
    }

    /// Returns (link held by `a` towards `b`, link held by `b` towards `a`).
    fn pair(a: ClientId, b: ClientId) -> (Arc<Self>, Arc<Self>) {
        let towards_b = Self::new(b);
        let towards_a = Self::new(a);

        *lock(&towards_b.counterpart) = Arc::downgrade(&towards_a);
        *lock(&towards_a.counterpart) = Arc::downgrade(&towards_b);

        (towards_b, towards_a)
    }

    fn receive_stream(&self, stream: RemoteStream) {
        *lock(&self.remote_stream) = Some(stream.clone());
        let _ = self.events_tx.send(LinkEvent::Stream(stream));
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events_tx.send(LinkEvent::Closed);
        }
    }
}

impl PeerLink for LocalLink {
    fn peer_id(&self) -> ClientId {
        self.peer_id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn add_stream(&self, stream: &LocalStream) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.is_closed() {
            return Err("link is closed".into());
        }

        let counterpart = lock(&self.counterpart)
            .upgrade()
            .ok_or("remote side of the link is gone")?;

        counterpart.receive_stream(stream.describe());

        Ok(())
    }

    fn remote_stream(&self) -> Option<RemoteStream> {
        lock(&self.remote_stream).clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{media::local_stream::TrackKind, shared_doc::DocUpdate};

    fn ping() -> MeshMessage {
        MeshMessage::DocUpdate {
            update: DocUpdate::default(),
        }
    }

    #[test]
    fn both_sides_see_each_other_join() {
        let bus = LocalBus::new();
        let mut a = bus.join("room", 1);
        let mut b = bus.join("room", 2);

        assert_eq!(a.try_next_event(), Some(MeshEvent::PeerJoined(2)));
        assert_eq!(b.try_next_event(), Some(MeshEvent::PeerJoined(1)));
        assert_eq!(a.live_links().len(), 1);
    }

    #[test]
    fn broadcast_skips_sender_and_other_topics() {
        let bus = LocalBus::new();
        let mut a = bus.join("room", 1);
        let mut b = bus.join("room", 2);
        let mut other = bus.join("elsewhere", 3);
        while b.try_next_event().is_some() {}
        while a.try_next_event().is_some() {}

        a.broadcast(&ping());

        assert_eq!(
            b.try_next_event(),
            Some(MeshEvent::Message {
                from: 1,
                message: ping()
            })
        );
        assert!(a.try_next_event().is_none());
        assert!(other.try_next_event().is_none());
    }

    #[test]
    fn closing_notifies_peers_and_closes_links() {
        let bus = LocalBus::new();
        let mut a = bus.join("room", 1);
        let mut b = bus.join("room", 2);
        let link = b.live_links().remove(&1).unwrap();
        let mut link_events = link.subscribe();
        while b.try_next_event().is_some() {}

        a.close();

        assert_eq!(b.try_next_event(), Some(MeshEvent::PeerLeft(1)));
        assert!(link.is_closed());
        assert_eq!(link_events.try_recv().unwrap(), LinkEvent::Closed);
        assert!(b.live_links().is_empty());
        assert_eq!(bus.member_count("room"), 1);
    }

    #[test]
    fn streams_cross_to_the_counterpart() {
        let bus = LocalBus::new();
        let a = bus.join("room", 1);
        let b = bus.join("room", 2);
        let to_b = a.live_links().remove(&2).unwrap();
        let to_a = b.live_links().remove(&1).unwrap();
        let mut events = to_a.subscribe();

        let stream = LocalStream::new(vec![(TrackKind::Audio, "mic".to_string())]);
        to_b.add_stream(&stream).unwrap();

        assert_eq!(events.try_recv().unwrap(), LinkEvent::Stream(stream.describe()));
        assert_eq!(to_a.remote_stream(), Some(stream.describe()));
    }
}
