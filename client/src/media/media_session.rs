use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    ClientId,
    media::{
        local_stream::{LocalStream, RemoteStream, TrackKind},
        media_devices::{MediaConstraints, MediaDevices},
    },
    mesh::peer_mesh::{LinkEvent, PeerLink, PeerMesh},
};

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub constraints: MediaConstraints,
    /// Delay before the first look at the mesh after capture starts.
    pub first_check_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            constraints: MediaConstraints::default(),
            first_check_delay: Duration::from_millis(500),
            poll_interval: Duration::from_secs(2),
        }
    }
}

struct TrackedPeer {
    link: Arc<dyn PeerLink>,
    events: broadcast::Receiver<LinkEvent>,
}

type StreamAddedCallback = Box<dyn FnMut(ClientId, &RemoteStream)>;
type StreamRemovedCallback = Box<dyn FnMut(ClientId)>;

/// Attaches local capture to every peer link of a room and tracks what
/// each peer sends back.
pub struct MediaSession {
    config: MediaConfig,
    local_stream: Option<LocalStream>,
    video_enabled: bool,
    audio_enabled: bool,
    tracked: HashMap<ClientId, TrackedPeer>,
    remote_streams: HashMap<ClientId, RemoteStream>,
    next_check: Option<Instant>,
    on_stream_added: Option<StreamAddedCallback>,
    on_stream_removed: Option<StreamRemovedCallback>,
}

impl MediaSession {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            config,
            local_stream: None,
            video_enabled: true,
            audio_enabled: true,
            tracked: HashMap::new(),
            remote_streams: HashMap::new(),
            next_check: None,
            on_stream_added: None,
            on_stream_removed: None,
        }
    }

    pub fn on_stream_added(&mut self, callback: impl FnMut(ClientId, &RemoteStream) + 'static) {
        self.on_stream_added = Some(Box::new(callback));
    }

    pub fn on_stream_removed(&mut self, callback: impl FnMut(ClientId) + 'static) {
        self.on_stream_removed = Some(Box::new(callback));
    }

    /// Requests camera and microphone, then microphone alone. Returns
    /// `None` when both are refused; the session then stays idle.
    pub async fn start<D: MediaDevices>(&mut self, devices: &D, now: Instant) -> Option<LocalStream> {
        let stream = match devices.get_user_media(&self.config.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Camera and microphone unavailable: {}", e);

                match devices.get_user_media(&self.config.constraints.audio_only()).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Microphone unavailable, continuing without media: {}", e);
                        return None;
                    }
                }
            }
        };

        info!(
            "Local media started (video: {}, audio: {})",
            stream.has(TrackKind::Video),
            stream.has(TrackKind::Audio)
        );

        self.video_enabled = true;
        self.audio_enabled = true;
        self.local_stream = Some(stream.clone());
        self.next_check = Some(now + self.config.first_check_delay);

        Some(stream)
    }

    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.local_stream.as_ref()
    }

    pub fn has_video(&self) -> bool {
        self.local_stream
            .as_ref()
            .is_some_and(|stream| stream.has(TrackKind::Video))
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn remote_streams(&self) -> &HashMap<ClientId, RemoteStream> {
        &self.remote_streams
    }

    pub fn tracked_peers(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.tracked.keys().copied()
    }

    /// Drains link events every call and polls the mesh when the poll
    /// timer is due.
    pub fn tick(&mut self, mesh: &dyn PeerMesh, now: Instant) {
        if self
            .next_check
            .is_some_and(|next_check| now >= next_check)
        {
            self.check_connections(mesh);
            self.next_check = Some(now + self.config.poll_interval);
        }

        self.drain_link_events();
    }

    /// Starts tracking links the mesh reports for the first time and
    /// forgets peers whose links it no longer reports.
    pub fn check_connections(&mut self, mesh: &dyn PeerMesh) {
        let Some(stream) = self.local_stream.clone() else {
            return;
        };

        let links = mesh.live_links();

        for (peer_id, link) in &links {
            if self.tracked.contains_key(peer_id) || link.is_closed() {
                continue;
            }

            let events = link.subscribe();

            if let Err(e) = link.add_stream(&stream) {
                warn!("Could not attach media to peer {}: {}", peer_id, e);
            }

            debug!("Tracking media for peer {}", peer_id);
            self.tracked.insert(
                *peer_id,
                TrackedPeer {
                    link: link.clone(),
                    events,
                },
            );

            if let Some(remote) = link.remote_stream() {
                self.stream_added(*peer_id, remote);
            }
        }

        let gone: Vec<ClientId> = self
            .tracked
            .keys()
            .filter(|peer_id| !links.contains_key(peer_id))
            .copied()
            .collect();

        for peer_id in gone {
            self.handle_peer_close(peer_id);
        }
    }

    pub fn toggle_video(&mut self) -> bool {
        self.toggle(TrackKind::Video)
    }

    pub fn toggle_audio(&mut self) -> bool {
        self.toggle(TrackKind::Audio)
    }

    /// Stops capture and forgets every peer. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.next_check = None;

        if let Some(stream) = self.local_stream.take() {
            stream.stop();
            info!("Local media stopped");
        }

        self.tracked.clear();
        self.remote_streams.clear();
    }

    fn toggle(&mut self, kind: TrackKind) -> bool {
        let Some(stream) = &self.local_stream else {
            return false;
        };

        let enabled = match kind {
            TrackKind::Video => &mut self.video_enabled,
            TrackKind::Audio => &mut self.audio_enabled,
        };

        *enabled = !*enabled;
        stream.set_enabled(kind, *enabled);

        *enabled
    }

    fn drain_link_events(&mut self) {
        let mut added = Vec::new();
        let mut closed = Vec::new();

        for (peer_id, peer) in self.tracked.iter_mut() {
            loop {
                match peer.events.try_recv() {
                    Ok(LinkEvent::Stream(remote)) => added.push((*peer_id, remote)),
                    Ok(LinkEvent::Error(error)) => {
                        debug!("Media link to peer {} failed: {}", peer_id, error);
                        closed.push(*peer_id);
                        break;
                    }
                    Ok(LinkEvent::Closed) | Err(TryRecvError::Closed) => {
                        closed.push(*peer_id);
                        break;
                    }
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty) => {
                        if peer.link.is_closed() {
                            closed.push(*peer_id);
                        }
                        break;
                    }
                }
            }
        }

        for (peer_id, remote) in added {
            self.stream_added(peer_id, remote);
        }

        for peer_id in closed {
            self.handle_peer_close(peer_id);
        }
    }

    fn stream_added(&mut self, peer_id: ClientId, remote: RemoteStream) {
        if self.remote_streams.get(&peer_id) == Some(&remote) {
            return;
        }

        debug!("Received media stream from peer {}", peer_id);
        self.remote_streams.insert(peer_id, remote.clone());

        if let Some(callback) = self.on_stream_added.as_mut() {
            callback(peer_id, &remote);
        }
    }

    fn handle_peer_close(&mut self, peer_id: ClientId) {
        self.tracked.remove(&peer_id);

        if self.remote_streams.remove(&peer_id).is_none() {
            return;
        }

        debug!("Media stream from peer {} ended", peer_id);

        if let Some(callback) = self.on_stream_removed.as_mut() {
            callback(peer_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use anyhow::bail;

    use super::*;
    use crate::{
        media::media_devices::NoDevices,
        mesh::local_bus::{LocalBus, LocalEndpoint},
    };

    struct AudioOnlyDevices;

    impl MediaDevices for AudioOnlyDevices {
        async fn get_user_media(&self, constraints: &MediaConstraints) -> anyhow::Result<LocalStream> {
            if constraints.video.is_some() {
                bail!("camera denied");
            }

            Ok(LocalStream::new(vec![(TrackKind::Audio, "mic".to_string())]))
        }
    }

    struct FullDevices;

    impl MediaDevices for FullDevices {
        async fn get_user_media(&self, _constraints: &MediaConstraints) -> anyhow::Result<LocalStream> {
            Ok(LocalStream::new(vec![
                (TrackKind::Video, "cam".to_string()),
                (TrackKind::Audio, "mic".to_string()),
            ]))
        }
    }

    fn pair(bus: &LocalBus) -> (LocalEndpoint, LocalEndpoint) {
        (bus.join("room", 1), bus.join("room", 2))
    }

    #[tokio::test]
    async fn falls_back_to_audio_only() {
        let mut media = MediaSession::new(MediaConfig::default());

        let stream = media.start(&AudioOnlyDevices, Instant::now()).await.unwrap();

        assert!(!stream.has(TrackKind::Video));
        assert!(!media.has_video());
    }

    #[tokio::test]
    async fn total_denial_leaves_session_idle() {
        let mut media = MediaSession::new(MediaConfig::default());

        assert!(media.start(&NoDevices, Instant::now()).await.is_none());
        assert!(!media.toggle_video());
        assert!(!media.toggle_audio());
    }

    #[tokio::test]
    async fn toggles_flip_track_state() {
        let mut media = MediaSession::new(MediaConfig::default());
        let stream = media.start(&FullDevices, Instant::now()).await.unwrap();

        assert!(!media.toggle_video());
        assert!(stream.tracks_of(TrackKind::Video).all(|track| !track.is_enabled()));
        assert!(media.toggle_video());
        assert!(!media.toggle_audio());
    }

    #[tokio::test]
    async fn first_check_waits_for_the_delay() {
        let bus = LocalBus::new();
        let (a, _b) = pair(&bus);
        let start = Instant::now();
        let mut media = MediaSession::new(MediaConfig::default());
        media.start(&FullDevices, start).await;

        media.tick(&a, start + Duration::from_millis(100));
        assert_eq!(media.tracked_peers().count(), 0);

        media.tick(&a, start + Duration::from_millis(500));
        assert_eq!(media.tracked_peers().collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn streams_flow_both_ways_and_end_with_the_link() {
        let bus = LocalBus::new();
        let (mut a, b) = pair(&bus);
        let start = Instant::now();

        let mut media_a = MediaSession::new(MediaConfig::default());
        let mut media_b = MediaSession::new(MediaConfig::default());
        media_a.start(&FullDevices, start).await;
        media_b.start(&AudioOnlyDevices, start).await;

        let removed = Rc::new(RefCell::new(Vec::new()));
        let removed_in_callback = removed.clone();
        media_b.on_stream_removed(move |peer_id| removed_in_callback.borrow_mut().push(peer_id));

        media_a.check_connections(&a);
        media_b.check_connections(&b);
        media_a.tick(&a, start);
        media_b.tick(&b, start);

        assert!(media_a.remote_streams()[&2].has(TrackKind::Audio));
        assert!(media_b.remote_streams()[&1].has(TrackKind::Video));

        a.close();
        media_b.tick(&b, start);

        assert!(media_b.remote_streams().is_empty());
        assert_eq!(*removed.borrow(), vec![1]);
    }

    #[tokio::test]
    async fn silently_dropped_links_are_reconciled() {
        let bus = LocalBus::new();
        let (a, _b) = pair(&bus);
        let mut media = MediaSession::new(MediaConfig::default());
        media.start(&FullDevices, Instant::now()).await;

        media.check_connections(&a);
        assert_eq!(media.tracked_peers().count(), 1);

        bus.sever("room", 1, 2);
        media.check_connections(&a);

        assert_eq!(media.tracked_peers().count(), 0);
    }

    #[tokio::test]
    async fn removal_without_a_stream_fires_nothing() {
        let bus = LocalBus::new();
        let (a, mut b) = pair(&bus);
        let mut media = MediaSession::new(MediaConfig::default());
        media.start(&FullDevices, Instant::now()).await;

        let removed = Rc::new(RefCell::new(0));
        let counter = removed.clone();
        media.on_stream_removed(move |_| *counter.borrow_mut() += 1);

        media.check_connections(&a);
        b.close();
        media.tick(&a, Instant::now());

        assert_eq!(*removed.borrow(), 0);
        assert_eq!(media.tracked_peers().count(), 0);
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let mut media = MediaSession::new(MediaConfig::default());
        let stream = media.start(&FullDevices, Instant::now()).await.unwrap();

        media.destroy();
        media.destroy();

        assert!(!stream.is_live());
        assert!(media.local_stream().is_none());
    }
}
