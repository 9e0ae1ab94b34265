use core::error::Error;
use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr},
    ops::RangeInclusive,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{
    DEFAULT_SIGNALING_PORT, RoomId, received_signal_message::ReceivedSignalMessage, room_topic,
    signal_message::SignalMessage,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::{MissedTickBehavior, interval, sleep, timeout},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};
use tokio_util::sync::CancellationToken;

use crate::{
    ClientId,
    mesh::{
        lock,
        loopback_beacon::{Beacon, LoopbackBeacon},
        peer_mesh::{MeshEvent, MeshMessage, PeerLink, PeerMesh},
        signal_data::{PeerSignal, SignalData},
        ws_peer_link::{LinkFrame, WsPeerLink},
    },
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_LOOPBACK_PORTS: RangeInclusive<u16> = 47600..=47615;

type LinkRegistry = Arc<Mutex<HashMap<ClientId, Arc<WsPeerLink>>>>;
type SignalingStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub signaling_urls: Vec<String>,
    pub listen_addr: String,
    /// Host peers should dial to reach the link listener.
    pub advertise_host: String,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    /// How long the answering side waits for the offerer to dial before
    /// dialing back itself.
    pub answer_dial_delay: Duration,
    /// UDP ports on 127.0.0.1 used to find clients on this host without a
    /// relay. `None` turns same-host discovery off.
    pub loopback_ports: Option<RangeInclusive<u16>>,
    pub beacon_interval: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            signaling_urls: vec![format!("ws://localhost:{}", DEFAULT_SIGNALING_PORT)],
            listen_addr: "0.0.0.0:0".to_string(),
            advertise_host: "127.0.0.1".to_string(),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            answer_dial_delay: Duration::from_secs(1),
            loopback_ports: Some(DEFAULT_LOOPBACK_PORTS),
            beacon_interval: Duration::from_secs(1),
        }
    }
}

struct MeshContext {
    local_id: ClientId,
    topic: String,
    advertised_addr: String,
    answer_dial_delay: Duration,
    links: LinkRegistry,
    events_tx: mpsc::UnboundedSender<MeshEvent>,
    shutdown: CancellationToken,
}

impl MeshContext {
    fn has_link(&self, peer_id: ClientId) -> bool {
        lock(&self.links)
            .get(&peer_id)
            .is_some_and(|link| !link.is_closed())
    }

    fn hello(&self) -> LinkFrame {
        LinkFrame::Hello {
            client_id: self.local_id,
            topic: self.topic.clone(),
        }
    }

    /// Adopts a handshaken connection. When both peers dial each other at
    /// once, both sides keep the connection opened by the lower client id.
    fn register<S>(self: &Arc<Self>, ws: WebSocketStream<S>, peer_id: ClientId, dialed_by: ClientId)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (link, out_rx) = WsPeerLink::new(peer_id, dialed_by);
        let preferred_dialer = self.local_id.min(peer_id);

        {
            let mut links = lock(&self.links);

            match links.get(&peer_id) {
                Some(existing) if !existing.is_closed() => {
                    if dialed_by != preferred_dialer || existing.dialed_by() == preferred_dialer {
                        debug!("Dropping duplicate link to peer {}", peer_id);
                        return;
                    }

                    existing.shutdown();
                    links.insert(peer_id, link.clone());

                    // Anything queued on the replaced link is lost, so the
                    // session resends its state.
                    let _ = self.events_tx.send(MeshEvent::PeerJoined(peer_id));
                    debug!("Replaced link to peer {}", peer_id);
                }
                _ => {
                    links.insert(peer_id, link.clone());
                    let _ = self.events_tx.send(MeshEvent::PeerJoined(peer_id));
                    info!("Linked with peer {}", peer_id);
                }
            }
        }

        let ctx = self.clone();

        tokio::spawn(async move {
            let result = link
                .clone()
                .run(ws, out_rx, ctx.events_tx.clone(), ctx.shutdown.clone())
                .await;

            link.mark_closed(result.err().map(|e| e.to_string()));

            let mut links = lock(&ctx.links);

            if links
                .get(&peer_id)
                .is_some_and(|current| Arc::ptr_eq(current, &link))
            {
                links.remove(&peer_id);
                drop(links);

                info!("Link with peer {} closed", peer_id);
                let _ = ctx.events_tx.send(MeshEvent::PeerLeft(peer_id));
            }
        });
    }
}

/// Mesh that finds peers through signaling relays and then talks to them
/// over direct websocket links.
pub struct RelayMesh {
    ctx: Arc<MeshContext>,
    events_rx: mpsc::UnboundedReceiver<MeshEvent>,
}

impl RelayMesh {
    pub async fn start(
        room_id: &RoomId,
        local_id: ClientId,
        config: MeshConfig,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let port = local_addr.port();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ctx = Arc::new(MeshContext {
            local_id,
            topic: room_topic(room_id),
            advertised_addr: format!("{}:{}", config.advertise_host, port),
            answer_dial_delay: config.answer_dial_delay,
            links: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
            shutdown: CancellationToken::new(),
        });

        info!(
            "Peer links for client {} listening on {}",
            local_id, ctx.advertised_addr
        );

        tokio::spawn(Self::accept_loop(listener, ctx.clone()));

        if let Some(ports) = config.loopback_ports {
            let beacon = Beacon {
                topic: ctx.topic.clone(),
                from: local_id,
                addr: loopback_dial_addr(local_addr).to_string(),
            };

            match LoopbackBeacon::bind(ports, &beacon).await {
                Ok(beacon) => {
                    debug!("Same-host discovery on loopback port {}", beacon.port());
                    tokio::spawn(Self::loopback_loop(beacon, ctx.clone(), config.beacon_interval));
                }
                Err(e) => info!("Same-host discovery disabled: {}", e),
            }
        }

        for url in config.signaling_urls {
            tokio::spawn(Self::signaling_loop(
                url,
                ctx.clone(),
                config.reconnect_min,
                config.reconnect_max,
            ));
        }

        Ok(Self { ctx, events_rx })
    }

    pub fn advertised_addr(&self) -> &str {
        &self.ctx.advertised_addr
    }

    async fn accept_loop(listener: TcpListener, ctx: Arc<MeshContext>) {
        loop {
            tokio::select! {

                _ = ctx.shutdown.cancelled() => return,

                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            debug!("Peer accept failed: {}", e);
                            continue;
                        }
                    };

                    let ctx = ctx.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::accept_peer(stream, &ctx).await {
                            debug!("Rejected peer connection from {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        }
    }

    async fn accept_peer(
        stream: TcpStream,
        ctx: &Arc<MeshContext>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut ws = timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await??;
        let (peer_id, topic) = timeout(HANDSHAKE_TIMEOUT, WsPeerLink::read_hello(&mut ws)).await??;

        if topic != ctx.topic {
            return Err(format!("peer {} is in another room", peer_id).into());
        }

        if peer_id == ctx.local_id {
            return Err("connection from ourselves".into());
        }

        ws.send(ctx.hello().to_message()?).await?;
        ctx.register(ws, peer_id, peer_id);

        Ok(())
    }

    async fn dial(
        ctx: &Arc<MeshContext>,
        peer_id: ClientId,
        addr: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let url = format!("ws://{}", addr);
        let (mut ws, _response) = timeout(HANDSHAKE_TIMEOUT, connect_async(url.as_str())).await??;

        ws.send(ctx.hello().to_message()?).await?;
        let (remote_id, topic) = timeout(HANDSHAKE_TIMEOUT, WsPeerLink::read_hello(&mut ws)).await??;

        if remote_id != peer_id || topic != ctx.topic {
            return Err(format!("{} is not peer {} of this room", addr, peer_id).into());
        }

        ctx.register(ws, peer_id, ctx.local_id);

        Ok(())
    }

    fn spawn_dial(ctx: Arc<MeshContext>, peer_id: ClientId, addr: String, delay: Duration) {
        tokio::spawn(async move {
            tokio::select! {
                _ = ctx.shutdown.cancelled() => return,
                _ = sleep(delay) => {}
            }

            if ctx.has_link(peer_id) {
                return;
            }

            if let Err(e) = Self::dial(&ctx, peer_id, &addr).await {
                debug!("Could not reach peer {} at {}: {}", peer_id, addr, e);
            }
        });
    }

    async fn loopback_loop(beacon: LoopbackBeacon, ctx: Arc<MeshContext>, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {

                _ = ctx.shutdown.cancelled() => return,

                _ = ticker.tick() => beacon.announce().await,

                received = beacon.recv() => {
                    match received {
                        Ok(Some(seen)) => Self::handle_beacon(seen, &ctx),
                        Ok(None) => {}
                        Err(e) => debug!("Loopback receive failed: {}", e),
                    }
                }
            }
        }
    }

    /// Dials a same-host peer of this room. Only the lower client id dials,
    /// so two beacons never race into a pair of links.
    fn handle_beacon(seen: Beacon, ctx: &Arc<MeshContext>) {
        if seen.topic != ctx.topic
            || seen.from == ctx.local_id
            || ctx.local_id > seen.from
            || ctx.has_link(seen.from)
        {
            return;
        }

        debug!("Found peer {} on this host at {}", seen.from, seen.addr);
        Self::spawn_dial(ctx.clone(), seen.from, seen.addr, Duration::ZERO);
    }

    async fn signaling_loop(
        url: String,
        ctx: Arc<MeshContext>,
        reconnect_min: Duration,
        reconnect_max: Duration,
    ) {
        let mut backoff = reconnect_min;

        loop {
            let connected = tokio::select! {
                _ = ctx.shutdown.cancelled() => return,
                result = connect_async(url.as_str()) => result,
            };

            match connected {
                Ok((ws, _response)) => {
                    info!("Connected to signaling server {}", url);
                    backoff = reconnect_min;

                    if let Err(e) = Self::run_signaling(ws, &ctx).await {
                        debug!("Signaling connection to {} failed: {}", url, e);
                    }

                    if ctx.shutdown.is_cancelled() {
                        return;
                    }

                    info!("Lost signaling server {}, reconnecting", url);
                }
                Err(e) => {
                    debug!("Signaling server {} unreachable: {}", url, e);
                }
            }

            tokio::select! {
                _ = ctx.shutdown.cancelled() => return,
                _ = sleep(backoff) => {}
            }

            backoff = (backoff * 2).min(reconnect_max);
        }
    }

    async fn run_signaling(
        ws: SignalingStream,
        ctx: &Arc<MeshContext>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let (mut ws_write, mut ws_read) = ws.split();

        SignalMessage::Subscribe {
            topics: vec![ctx.topic.clone()],
        }
        .write_to_stream(&mut ws_write)
        .await?;

        SignalData::Announce { from: ctx.local_id }
            .to_publish(&ctx.topic)?
            .write_to_stream(&mut ws_write)
            .await?;

        loop {
            tokio::select! {

                _ = ctx.shutdown.cancelled() => {
                    let _ = ws_write.close().await;
                    return Ok(());
                }

                result = SignalMessage::read_from_stream(&mut ws_read) => {
                    match result? {
                        ReceivedSignalMessage::EOF => return Ok(()),
                        ReceivedSignalMessage::Message(SignalMessage::Publish { payload, .. }) => {
                            let Some(data) = SignalData::from_payload(&payload) else {
                                continue;
                            };

                            if let Some(reply) = Self::handle_signal(data, ctx) {
                                reply
                                    .to_publish(&ctx.topic)?
                                    .write_to_stream(&mut ws_write)
                                    .await?;
                            }
                        }
                        ReceivedSignalMessage::Message(_)
                        | ReceivedSignalMessage::Pong
                        | ReceivedSignalMessage::Control => {}
                        ReceivedSignalMessage::Malformed(reason) => {
                            debug!("Ignoring malformed signaling message: {}", reason);
                        }
                    }
                }
            }
        }
    }

    fn handle_signal(data: SignalData, ctx: &Arc<MeshContext>) -> Option<SignalData> {
        match data {
            SignalData::Announce { from } if from != ctx.local_id && !ctx.has_link(from) => {
                debug!("Peer {} announced, offering a link", from);

                Some(SignalData::Signal {
                    from: ctx.local_id,
                    to: from,
                    signal: PeerSignal::Offer {
                        addr: ctx.advertised_addr.clone(),
                    },
                })
            }

            SignalData::Signal { from, to, signal } if to == ctx.local_id && from != ctx.local_id => {
                match signal {
                    PeerSignal::Offer { addr } => {
                        if !ctx.has_link(from) {
                            Self::spawn_dial(ctx.clone(), from, addr, Duration::ZERO);
                        }

                        Some(SignalData::Signal {
                            from: ctx.local_id,
                            to: from,
                            signal: PeerSignal::Answer {
                                addr: ctx.advertised_addr.clone(),
                            },
                        })
                    }

                    PeerSignal::Answer { addr } => {
                        Self::spawn_dial(ctx.clone(), from, addr, ctx.answer_dial_delay);
                        None
                    }
                }
            }

            _ => None,
        }
    }
}

// A listener on every interface is reachable through loopback.
fn loopback_dial_addr(local_addr: SocketAddr) -> SocketAddr {
    if local_addr.ip().is_unspecified() {
        SocketAddr::from((Ipv4Addr::LOCALHOST, local_addr.port()))
    } else {
        local_addr
    }
}

impl PeerMesh for RelayMesh {
    fn local_id(&self) -> ClientId {
        self.ctx.local_id
    }

    fn broadcast(&self, message: &MeshMessage) {
        for link in lock(&self.ctx.links).values() {
            link.send_message(message);
        }
    }

    fn send_to(&self, peer_id: ClientId, message: &MeshMessage) {
        if let Some(link) = lock(&self.ctx.links).get(&peer_id) {
            link.send_message(message);
        }
    }

    fn try_next_event(&mut self) -> Option<MeshEvent> {
        self.events_rx.try_recv().ok()
    }

    fn live_links(&self) -> HashMap<ClientId, Arc<dyn PeerLink>> {
        lock(&self.ctx.links)
            .iter()
            .filter(|(_, link)| !link.is_closed())
            .map(|(id, link)| (*id, link.clone() as Arc<dyn PeerLink>))
            .collect()
    }

    fn close(&mut self) {
        self.ctx.shutdown.cancel();

        for link in lock(&self.ctx.links).values() {
            link.shutdown();
        }
    }
}

impl Drop for RelayMesh {
    fn drop(&mut self) {
        self.ctx.shutdown.cancel();
    }
}
