use core::error::Error;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use futures::{SinkExt, StreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::{
    ClientId,
    media::local_stream::{LocalStream, RemoteStream},
    mesh::{
        lock,
        peer_mesh::{LinkEvent, MeshEvent, MeshMessage, PeerLink},
    },
};

const LINK_EVENT_CAPACITY: usize = 32;

/// Frames exchanged over a direct peer connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum LinkFrame {
    Hello { client_id: ClientId, topic: String },
    Mesh { message: MeshMessage },
    MediaOffer { stream: RemoteStream },
}

impl LinkFrame {
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::text(serde_json::to_string(self)?))
    }

    /// `None` for control frames; `Some(Err)` for data that does not parse.
    pub fn from_message(message: &Message) -> Option<Result<Self, serde_json::Error>> {
        match message {
            Message::Text(text) => Some(serde_json::from_str(text.as_str())),
            Message::Binary(bytes) => Some(serde_json::from_slice(bytes)),
            _ => None,
        }
    }
}

/// A direct websocket connection to one peer.
pub struct WsPeerLink {
    peer_id: ClientId,
    dialed_by: ClientId,
    out_tx: mpsc::UnboundedSender<LinkFrame>,
    events_tx: broadcast::Sender<LinkEvent>,
    closed: AtomicBool,
    remote_stream: Mutex<Option<RemoteStream>>,
    cancel: CancellationToken,
}

impl WsPeerLink {
    pub fn new(
        peer_id: ClientId,
        dialed_by: ClientId,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkFrame>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(LINK_EVENT_CAPACITY);

        let link = Arc::new(Self {
            peer_id,
            dialed_by,
            out_tx,
            events_tx,
            closed: AtomicBool::new(false),
            remote_stream: Mutex::new(None),
            cancel: CancellationToken::new(),
        });

        (link, out_rx)
    }

    /// The client that opened the underlying connection.
    pub fn dialed_by(&self) -> ClientId {
        self.dialed_by
    }

    pub fn send_message(&self, message: &MeshMessage) {
        if !self.is_closed() {
            let _ = self.out_tx.send(LinkFrame::Mesh {
                message: message.clone(),
            });
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn mark_closed(&self, error: Option<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(error) = error {
            let _ = self.events_tx.send(LinkEvent::Error(error));
        }

        let _ = self.events_tx.send(LinkEvent::Closed);
    }

    /// Waits for the peer's hello, skipping control frames.
    pub async fn read_hello<S>(
        ws: &mut WebSocketStream<S>,
    ) -> Result<(ClientId, String), Box<dyn Error + Send + Sync>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(message) = ws.next().await {
            match LinkFrame::from_message(&message?) {
                Some(Ok(LinkFrame::Hello { client_id, topic })) => return Ok((client_id, topic)),
                Some(_) => return Err("expected hello frame".into()),
                None => continue,
            }
        }

        Err("connection closed during hello".into())
    }

    pub async fn run<S>(
        self: Arc<Self>,
        ws: WebSocketStream<S>,
        mut out_rx: mpsc::UnboundedReceiver<LinkFrame>,
        mesh_events: mpsc::UnboundedSender<MeshEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut ws_write, mut ws_read) = ws.split();

        loop {
            tokio::select! {

                _ = shutdown.cancelled() => break,

                _ = self.cancel.cancelled() => break,

                frame = ws_read.next() => {
                    let message = match frame {
                        None => break,
                        Some(result) => result?,
                    };

                    if let Message::Close(_) = message {
                        break;
                    }

                    match LinkFrame::from_message(&message) {
                        Some(Ok(LinkFrame::Mesh { message })) => {
                            let _ = mesh_events.send(MeshEvent::Message { from: self.peer_id, message });
                        }
                        Some(Ok(LinkFrame::MediaOffer { stream })) => {
                            *lock(&self.remote_stream) = Some(stream.clone());
                            let _ = self.events_tx.send(LinkEvent::Stream(stream));
                        }
                        Some(Ok(LinkFrame::Hello { .. })) | None => {}
                        Some(Err(e)) => {
                            debug!("Dropping malformed frame from peer {}: {}", self.peer_id, e);
                        }
                    }
                }

                Some(frame) = out_rx.recv() => {
                    ws_write.send(frame.to_message()?).await?;
                }
            }
        }

        // Frames queued before shutdown, such as a presence removal, still go out.
        while let Ok(frame) = out_rx.try_recv() {
            let Ok(message) = frame.to_message() else {
                continue;
            };

            if ws_write.send(message).await.is_err() {
                break;
            }
        }

        let _ = ws_write.close().await;

        Ok(())
    }
}

impl PeerLink for WsPeerLink {
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

        self.out_tx.send(LinkFrame::MediaOffer {
            stream: stream.describe(),
        })?;

        Ok(())
    }

    fn remote_stream(&self) -> Option<RemoteStream> {
        lock(&self.remote_stream).clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }
}
