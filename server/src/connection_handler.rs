use core::error::Error;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{received_signal_message::ReceivedSignalMessage, signal_message::SignalMessage};
use tokio::{
    net::TcpStream,
    sync::{RwLock, mpsc},
    time::{Instant, interval_at, timeout},
};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::{
    health_check::HealthCheck,
    message_handler::MessageHandler,
    signaling_server::RelayConfig,
    topic_registry::{ConnectionId, TopicRegistry},
};

pub struct ConnectionHandler;

impl ConnectionHandler {
    /// Answers a plain HTTP request with the health check, or completes the
    /// websocket upgrade.
    async fn upgrade(
        stream: TcpStream,
        conn_id: ConnectionId,
    ) -> Result<Option<WebSocketStream<TcpStream>>, Box<dyn Error + Send + Sync>> {
        if !HealthCheck::is_websocket_upgrade(&stream).await? {
            debug!("Connection {} is a plain HTTP request", conn_id);
            HealthCheck::respond(stream).await?;
            return Ok(None);
        }

        Ok(Some(accept_async(stream).await?))
    }

    pub async fn handle_stream(
        stream: TcpStream,
        conn_id: ConnectionId,
        registry: Arc<RwLock<TopicRegistry>>,
        config: RelayConfig,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let ws_stream = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            result = timeout(config.handshake_timeout, Self::upgrade(stream, conn_id)) => match result {
                Ok(Ok(Some(ws_stream))) => ws_stream,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    info!("Connection {} did not finish its handshake, closing", conn_id);
                    return Ok(());
                }
            },
        };

        let ping_interval = config.ping_interval;
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        registry.write().await.register(conn_id, outgoing_tx);

        let mut ping_timer = interval_at(Instant::now() + ping_interval, ping_interval);
        let mut pong_received = true;

        loop {
            tokio::select! {

                _ = shutdown.cancelled() => {
                    break;
                }

                result = SignalMessage::read_from_stream(&mut ws_read) => {
                    match result? {
                        ReceivedSignalMessage::EOF => break,
                        ReceivedSignalMessage::Message(incoming_message) => {
                            let mut registry = registry.write().await;
                            MessageHandler::handle_message(incoming_message, conn_id, &mut registry)?;
                        }
                        ReceivedSignalMessage::Pong => {
                            pong_received = true;
                        }
                        ReceivedSignalMessage::Control => {}
                        ReceivedSignalMessage::Malformed(reason) => {
                            debug!("Dropping malformed envelope from {}: {}", conn_id, reason);
                        }
                    }
                }

                Some(outgoing_message) = outgoing_rx.recv() => {
                    ws_write.send(outgoing_message).await?;
                }

                _ = ping_timer.tick() => {
                    if !pong_received {
                        info!("Connection {} missed a ping, closing", conn_id);
                        break;
                    }

                    pong_received = false;
                    ws_write.send(Message::Ping(Default::default())).await?;
                }
            }
        }

        let _ = ws_write.close().await;

        Ok(())
    }
}
