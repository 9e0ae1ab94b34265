use core::error::Error;
use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use log::{error, info};
use shared::{HANDSHAKE_TIMEOUT, PING_INTERVAL};
use tokio::{net::TcpListener, sync::RwLock};
use tokio_util::sync::CancellationToken;

use crate::{connection_handler::ConnectionHandler, topic_registry::TopicRegistry};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub ping_interval: Duration,
    /// Time a new connection gets to finish its HTTP request and websocket
    /// upgrade before it is dropped.
    pub handshake_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

pub struct SignalingServer {
    tcp_listener: TcpListener,
    config: RelayConfig,
    registry: Arc<RwLock<TopicRegistry>>,
}

impl SignalingServer {
    pub async fn bind(
        addr: &str,
        config: RelayConfig,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            tcp_listener: TcpListener::bind(addr).await?,
            config,
            registry: Arc::new(RwLock::new(TopicRegistry::new())),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp_listener.local_addr()
    }

    pub fn registry(&self) -> Arc<RwLock<TopicRegistry>> {
        self.registry.clone()
    }

    pub async fn listen(self, shutdown: CancellationToken) -> Result<(), Box<dyn Error + Send + Sync>> {
        loop {
            tokio::select! {

                _ = shutdown.cancelled() => {
                    info!("Signaling server shutting down");
                    return Ok(());
                }

                result = self.tcp_listener.accept() => {

                    let (tcp_socket, peer_addr) = result?;
                    let conn_id: u64 = rand::random();
                    let registry = self.registry.clone();
                    let config = self.config.clone();
                    let shutdown = shutdown.clone();

                    info!("Connection {} accepted from {}", conn_id, peer_addr);

                    tokio::spawn(async move {

                        if let Err(e) = ConnectionHandler::handle_stream(tcp_socket, conn_id, registry.clone(), config, shutdown).await {

                            error!("Error handling connection {}: {}", conn_id, e);
                        }

                        registry.write().await.remove_connection(conn_id);
                        info!("Connection {} closed", conn_id);
                    });
                }
            }
        }
    }
}
