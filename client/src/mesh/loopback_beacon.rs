use core::error::Error;
use std::{
    io::{self, ErrorKind},
    net::Ipv4Addr,
    ops::RangeInclusive,
};

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use crate::ClientId;

const MAX_BEACON_SIZE: usize = 1024;

/// Tells other clients on this host where to dial for a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub topic: String,
    pub from: ClientId,
    pub addr: String,
}

impl Beacon {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// UDP socket on 127.0.0.1 that sends and hears beacons. Every client
/// takes the first free port of a shared range and beacons to the rest.
pub struct LoopbackBeacon {
    socket: UdpSocket,
    port: u16,
    ports: RangeInclusive<u16>,
    beacon: Vec<u8>,
}

impl LoopbackBeacon {
    pub async fn bind(
        ports: RangeInclusive<u16>,
        beacon: &Beacon,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let beacon = beacon.to_bytes()?;

        for port in ports.clone() {
            match UdpSocket::bind((Ipv4Addr::LOCALHOST, port)).await {
                Ok(socket) => {
                    return Ok(Self {
                        socket,
                        port,
                        ports,
                        beacon,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(format!(
            "no free loopback port in {}..={}",
            ports.start(),
            ports.end()
        )
        .into())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sends the beacon to every other port of the range. Unused ports
    /// simply drop it.
    pub async fn announce(&self) {
        for port in self.ports.clone().filter(|port| *port != self.port) {
            if let Err(e) = self
                .socket
                .send_to(&self.beacon, (Ipv4Addr::LOCALHOST, port))
                .await
            {
                debug!("Beacon to loopback port {} failed: {}", port, e);
            }
        }
    }

    /// Waits for the next beacon. Datagrams that are not beacons, or that
    /// come from outside the host, yield `None`.
    pub async fn recv(&self) -> io::Result<Option<Beacon>> {
        let mut buf = [0u8; MAX_BEACON_SIZE];
        let (len, sender) = self.socket.recv_from(&mut buf).await?;

        if !sender.ip().is_loopback() {
            return Ok(None);
        }

        match Beacon::from_bytes(&buf[..len]) {
            Ok(beacon) => Ok(Some(beacon)),
            Err(e) => {
                debug!("Ignoring datagram from {}: {}", sender, e);
                Ok(None)
            }
        }
    }
}
