use core::error::Error;
use std::time::Duration;

use shared::HEALTH_CHECK_BODY;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::sleep,
};

const MAX_HEADER_BYTES: usize = 8192;

pub struct HealthCheck;

impl HealthCheck {
    /// Peeks at the request head without consuming it so the websocket
    /// handshake can still read the full request afterwards. Waits until the
    /// head is complete; callers bound the wait.
    pub async fn is_websocket_upgrade(
        stream: &TcpStream,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let mut buf = vec![0; MAX_HEADER_BYTES];

        loop {
            let n = stream.peek(&mut buf).await?;

            if n == 0 {
                return Ok(false);
            }

            let head = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();

            if head.contains("\r\n\r\n") || n == buf.len() {
                return Ok(Self::has_upgrade_header(&head));
            }

            sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn respond(mut stream: TcpStream) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut buf = vec![0; MAX_HEADER_BYTES];
        let _ = stream.read(&mut buf).await?;

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            HEALTH_CHECK_BODY.len(),
            HEALTH_CHECK_BODY
        );

        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;

        Ok(())
    }

    fn has_upgrade_header(head: &str) -> bool {
        head.lines().any(|line| {
            line.strip_prefix("upgrade:")
                .is_some_and(|value| value.contains("websocket"))
        })
    }
}
