pub mod received_signal_message;
pub mod room_id;
pub mod signal_message;

use std::time::Duration;

pub use room_id::{RoomId, RoomIdError};

pub const DEFAULT_SIGNALING_PORT: u16 = 4444;

pub const PING_INTERVAL: Duration = Duration::from_secs(30);

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub const ROOM_TOPIC_PREFIX: &str = "hf-game-";

pub const HEALTH_CHECK_BODY: &str = "y-webrtc signaling server OK";

pub fn room_topic(room_id: &RoomId) -> String {
    format!("{}{}", ROOM_TOPIC_PREFIX, room_id)
}
