pub mod connection_handler;
pub mod health_check;
pub mod message_handler;
pub mod signaling_server;
pub mod topic_registry;

pub use signaling_server::{RelayConfig, SignalingServer};
