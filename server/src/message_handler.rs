use core::error::Error;

use log::debug;
use serde_json::Value;
use shared::signal_message::SignalMessage;
use tokio_tungstenite::tungstenite::Message;

use crate::topic_registry::{ConnectionId, TopicRegistry};

pub struct MessageHandler;

impl MessageHandler {
    pub fn handle_message(
        incoming_message: SignalMessage,
        conn_id: ConnectionId,
        registry: &mut TopicRegistry,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        match incoming_message {
            SignalMessage::Subscribe { topics } => {
                registry.subscribe(conn_id, &topics);
            }

            SignalMessage::Unsubscribe { topics } => {
                registry.unsubscribe(conn_id, &topics);
            }

            SignalMessage::Publish { topic, payload, .. } => {
                if topic.is_empty() {
                    return Ok(());
                }

                let receivers = registry.receivers(&topic, conn_id);

                if receivers.is_empty() {
                    debug!("No subscribers for '{}', dropping publish", topic);
                    return Ok(());
                }

                let outgoing_message = SignalMessage::Publish {
                    topic,
                    clients: Some(Value::from(receivers.len())),
                    payload,
                };
                let frame = Message::text(outgoing_message.to_json()?);

                for receiver in receivers {
                    // A closed receiver is cleaned up by its own connection task.
                    let _ = receiver.send(frame.clone());
                }
            }

            SignalMessage::Ping => {
                if let Some(tx) = registry.sender(conn_id) {
                    let _ = tx.send(Message::text(SignalMessage::Pong.to_json()?));
                }
            }

            SignalMessage::Pong => {}
        }

        Ok(())
    }
}
