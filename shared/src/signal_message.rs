use core::error::Error;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum_macros::IntoStaticStr;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::received_signal_message::ReceivedSignalMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SignalMessage {
    Subscribe {
        #[serde(default, deserialize_with = "string_topics")]
        topics: Vec<String>,
    },
    Unsubscribe {
        #[serde(default, deserialize_with = "string_topics")]
        topics: Vec<String>,
    },
    Publish {
        topic: String,
        /// Receiver count stamped by the relay; any incoming value is replaced.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clients: Option<Value>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    Ping,
    Pong,
}

// Non-string entries are skipped instead of failing the whole envelope.
fn string_topics<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();

    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(topic) => Some(topic),
            _ => None,
        })
        .collect())
}

impl SignalMessage {
    pub fn publish(topic: &str, payload: Map<String, Value>) -> Self {
        SignalMessage::Publish {
            topic: topic.to_string(),
            clients: None,
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.into()
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub async fn write_to_stream<W>(&self, sink: &mut W) -> Result<(), Box<dyn Error + Send + Sync>>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        sink.send(Message::text(self.to_json()?)).await?;

        Ok(())
    }

    pub async fn read_from_stream<R>(
        stream: &mut R,
    ) -> Result<ReceivedSignalMessage, Box<dyn Error + Send + Sync>>
    where
        R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let message = match stream.next().await {
            None => return Ok(ReceivedSignalMessage::EOF),
            Some(result) => result?,
        };

        Ok(ReceivedSignalMessage::from_frame(message))
    }
}
