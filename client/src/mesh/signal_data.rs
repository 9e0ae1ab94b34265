use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::signal_message::SignalMessage;

use crate::ClientId;

const DATA_FIELD: &str = "data";

/// How to reach a peer's direct link listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PeerSignal {
    Offer { addr: String },
    Answer { addr: String },
}

/// What peers put in the `data` field of a relay publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalData {
    Announce {
        from: ClientId,
    },
    Signal {
        from: ClientId,
        to: ClientId,
        signal: PeerSignal,
    },
}

impl SignalData {
    pub fn to_publish(&self, topic: &str) -> Result<SignalMessage, serde_json::Error> {
        let mut payload = Map::new();
        payload.insert(DATA_FIELD.to_string(), serde_json::to_value(self)?);

        Ok(SignalMessage::publish(topic, payload))
    }

    /// Reads the signal out of a publish payload. Payloads written by other
    /// kinds of clients yield `None`.
    pub fn from_payload(payload: &Map<String, Value>) -> Option<Self> {
        serde_json::from_value(payload.get(DATA_FIELD)?.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn signal_rides_in_the_data_field() {
        let data = SignalData::Signal {
            from: 1,
            to: 2,
            signal: PeerSignal::Offer {
                addr: "127.0.0.1:9000".to_string(),
            },
        };

        let message = data.to_publish("hf-game-abc").unwrap();
        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "publish",
                "topic": "hf-game-abc",
                "data": {"type": "signal", "from": 1, "to": 2, "signal": {"type": "offer", "addr": "127.0.0.1:9000"}}
            })
        );
    }

    #[test]
    fn foreign_payloads_are_ignored() {
        let mut payload = Map::new();
        payload.insert("data".to_string(), json!({"type": "sdp", "blob": "x"}));

        assert_eq!(SignalData::from_payload(&payload), None);
        assert_eq!(SignalData::from_payload(&Map::new()), None);
    }
}
