use tokio_tungstenite::tungstenite::Message;

use crate::signal_message::SignalMessage;

#[derive(Debug)]
pub enum ReceivedSignalMessage {
    EOF,
    Message(SignalMessage),
    Pong,
    Control,
    Malformed(String),
}

impl ReceivedSignalMessage {
    pub fn from_frame(frame: Message) -> Self {
        match frame {
            Message::Text(_) | Message::Binary(_) => {
                let text = match frame.to_text() {
                    Ok(text) => text,
                    Err(e) => return ReceivedSignalMessage::Malformed(e.to_string()),
                };

                match SignalMessage::parse(text) {
                    Ok(message) => ReceivedSignalMessage::Message(message),
                    Err(e) => ReceivedSignalMessage::Malformed(e.to_string()),
                }
            }
            Message::Pong(_) => ReceivedSignalMessage::Pong,
            Message::Close(_) => ReceivedSignalMessage::EOF,
            Message::Ping(_) | Message::Frame(_) => ReceivedSignalMessage::Control,
        }
    }
}
