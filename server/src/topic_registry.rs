use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;

pub type ConnectionId = u64;

struct ConnectionEntry {
    tx: UnboundedSender<Message>,
    topics: HashSet<String>,
}

#[derive(Default)]
pub struct TopicRegistry {
    topics: HashMap<String, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn_id: ConnectionId, tx: UnboundedSender<Message>) {
        self.connections.insert(
            conn_id,
            ConnectionEntry {
                tx,
                topics: HashSet::new(),
            },
        );
    }

    pub fn subscribe(&mut self, conn_id: ConnectionId, topics: &[String]) {
        let Some(entry) = self.connections.get_mut(&conn_id) else {
            return;
        };

        for topic in topics {
            self.topics
                .entry(topic.clone())
                .or_default()
                .insert(conn_id);
            entry.topics.insert(topic.clone());
        }
    }

    pub fn unsubscribe(&mut self, conn_id: ConnectionId, topics: &[String]) {
        if let Some(entry) = self.connections.get_mut(&conn_id) {
            for topic in topics {
                entry.topics.remove(topic);
            }
        }

        for topic in topics {
            self.leave_topic(conn_id, topic);
        }
    }

    /// Senders of every subscriber of `topic` except `from`.
    pub fn receivers(&self, topic: &str, from: ConnectionId) -> Vec<UnboundedSender<Message>> {
        let Some(subscribers) = self.topics.get(topic) else {
            return Vec::new();
        };

        subscribers
            .iter()
            .filter(|conn_id| **conn_id != from)
            .filter_map(|conn_id| self.connections.get(conn_id))
            .map(|entry| entry.tx.clone())
            .collect()
    }

    pub fn sender(&self, conn_id: ConnectionId) -> Option<UnboundedSender<Message>> {
        self.connections.get(&conn_id).map(|entry| entry.tx.clone())
    }

    pub fn remove_connection(&mut self, conn_id: ConnectionId) {
        let Some(entry) = self.connections.remove(&conn_id) else {
            return;
        };

        for topic in &entry.topics {
            self.leave_topic(conn_id, topic);
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |subscribers| subscribers.len())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn leave_topic(&mut self, conn_id: ConnectionId, topic: &str) {
        if let Some(subscribers) = self.topics.get_mut(topic) {
            subscribers.remove(&conn_id);

            if subscribers.is_empty() {
                self.topics.remove(topic);
            }
        }
    }
}
