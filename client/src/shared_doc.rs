use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    ClientId,
    doc_change::{DocChange, Origin, Region},
    player::{Direction, PlayerTransform},
    session_mode::SessionMode,
};

const OBSERVER_CAPACITY: usize = 256;

pub const KEY_X: &str = "x";
pub const KEY_Y: &str = "y";
pub const KEY_DIRECTION: &str = "direction";
pub const KEY_MOVING: &str = "moving";
pub const KEY_MAP_TEXT: &str = "text";
pub const KEY_MAP_UPDATED_BY: &str = "updatedBy";
pub const KEY_MODE: &str = "mode";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum DocValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl DocValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DocValue::Float(value) => Some(*value),
            DocValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DocValue::Int(value) => Some(*value),
            DocValue::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DocValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<f64> for DocValue {
    fn from(value: f64) -> Self {
        DocValue::Float(value)
    }
}

impl From<i64> for DocValue {
    fn from(value: i64) -> Self {
        DocValue::Int(value)
    }
}

impl From<bool> for DocValue {
    fn from(value: bool) -> Self {
        DocValue::Bool(value)
    }
}

impl From<String> for DocValue {
    fn from(value: String) -> Self {
        DocValue::Text(value)
    }
}

impl From<&str> for DocValue {
    fn from(value: &str) -> Self {
        DocValue::Text(value.to_string())
    }
}

impl From<Direction> for DocValue {
    fn from(value: Direction) -> Self {
        DocValue::Int(u8::from(value) as i64)
    }
}

/// Lamport clock plus writer id. Ordering is total, so every replica picks
/// the same winner for concurrent writes to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub clock: u64,
    pub client: ClientId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocEntry {
    pub region: Region,
    pub key: String,
    pub value: DocValue,
    pub stamp: Stamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocUpdate {
    pub entries: Vec<DocEntry>,
}

impl DocUpdate {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Staged writes of one `SharedDoc::transact` call.
#[derive(Debug, Default)]
pub struct Transaction {
    writes: BTreeMap<(Region, String), DocValue>,
}

impl Transaction {
    pub fn set(&mut self, region: Region, key: &str, value: impl Into<DocValue>) {
        self.writes.insert((region, key.to_string()), value.into());
    }
}

/// Receiving side of `SharedDoc::observe`.
pub struct DocObserver {
    rx: broadcast::Receiver<DocChange>,
}

impl DocObserver {
    pub fn try_next(&mut self) -> Option<DocChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Document observer lagged, {} changes skipped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Replicated key/value document with last-writer-wins registers.
pub struct SharedDoc {
    client_id: ClientId,
    clock: u64,
    entries: HashMap<(Region, String), (DocValue, Stamp)>,
    changes_tx: broadcast::Sender<DocChange>,
    outbox: Vec<DocUpdate>,
}

impl SharedDoc {
    pub fn new(client_id: ClientId) -> Self {
        let (changes_tx, _) = broadcast::channel(OBSERVER_CAPACITY);

        Self {
            client_id,
            clock: 0,
            entries: HashMap::new(),
            changes_tx,
            outbox: Vec::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn observe(&self) -> DocObserver {
        DocObserver {
            rx: self.changes_tx.subscribe(),
        }
    }

    pub fn get(&self, region: Region, key: &str) -> Option<&DocValue> {
        self.entries
            .get(&(region, key.to_string()))
            .map(|(value, _)| value)
    }

    pub fn stamp_of(&self, region: Region, key: &str) -> Option<Stamp> {
        self.entries
            .get(&(region, key.to_string()))
            .map(|(_, stamp)| *stamp)
    }

    /// Applies the staged writes as one unit, queues them for peers and
    /// notifies observers with a local origin.
    pub fn transact<F>(&mut self, build: F) -> Option<DocUpdate>
    where
        F: FnOnce(&mut Transaction),
    {
        let mut transaction = Transaction::default();
        build(&mut transaction);

        if transaction.writes.is_empty() {
            return None;
        }

        self.clock += 1;
        let stamp = Stamp {
            clock: self.clock,
            client: self.client_id,
        };

        let mut update = DocUpdate::default();
        let mut touched: BTreeMap<Region, BTreeSet<String>> = BTreeMap::new();

        for ((region, key), value) in transaction.writes {
            self.entries
                .insert((region, key.clone()), (value.clone(), stamp));
            touched.entry(region).or_default().insert(key.clone());
            update.entries.push(DocEntry {
                region,
                key,
                value,
                stamp,
            });
        }

        self.notify(Origin::Local, touched);
        self.outbox.push(update.clone());

        Some(update)
    }

    /// Merges a peer's update. Entries older than what is held are skipped,
    /// which makes repeated delivery harmless. Returns the number applied.
    pub fn apply_remote(&mut self, update: &DocUpdate) -> usize {
        let mut touched: BTreeMap<Region, BTreeSet<String>> = BTreeMap::new();

        for entry in &update.entries {
            self.clock = self.clock.max(entry.stamp.clock);

            let slot = (entry.region, entry.key.clone());
            let newer = match self.entries.get(&slot) {
                Some((_, held)) => entry.stamp > *held,
                None => true,
            };

            if !newer {
                continue;
            }

            self.entries.insert(slot, (entry.value.clone(), entry.stamp));
            touched
                .entry(entry.region)
                .or_default()
                .insert(entry.key.clone());
        }

        let applied = touched.values().map(BTreeSet::len).sum();

        if applied > 0 {
            debug!("Applied {} remote document entries", applied);
        }

        self.notify(Origin::Remote, touched);

        applied
    }

    /// The whole document as one update, for peers that just connected.
    pub fn snapshot(&self) -> DocUpdate {
        let mut entries: Vec<DocEntry> = self
            .entries
            .iter()
            .map(|((region, key), (value, stamp))| DocEntry {
                region: *region,
                key: key.clone(),
                value: value.clone(),
                stamp: *stamp,
            })
            .collect();

        entries.sort_by(|a, b| (a.region, &a.key).cmp(&(b.region, &b.key)));

        DocUpdate { entries }
    }

    pub fn take_outbox(&mut self) -> Vec<DocUpdate> {
        std::mem::take(&mut self.outbox)
    }

    pub fn player_transform(&self) -> Option<PlayerTransform> {
        Some(PlayerTransform {
            x: self.get(Region::Player, KEY_X)?.as_f64()?,
            y: self.get(Region::Player, KEY_Y)?.as_f64()?,
            direction: self.player_direction()?,
            moving: self.get(Region::Player, KEY_MOVING)?.as_bool()?,
        })
    }

    /// Fills any field the document does not hold from `fallback`.
    pub fn player_transform_or(&self, fallback: PlayerTransform) -> PlayerTransform {
        PlayerTransform {
            x: self
                .get(Region::Player, KEY_X)
                .and_then(DocValue::as_f64)
                .unwrap_or(fallback.x),
            y: self
                .get(Region::Player, KEY_Y)
                .and_then(DocValue::as_f64)
                .unwrap_or(fallback.y),
            direction: self.player_direction().unwrap_or(fallback.direction),
            moving: self
                .get(Region::Player, KEY_MOVING)
                .and_then(DocValue::as_bool)
                .unwrap_or(fallback.moving),
        }
    }

    pub fn set_player_transform(&mut self, transform: PlayerTransform) -> Option<DocUpdate> {
        self.transact(|txn| {
            txn.set(Region::Player, KEY_X, transform.x);
            txn.set(Region::Player, KEY_Y, transform.y);
            txn.set(Region::Player, KEY_DIRECTION, transform.direction);
            txn.set(Region::Player, KEY_MOVING, transform.moving);
        })
    }

    pub fn map_text(&self) -> Option<&str> {
        self.get(Region::SvgMap, KEY_MAP_TEXT)?.as_str()
    }

    pub fn map_updated_by(&self) -> Option<ClientId> {
        let value = self.get(Region::SvgMap, KEY_MAP_UPDATED_BY)?.as_i64()?;

        ClientId::try_from(value).ok()
    }

    pub fn set_map_text(&mut self, text: &str) -> Option<DocUpdate> {
        let client_id = self.client_id;

        self.transact(|txn| {
            txn.set(Region::SvgMap, KEY_MAP_TEXT, text);
            txn.set(Region::SvgMap, KEY_MAP_UPDATED_BY, client_id as i64);
        })
    }

    pub fn mode(&self) -> Option<SessionMode> {
        self.get(Region::Settings, KEY_MODE)?.as_str()?.parse().ok()
    }

    pub fn set_mode(&mut self, mode: SessionMode) -> Option<DocUpdate> {
        self.transact(|txn| txn.set(Region::Settings, KEY_MODE, mode.to_string()))
    }

    fn player_direction(&self) -> Option<Direction> {
        let index = self.get(Region::Player, KEY_DIRECTION)?.as_i64()?;

        Direction::try_from(index).ok()
    }

    fn notify(&self, origin: Origin, touched: BTreeMap<Region, BTreeSet<String>>) {
        for (region, keys) in touched {
            // No observers is fine; changes are only interesting to listeners.
            let _ = self.changes_tx.send(DocChange {
                origin,
                region,
                keys,
            });
        }
    }
}
