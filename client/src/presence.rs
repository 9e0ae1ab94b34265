use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use log::{debug, warn};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    ClientId,
    doc_change::Origin,
    identity::Profile,
    player::{Cursor, Pawn},
    presence_field::{PresenceError, PresenceField, PresenceRecord},
};

const OBSERVER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresence {
    pub profile: Option<Profile>,
    pub cursor: Option<Cursor>,
    pub pawn: Option<Pawn>,
    pub clock: u64,
    last_seen: Instant,
}

impl PeerPresence {
    fn empty(now: Instant) -> Self {
        Self {
            profile: None,
            cursor: None,
            pawn: None,
            clock: 0,
            last_seen: now,
        }
    }

    fn apply(&mut self, field: PresenceField) -> bool {
        match field {
            PresenceField::Identity(profile) => replace(&mut self.profile, Some(profile)),
            PresenceField::Cursor(cursor) => replace(&mut self.cursor, cursor),
            PresenceField::Pawn(pawn) => replace(&mut self.pawn, pawn),
        }
    }

    fn same_content(&self, other: &PeerPresence) -> bool {
        self.profile == other.profile && self.cursor == other.cursor && self.pawn == other.pawn
    }

    fn fields(&self) -> Vec<PresenceField> {
        let mut fields = Vec::with_capacity(3);

        if let Some(profile) = &self.profile {
            fields.push(PresenceField::Identity(profile.clone()));
        }

        fields.push(PresenceField::Cursor(self.cursor));
        fields.push(PresenceField::Pawn(self.pawn));

        fields
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }

    *slot = value;
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChangeKind {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    pub origin: Origin,
    pub client_id: ClientId,
    pub kind: PresenceChangeKind,
}

pub struct PresenceObserver {
    rx: broadcast::Receiver<PresenceChange>,
}

impl PresenceObserver {
    pub fn try_next(&mut self) -> Option<PresenceChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Presence observer lagged, {} changes skipped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Ephemeral per-peer state. Nothing here is persisted or merged; the
/// newest clock from each peer simply replaces what was held.
pub struct Presence {
    local_id: ClientId,
    local: PeerPresence,
    remote: BTreeMap<ClientId, PeerPresence>,
    dirty: bool,
    last_broadcast: Option<Instant>,
    changes_tx: broadcast::Sender<PresenceChange>,
}

impl Presence {
    pub fn new(local_id: ClientId, profile: Profile, now: Instant) -> Self {
        let (changes_tx, _) = broadcast::channel(OBSERVER_CAPACITY);
        let mut local = PeerPresence::empty(now);
        local.profile = Some(profile);
        local.clock = 1;

        Self {
            local_id,
            local,
            remote: BTreeMap::new(),
            dirty: true,
            last_broadcast: None,
            changes_tx,
        }
    }

    pub fn observe(&self) -> PresenceObserver {
        PresenceObserver {
            rx: self.changes_tx.subscribe(),
        }
    }

    pub fn local_id(&self) -> ClientId {
        self.local_id
    }

    pub fn local(&self) -> &PeerPresence {
        &self.local
    }

    pub fn get(&self, client_id: ClientId) -> Option<&PeerPresence> {
        if client_id == self.local_id {
            return Some(&self.local);
        }

        self.remote.get(&client_id)
    }

    pub fn remote_peers(&self) -> impl Iterator<Item = (ClientId, &PeerPresence)> {
        self.remote.iter().map(|(id, state)| (*id, state))
    }

    /// Every known state including the local one, ordered by client id.
    pub fn states(&self) -> Vec<(ClientId, &PeerPresence)> {
        let mut states: Vec<(ClientId, &PeerPresence)> = self.remote_peers().collect();
        states.push((self.local_id, &self.local));
        states.sort_by_key(|(id, _)| *id);

        states
    }

    /// Updates one local field. Returns false, and schedules nothing, when
    /// the value is unchanged.
    pub fn set_field(&mut self, field: PresenceField) -> bool {
        if !self.local.apply(field) {
            return false;
        }

        self.local.clock += 1;
        self.dirty = true;
        self.emit(Origin::Local, self.local_id, PresenceChangeKind::Updated);

        true
    }

    pub fn local_record(&self) -> PresenceRecord {
        PresenceRecord {
            client_id: self.local_id,
            clock: self.local.clock,
            fields: self.local.fields(),
        }
    }

    /// The record to broadcast now, if something changed or the renewal
    /// interval has passed since the last broadcast.
    pub fn take_outbound(&mut self, now: Instant, renew_interval: Duration) -> Option<PresenceRecord> {
        let renew_due = self
            .last_broadcast
            .is_none_or(|last| now.saturating_duration_since(last) >= renew_interval);

        if !self.dirty && !renew_due {
            return None;
        }

        if !self.dirty {
            self.local.clock += 1;
        }

        self.dirty = false;
        self.last_broadcast = Some(now);

        Some(self.local_record())
    }

    /// Replaces a peer's state with a newer record. Records from the past,
    /// for ourselves, or with invalid values change nothing.
    pub fn apply_remote(&mut self, record: PresenceRecord, now: Instant) -> Result<bool, PresenceError> {
        if record.client_id == self.local_id {
            return Ok(false);
        }

        record.validate()?;

        let previous = self.remote.get(&record.client_id);

        if previous.is_some_and(|held| record.clock <= held.clock) {
            debug!(
                "Ignoring stale presence from {} at clock {}",
                record.client_id, record.clock
            );
            return Ok(false);
        }

        let mut state = PeerPresence::empty(now);
        state.clock = record.clock;

        for field in record.fields {
            state.apply(field);
        }

        let kind = match previous {
            None => Some(PresenceChangeKind::Added),
            Some(held) if !held.same_content(&state) => Some(PresenceChangeKind::Updated),
            Some(_) => None,
        };

        self.remote.insert(record.client_id, state);

        if let Some(kind) = kind {
            self.emit(Origin::Remote, record.client_id, kind);
        }

        Ok(kind.is_some())
    }

    /// Handles a peer announcing its own departure.
    pub fn remove_remote(&mut self, client_id: ClientId, clock: u64) -> bool {
        let current = self.remote.get(&client_id).is_some_and(|held| clock >= held.clock);

        current && self.remove_peer(client_id)
    }

    pub fn remove_peer(&mut self, client_id: ClientId) -> bool {
        if self.remote.remove(&client_id).is_none() {
            return false;
        }

        self.emit(Origin::Remote, client_id, PresenceChangeKind::Removed);

        true
    }

    /// Drops peers that have not refreshed within `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<ClientId> {
        let expired: Vec<ClientId> = self
            .remote
            .iter()
            .filter(|(_, state)| now.saturating_duration_since(state.last_seen) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for client_id in &expired {
            debug!("Presence of {} timed out", client_id);
            self.remove_peer(*client_id);
        }

        expired
    }

    fn emit(&self, origin: Origin, client_id: ClientId, kind: PresenceChangeKind) {
        let _ = self.changes_tx.send(PresenceChange {
            origin,
            client_id,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PeerColor;

    fn profile(name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            color: PeerColor::Teal,
        }
    }

    #[test]
    fn unchanged_field_is_not_rebroadcast() {
        let now = Instant::now();
        let mut presence = Presence::new(1, profile("A"), now);
        let renew = Duration::from_secs(15);

        assert!(presence.take_outbound(now, renew).is_some());
        assert!(!presence.set_field(PresenceField::Cursor(None)));
        assert!(presence.take_outbound(now, renew).is_none());

        assert!(presence.set_field(PresenceField::Cursor(Some(Cursor { x: 3.0, y: 4.0 }))));
        assert!(presence.take_outbound(now, renew).is_some());
    }

    #[test]
    fn renews_after_interval() {
        let start = Instant::now();
        let mut presence = Presence::new(1, profile("A"), start);
        let renew = Duration::from_secs(15);

        let first = presence.take_outbound(start, renew).unwrap();
        assert!(presence.take_outbound(start + Duration::from_secs(14), renew).is_none());

        let renewed = presence.take_outbound(start + renew, renew).unwrap();
        assert!(renewed.clock > first.clock);
    }

    #[test]
    fn stale_records_are_ignored() {
        let now = Instant::now();
        let mut a = Presence::new(1, profile("A"), now);
        let mut b = Presence::new(2, profile("B"), now);

        let old = a.local_record();
        a.set_field(PresenceField::Cursor(Some(Cursor { x: 1.0, y: 1.0 })));
        let new = a.local_record();

        assert!(b.apply_remote(new, now).unwrap());
        assert!(!b.apply_remote(old, now).unwrap());
        assert_eq!(b.get(1).unwrap().cursor, Some(Cursor { x: 1.0, y: 1.0 }));
    }

    #[test]
    fn invalid_records_are_rejected() {
        let now = Instant::now();
        let mut b = Presence::new(2, profile("B"), now);
        let record = PresenceRecord {
            client_id: 1,
            clock: 3,
            fields: vec![PresenceField::Identity(profile(""))],
        };

        assert_eq!(b.apply_remote(record, now), Err(PresenceError::EmptyName));
        assert!(b.get(1).is_none());
    }

    #[test]
    fn peers_time_out() {
        let start = Instant::now();
        let mut a = Presence::new(1, profile("A"), start);
        let mut b = Presence::new(2, profile("B"), start);
        let mut observer = b.observe();

        b.apply_remote(a.take_outbound(start, Duration::from_secs(15)).unwrap(), start)
            .unwrap();
        assert_eq!(observer.try_next().unwrap().kind, PresenceChangeKind::Added);

        assert!(b.expire(start + Duration::from_secs(29), Duration::from_secs(30)).is_empty());
        assert_eq!(b.expire(start + Duration::from_secs(30), Duration::from_secs(30)), vec![1]);
        assert_eq!(observer.try_next().unwrap().kind, PresenceChangeKind::Removed);
    }

    #[test]
    fn departure_with_older_clock_is_ignored() {
        let now = Instant::now();
        let mut a = Presence::new(1, profile("A"), now);
        let mut b = Presence::new(2, profile("B"), now);

        a.set_field(PresenceField::Cursor(Some(Cursor { x: 2.0, y: 2.0 })));
        let record = a.local_record();
        b.apply_remote(record.clone(), now).unwrap();

        assert!(!b.remove_remote(1, record.clock - 1));
        assert!(b.remove_remote(1, record.clock));
        assert!(b.get(1).is_none());
    }

    #[test]
    fn states_are_sorted_and_include_local() {
        let now = Instant::now();
        let mut b = Presence::new(5, profile("B"), now);
        let a = Presence::new(9, profile("A"), now);
        let c = Presence::new(1, profile("C"), now);

        b.apply_remote(a.local_record(), now).unwrap();
        b.apply_remote(c.local_record(), now).unwrap();

        let ids: Vec<ClientId> = b.states().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 5, 9]);
    }
}
