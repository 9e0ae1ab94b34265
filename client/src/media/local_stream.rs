use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug)]
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    live: AtomicBool,
}

impl LocalTrack {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Captured local media. Clones share the same tracks.
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    tracks: Arc<Vec<LocalTrack>>,
}

impl LocalStream {
    pub fn new(tracks: Vec<(TrackKind, String)>) -> Self {
        let tracks = tracks
            .into_iter()
            .map(|(kind, label)| LocalTrack {
                id: random_id(),
                kind,
                label,
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
            })
            .collect();

        Self {
            id: random_id(),
            tracks: Arc::new(tracks),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |track| track.kind == kind)
    }

    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks_of(kind).next().is_some()
    }

    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks_of(kind) {
            track.set_enabled(enabled);
        }
    }

    pub fn stop(&self) {
        for track in self.tracks.iter() {
            track.stop();
        }
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(LocalTrack::is_live)
    }

    /// What a remote peer learns about this stream when it is offered.
    pub fn describe(&self) -> RemoteStream {
        RemoteStream {
            stream_id: self.id.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|track| TrackInfo {
                    id: track.id.clone(),
                    kind: track.kind,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
}

/// A peer's stream as received over a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStream {
    pub stream_id: String,
    pub tracks: Vec<TrackInfo>,
}

impl RemoteStream {
    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|track| track.kind == kind)
    }
}

fn random_id() -> String {
    format!("{:016x}", rng().random::<u64>())
}
