use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Top-level named regions of the shared document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Region {
    Player,
    SvgMap,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// One applied transaction, as seen by observers of a single region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocChange {
    pub origin: Origin,
    pub region: Region,
    pub keys: BTreeSet<String>,
}

impl DocChange {
    pub fn is_remote(&self) -> bool {
        self.origin == Origin::Remote
    }

    pub fn touches(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}
