use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionMode {
    /// One character, moved by everyone.
    #[default]
    Shared,
    /// Each peer moves its own pawn.
    Individual,
}

impl SessionMode {
    pub fn toggled(self) -> Self {
        match self {
            SessionMode::Shared => SessionMode::Individual,
            SessionMode::Individual => SessionMode::Shared,
        }
    }
}
