use core::fmt;

use rand::{random, rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

use crate::ClientId;

pub const MAX_NAME_LEN: usize = 32;

const ADJECTIVES: [&str; 8] = ["Happy", "Brave", "Kind", "Calm", "Wise", "Sweet", "Warm", "Bold"];
const NOUNS: [&str; 8] = ["Filly", "Dilly", "Star", "Heart", "Cloud", "Sun", "Moon", "Gem"];

/// The fixed peer palette. Colors travel as their hex strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, EnumString, IntoStaticStr,
)]
pub enum PeerColor {
    #[serde(rename = "#E74C3C")]
    #[strum(serialize = "#E74C3C")]
    Red,
    #[serde(rename = "#3498DB")]
    #[strum(serialize = "#3498DB")]
    Blue,
    #[serde(rename = "#2ECC71")]
    #[strum(serialize = "#2ECC71")]
    Green,
    #[serde(rename = "#F39C12")]
    #[strum(serialize = "#F39C12")]
    Orange,
    #[serde(rename = "#9B59B6")]
    #[strum(serialize = "#9B59B6")]
    Purple,
    #[serde(rename = "#1ABC9C")]
    #[strum(serialize = "#1ABC9C")]
    Teal,
    #[serde(rename = "#E84393")]
    #[strum(serialize = "#E84393")]
    Pink,
    #[serde(rename = "#00B894")]
    #[strum(serialize = "#00B894")]
    Mint,
    #[serde(rename = "#FF6B8A")]
    #[strum(serialize = "#FF6B8A")]
    Rose,
    #[serde(rename = "#5DADE2")]
    #[strum(serialize = "#5DADE2")]
    Sky,
    #[serde(rename = "#E67E22")]
    #[strum(serialize = "#E67E22")]
    Amber,
    #[serde(rename = "#A8B820")]
    #[strum(serialize = "#A8B820")]
    Olive,
}

impl PeerColor {
    pub fn hex(self) -> &'static str {
        self.into()
    }

    /// Red, green and blue channels of the hex value.
    pub fn rgb(self) -> (u8, u8, u8) {
        let hex = &self.hex()[1..];
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);

        (channel(0), channel(2), channel(4))
    }

    pub fn random() -> Self {
        let palette: Vec<PeerColor> = PeerColor::iter().collect();

        palette.choose(&mut rng()).copied().unwrap_or(PeerColor::Red)
    }
}

impl fmt::Display for PeerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

/// Name and color as they appear in presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub color: PeerColor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub client_id: ClientId,
    pub name: String,
    pub color: PeerColor,
}

impl PeerIdentity {
    pub fn generate() -> Self {
        Self {
            client_id: random(),
            name: generate_user_name(),
            color: PeerColor::random(),
        }
    }

    pub fn with_name(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name.and_then(clean_name) {
            self.name = name;
        }

        self
    }

    pub fn profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            color: self.color,
        }
    }
}

pub fn generate_user_name() -> String {
    let mut rng = rng();

    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Happy");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Filly");

    format!("{}{}", adjective, noun)
}

/// Trims a display name and caps it at `MAX_NAME_LEN` characters.
pub fn clean_name(name: &str) -> Option<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return None;
    }

    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}
