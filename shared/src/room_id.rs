use std::fmt;

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};

pub const ROOM_ID_LEN: usize = 8;
pub const ROOM_ID_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";
pub const MAX_ROOM_ID_LEN: usize = 64;

const ROOM_FRAGMENT_PREFIX: &str = "#room=";

// Punctuation a URL fragment carries without escaping, plus `%` for
// tokens that were escaped by whoever built the link.
const ROOM_ID_PUNCTUATION: &str = "-._~!$&'()*+,;=:@/?%";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn generate() -> Self {
        let alphabet = ROOM_ID_ALPHABET.as_bytes();
        let mut rng = rng();

        let token = (0..ROOM_ID_LEN)
            .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
            .collect();

        Self(token)
    }

    // Tokens from shared links are opaque; only the character set is checked.
    // Whitespace, `#` and control characters would break the link.
    pub fn parse(value: &str) -> Result<Self, RoomIdError> {
        if value.is_empty() {
            return Err(RoomIdError::Empty);
        }

        if value.len() > MAX_ROOM_ID_LEN {
            return Err(RoomIdError::TooLong {
                max: MAX_ROOM_ID_LEN,
                found: value.len(),
            });
        }

        for (index, ch) in value.chars().enumerate() {
            if !(ch.is_ascii_alphanumeric() || ROOM_ID_PUNCTUATION.contains(ch)) {
                return Err(RoomIdError::InvalidCharacter { ch, index });
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn from_url(url: &str) -> Option<Self> {
        let fragment = &url[url.find('#')?..];
        let token = fragment.strip_prefix(ROOM_FRAGMENT_PREFIX)?;

        Self::parse(token).ok()
    }

    /// Returns the room named by the URL fragment, or a freshly generated room
    /// together with the rewritten URL the caller should display.
    pub fn resolve(url: &str) -> (Self, Option<String>) {
        if let Some(room_id) = Self::from_url(url) {
            return (room_id, None);
        }

        let room_id = Self::generate();
        let rewritten = room_id.url_for(url);

        (room_id, Some(rewritten))
    }

    pub fn url_for(&self, url: &str) -> String {
        let base = match url.find('#') {
            Some(index) => &url[..index],
            None => url,
        };

        format!("{}{}{}", base, ROOM_FRAGMENT_PREFIX, self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(room_id: RoomId) -> Self {
        room_id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    Empty,
    TooLong { max: usize, found: usize },
    InvalidCharacter { ch: char, index: usize },
}

impl fmt::Display for RoomIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomIdError::Empty => write!(f, "room id must not be empty"),
            RoomIdError::TooLong { max, found } => {
                write!(f, "room id must be at most {max} chars, got {found}")
            }
            RoomIdError::InvalidCharacter { ch, index } => {
                write!(f, "invalid character '{ch}' at position {index}")
            }
        }
    }
}

impl std::error::Error for RoomIdError {}
