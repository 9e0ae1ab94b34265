use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

pub const ANIM_FRAME_COUNT: u8 = 4;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(into = "u8", try_from = "u8")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    #[default]
    Down = 0,
    Left = 1,
    Up = 2,
    Right = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidDirection(pub i64);

impl fmt::Display for InvalidDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "direction must be in 0..=3, got {}", self.0)
    }
}

impl std::error::Error for InvalidDirection {}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        direction as u8
    }
}

impl TryFrom<u8> for Direction {
    type Error = InvalidDirection;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        <Self as TryFrom<i64>>::try_from(i64::from(value))
    }
}

impl TryFrom<i64> for Direction {
    type Error = InvalidDirection;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Down),
            1 => Ok(Direction::Left),
            2 => Ok(Direction::Up),
            3 => Ok(Direction::Right),
            other => Err(InvalidDirection(other)),
        }
    }
}

impl Direction {
    /// Facing for a movement vector, picked from the dominant axis.
    pub fn from_motion(dx: f64, dy: f64) -> Option<Self> {
        if dx == 0.0 && dy == 0.0 {
            return None;
        }

        if dx.abs() > dy.abs() {
            Some(if dx > 0.0 { Direction::Right } else { Direction::Left })
        } else {
            Some(if dy > 0.0 { Direction::Down } else { Direction::Up })
        }
    }
}

/// The game's own player record. The session reads and writes it every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub direction: Direction,
    pub moving: bool,
    pub anim_frame: u8,
}

impl PlayerState {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            size: 18.0,
            direction: Direction::Down,
            moving: false,
            anim_frame: 0,
        }
    }

    pub fn transform(&self) -> PlayerTransform {
        PlayerTransform {
            x: self.x,
            y: self.y,
            direction: self.direction,
            moving: self.moving,
        }
    }

    pub fn pawn(&self) -> Pawn {
        Pawn {
            x: round_tenth(self.x),
            y: round_tenth(self.y),
            direction: self.direction,
            moving: self.moving,
            anim_frame: self.anim_frame,
        }
    }
}

/// Shared-mode player state as stored in the replicated document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerTransform {
    pub x: f64,
    pub y: f64,
    pub direction: Direction,
    pub moving: bool,
}

impl PlayerTransform {
    pub fn rounded(self) -> Self {
        Self {
            x: round_tenth(self.x),
            y: round_tenth(self.y),
            ..self
        }
    }
}

/// A peer's own character, published through presence in individual mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pawn {
    pub x: f64,
    pub y: f64,
    pub direction: Direction,
    pub moving: bool,
    pub anim_frame: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_serializes_as_its_index() {
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Direction>("3").unwrap(), Direction::Right);
        assert!(serde_json::from_str::<Direction>("4").is_err());
    }

    #[test]
    fn dominant_axis_picks_facing() {
        assert_eq!(Direction::from_motion(3.0, 1.0), Some(Direction::Right));
        assert_eq!(Direction::from_motion(-1.0, -2.0), Some(Direction::Up));
        assert_eq!(Direction::from_motion(0.0, 0.0), None);
    }

    #[test]
    fn pawn_positions_are_rounded_to_a_tenth() {
        let mut player = PlayerState::at(10.04, 20.06);
        player.anim_frame = 2;

        let pawn = player.pawn();

        assert_eq!((pawn.x, pawn.y), (10.0, 20.1));
        assert_eq!(pawn.anim_frame, 2);
    }

    #[test]
    fn pawn_uses_camel_case_on_the_wire() {
        let pawn = PlayerState::at(1.0, 2.0).pawn();
        let value = serde_json::to_value(pawn).unwrap();

        assert!(value.get("animFrame").is_some());
    }
}
