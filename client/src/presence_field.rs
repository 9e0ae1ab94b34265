use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    ClientId,
    identity::{MAX_NAME_LEN, Profile},
    player::{ANIM_FRAME_COUNT, Cursor, Pawn},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "lowercase")]
pub enum PresenceField {
    Identity(Profile),
    Cursor(Option<Cursor>),
    Pawn(Option<Pawn>),
}

/// A peer's full presence state at one clock value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub client_id: ClientId,
    pub clock: u64,
    pub fields: Vec<PresenceField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceError {
    NonFiniteCoordinate { field: &'static str },
    AnimFrameOutOfRange(u8),
    EmptyName,
    NameTooLong { max: usize, found: usize },
}

impl fmt::Display for PresenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceError::NonFiniteCoordinate { field } => {
                write!(f, "{} has a non-finite coordinate", field)
            }
            PresenceError::AnimFrameOutOfRange(frame) => {
                write!(f, "animation frame {} is out of range", frame)
            }
            PresenceError::EmptyName => write!(f, "name is empty"),
            PresenceError::NameTooLong { max, found } => {
                write!(f, "name has {} characters, limit is {}", found, max)
            }
        }
    }
}

impl std::error::Error for PresenceError {}

impl PresenceField {
    /// Checks what serde cannot: coordinates, frame range and name length.
    pub fn validate(&self) -> Result<(), PresenceError> {
        match self {
            PresenceField::Identity(profile) => {
                let found = profile.name.chars().count();

                if profile.name.trim().is_empty() {
                    return Err(PresenceError::EmptyName);
                }

                if found > MAX_NAME_LEN {
                    return Err(PresenceError::NameTooLong {
                        max: MAX_NAME_LEN,
                        found,
                    });
                }
            }

            PresenceField::Cursor(Some(cursor)) => {
                if !cursor.x.is_finite() || !cursor.y.is_finite() {
                    return Err(PresenceError::NonFiniteCoordinate { field: "cursor" });
                }
            }

            PresenceField::Pawn(Some(pawn)) => {
                if !pawn.x.is_finite() || !pawn.y.is_finite() {
                    return Err(PresenceError::NonFiniteCoordinate { field: "pawn" });
                }

                if pawn.anim_frame >= ANIM_FRAME_COUNT {
                    return Err(PresenceError::AnimFrameOutOfRange(pawn.anim_frame));
                }
            }

            PresenceField::Cursor(None) | PresenceField::Pawn(None) => {}
        }

        Ok(())
    }
}

impl PresenceRecord {
    pub fn validate(&self) -> Result<(), PresenceError> {
        self.fields.iter().try_for_each(PresenceField::validate)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{identity::PeerColor, player::Direction};

    #[test]
    fn fields_are_tagged_on_the_wire() {
        let field = PresenceField::Cursor(Some(Cursor { x: 1.0, y: 2.0 }));

        assert_eq!(
            serde_json::to_value(&field).unwrap(),
            json!({"field": "cursor", "value": {"x": 1.0, "y": 2.0}})
        );
    }

    #[test]
    fn unknown_color_fails_to_decode() {
        let raw = json!({"field": "identity", "value": {"name": "Pip", "color": "#123456"}});

        assert!(serde_json::from_value::<PresenceField>(raw).is_err());
    }

    #[test]
    fn rejects_bad_values() {
        let pawn = Pawn {
            x: 1.0,
            y: 1.0,
            direction: Direction::Up,
            moving: false,
            anim_frame: 4,
        };
        let name = Profile {
            name: "n".repeat(MAX_NAME_LEN + 1),
            color: PeerColor::Blue,
        };

        assert_eq!(
            PresenceField::Pawn(Some(pawn)).validate(),
            Err(PresenceError::AnimFrameOutOfRange(4))
        );
        assert!(PresenceField::Identity(name).validate().is_err());
        assert!(
            PresenceField::Cursor(Some(Cursor {
                x: f64::NAN,
                y: 0.0
            }))
            .validate()
            .is_err()
        );
        assert!(PresenceField::Pawn(None).validate().is_ok());
    }
}
