pub mod board;
pub mod doc_change;
pub mod game_host;
pub mod identity;
pub mod media;
pub mod mesh;
pub mod overlay;
pub mod player;
pub mod presence;
pub mod presence_field;
pub mod session;
pub mod session_config;
pub mod session_mode;
pub mod shared_doc;
pub mod sync_policy;
pub mod walkable_map;

/// Identifies one peer in a room, both in the document and on the mesh.
pub type ClientId = u32;

pub use session::{Session, UserInfo};
pub use session_config::SessionConfig;
pub use session_mode::SessionMode;
