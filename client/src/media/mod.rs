pub mod local_stream;
pub mod media_devices;
pub mod media_session;
#[cfg(feature = "devices")]
pub mod system_devices;

pub use local_stream::{LocalStream, RemoteStream, TrackKind};
pub use media_devices::{MediaConstraints, MediaDevices, NoDevices};
pub use media_session::{MediaConfig, MediaSession};
