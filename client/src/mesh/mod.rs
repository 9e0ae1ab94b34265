pub mod local_bus;
pub mod loopback_beacon;
pub mod peer_mesh;
pub mod relay_mesh;
pub mod signal_data;
pub mod ws_peer_link;

pub use peer_mesh::{LinkEvent, MeshEvent, MeshMessage, PeerLink, PeerMesh};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
