use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Minimum spacing of local player writes in shared mode.
    pub sync_interval: Duration,
    /// Local writes are held back this long after a remote player update.
    pub remote_cooldown: Duration,
    /// Below this distance the player snaps onto the remote target.
    pub snap_threshold: f64,
    pub presence_renew_interval: Duration,
    pub presence_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_millis(33),
            remote_cooldown: Duration::from_millis(150),
            snap_threshold: 0.5,
            presence_renew_interval: Duration::from_secs(15),
            presence_timeout: Duration::from_secs(30),
        }
    }
}
