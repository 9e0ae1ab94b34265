use std::time::Instant;

use log::debug;

use crate::{
    game_host::GameHost,
    player::{PlayerState, PlayerTransform},
    presence::Presence,
    presence_field::PresenceField,
    session_config::SessionConfig,
    session_mode::SessionMode,
    shared_doc::SharedDoc,
};

/// Fraction of the remaining distance covered per smoothing step.
pub fn smoothing_factor(distance: f64) -> f64 {
    (distance * 0.01 + 0.1).min(0.3)
}

/// Decides when the local player is written to the shared document and
/// how remote writes are blended back into it.
pub struct SyncPolicy {
    mode: SessionMode,
    remote_target: Option<PlayerTransform>,
    last_remote_at: Option<Instant>,
    last_sync_at: Option<Instant>,
    config: SessionConfig,
}

impl SyncPolicy {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            mode: SessionMode::Shared,
            remote_target: None,
            last_remote_at: None,
            last_sync_at: None,
            config,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;

        if mode != SessionMode::Shared {
            self.remote_target = None;
        }
    }

    pub fn remote_target(&self) -> Option<&PlayerTransform> {
        self.remote_target.as_ref()
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.last_remote_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.remote_cooldown)
    }

    /// Records a remote player write as the new smoothing target. Fields
    /// the document lacks are taken from the local player.
    pub fn on_remote_player_change(&mut self, doc: &SharedDoc, fallback: &PlayerState, now: Instant) {
        if self.mode != SessionMode::Shared {
            return;
        }

        self.last_remote_at = Some(now);
        self.remote_target = Some(doc.player_transform_or(fallback.transform()));
    }

    /// Writes the local player into the document when the user is steering,
    /// the write interval has passed and no remote write is cooling down.
    pub fn sync_player(&mut self, game: &dyn GameHost, doc: &mut SharedDoc, now: Instant) -> bool {
        if self.mode != SessionMode::Shared || !game.has_local_input() || self.in_cooldown(now) {
            return false;
        }

        if self
            .last_sync_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.sync_interval)
        {
            return false;
        }

        self.last_sync_at = Some(now);
        self.remote_target = None;
        doc.set_player_transform(game.player().transform().rounded());

        true
    }

    /// Moves the local player one step towards the remote target. Local
    /// input takes precedence and discards the target.
    pub fn apply_remote_smooth(&mut self, game: &mut dyn GameHost) {
        if self.mode != SessionMode::Shared {
            return;
        }

        let Some(target) = self.remote_target else {
            return;
        };

        if game.has_local_input() {
            debug!("Local input overrides remote player target");
            self.remote_target = None;
            return;
        }

        let player = game.player_mut();
        let dx = target.x - player.x;
        let dy = target.y - player.y;
        let distance = dx.hypot(dy);

        if distance < self.config.snap_threshold {
            player.x = target.x;
            player.y = target.y;
            self.remote_target = None;
        } else {
            let t = smoothing_factor(distance);
            player.x += dx * t;
            player.y += dy * t;
        }

        player.direction = target.direction;
        player.moving = target.moving;
    }

    /// Publishes the local pawn through presence in individual mode.
    pub fn sync_individual_pawn(&self, game: &dyn GameHost, presence: &mut Presence) -> bool {
        if self.mode != SessionMode::Individual {
            return false;
        }

        presence.set_field(PresenceField::Pawn(Some(game.player().pawn())))
    }
}
