use crate::{
    identity::PeerColor,
    player::{Direction, PlayerState},
};

/// The game loop the session is embedded in.
pub trait GameHost {
    fn player(&self) -> &PlayerState;

    fn player_mut(&mut self) -> &mut PlayerState;

    /// True while the local user is steering the player.
    fn has_local_input(&self) -> bool;

    /// Replaces the board map. Returns false and keeps the previous map when
    /// `text` cannot be used.
    fn parse_map_text(&mut self, text: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
}

impl Camera {
    pub fn to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        (x - self.x, y - self.y)
    }
}

/// Drawing surface for the remote-peer overlay.
pub trait RenderHost {
    fn viewport(&self) -> Viewport;

    fn camera(&self) -> Camera;

    fn draw_character(
        &mut self,
        sx: f64,
        sy: f64,
        size: f64,
        color: PeerColor,
        direction: Direction,
        anim_frame: u8,
    );

    fn draw_cursor(&mut self, sx: f64, sy: f64, color: PeerColor);

    fn draw_label(&mut self, sx: f64, sy: f64, text: &str, color: PeerColor);

    fn draw_peer_count(&mut self, count: usize);
}
