use crate::{
    game_host::{RenderHost, Viewport},
    session::Session,
};

const CURSOR_MARGIN: f64 = 30.0;
const PAWN_MARGIN_X: f64 = 40.0;
const PAWN_MARGIN_ABOVE: f64 = 60.0;
const PAWN_MARGIN_BELOW: f64 = 40.0;

pub const REMOTE_PAWN_SIZE: f64 = 18.0;
const PAWN_LABEL_OFFSET: f64 = 22.0;
const CURSOR_LABEL_OFFSET: f64 = 14.0;

pub fn cursor_visible(sx: f64, sy: f64, viewport: Viewport) -> bool {
    (-CURSOR_MARGIN..=viewport.width + CURSOR_MARGIN).contains(&sx)
        && (-CURSOR_MARGIN..=viewport.height + CURSOR_MARGIN).contains(&sy)
}

pub fn pawn_visible(sx: f64, sy: f64, viewport: Viewport) -> bool {
    (-PAWN_MARGIN_X..=viewport.width + PAWN_MARGIN_X).contains(&sx)
        && (-PAWN_MARGIN_ABOVE..=viewport.height + PAWN_MARGIN_BELOW).contains(&sy)
}

/// Draws other peers on top of the game: pawns, then cursors, then the
/// connected indicator.
pub struct Overlay;

impl Overlay {
    pub fn draw(session: &Session, host: &mut dyn RenderHost) {
        let viewport = host.viewport();
        let camera = host.camera();

        for remote in session.remote_pawns() {
            let (sx, sy) = camera.to_screen(remote.pawn.x, remote.pawn.y);

            if !pawn_visible(sx, sy, viewport) {
                continue;
            }

            host.draw_character(
                sx,
                sy,
                REMOTE_PAWN_SIZE,
                remote.color,
                remote.pawn.direction,
                remote.pawn.anim_frame,
            );
            host.draw_label(sx, sy - PAWN_LABEL_OFFSET, &remote.name, remote.color);
        }

        for cursor in session.remote_cursors() {
            let (sx, sy) = camera.to_screen(cursor.x, cursor.y);

            if !cursor_visible(sx, sy, viewport) {
                continue;
            }

            host.draw_cursor(sx, sy, cursor.color);
            host.draw_label(sx, sy - CURSOR_LABEL_OFFSET, &cursor.name, cursor.color);
        }

        let users = session.users().len();

        if users > 1 {
            host.draw_peer_count(users);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: Viewport = Viewport {
        width: 800.0,
        height: 600.0,
    };

    #[test]
    fn cursor_culling_uses_a_symmetric_margin() {
        assert!(cursor_visible(-30.0, 630.0, VIEW));
        assert!(!cursor_visible(-31.0, 300.0, VIEW));
        assert!(!cursor_visible(400.0, 631.0, VIEW));
    }

    #[test]
    fn pawn_culling_allows_more_room_above() {
        assert!(pawn_visible(400.0, -60.0, VIEW));
        assert!(!pawn_visible(400.0, -61.0, VIEW));
        assert!(pawn_visible(840.0, 640.0, VIEW));
        assert!(!pawn_visible(400.0, 641.0, VIEW));
    }
}
