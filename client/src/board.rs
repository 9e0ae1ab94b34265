use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::{info, warn};

use crate::{
    game_host::GameHost,
    player::{ANIM_FRAME_COUNT, Direction, PlayerState},
    walkable_map::{MapParseError, WalkableMap},
};

/// Distance covered per 60 Hz frame.
pub const PLAYER_SPEED: f64 = 3.5;
pub const ANIM_INTERVAL: Duration = Duration::from_millis(150);
pub const CLICK_ARRIVE_DISTANCE: f64 = 5.0;
/// Terminals report key presses but not releases, so a press counts as
/// held for this long.
pub const INPUT_HOLD: Duration = Duration::from_millis(500);

const FRAME: Duration = Duration::from_micros(16_667);
const MAX_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKey {
    Up,
    Down,
    Left,
    Right,
}

impl MoveKey {
    fn vector(self) -> (f64, f64) {
        match self {
            MoveKey::Up => (0.0, -1.0),
            MoveKey::Down => (0.0, 1.0),
            MoveKey::Left => (-1.0, 0.0),
            MoveKey::Right => (1.0, 0.0),
        }
    }
}

/// A minimal board game: one character walking inside a rectangle,
/// optionally confined to the strokes of an SVG map.
pub struct Board {
    width: f64,
    height: f64,
    player: PlayerState,
    held: HashMap<MoveKey, Instant>,
    click_target: Option<(f64, f64)>,
    map: Option<WalkableMap>,
    anim_elapsed: Duration,
    now: Instant,
}

impl Board {
    pub fn new(width: f64, height: f64, now: Instant) -> Self {
        Self {
            width,
            height,
            player: PlayerState::at(width / 2.0, height / 2.0),
            held: HashMap::new(),
            click_target: None,
            map: None,
            anim_elapsed: Duration::ZERO,
            now,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn map(&self) -> Option<&WalkableMap> {
        self.map.as_ref()
    }

    pub fn click_target(&self) -> Option<(f64, f64)> {
        self.click_target
    }

    /// Holds `key` for `INPUT_HOLD` from `now`. Repeated presses extend it.
    pub fn press(&mut self, key: MoveKey, now: Instant) {
        self.held.insert(key, now + INPUT_HOLD);
        self.click_target = None;
    }

    pub fn release(&mut self, key: MoveKey) {
        self.held.remove(&key);
    }

    pub fn click(&mut self, x: f64, y: f64) {
        self.click_target = Some((x.clamp(0.0, self.width), y.clamp(0.0, self.height)));
    }

    pub fn load_map(&mut self, text: &str) -> Result<(), MapParseError> {
        let map = WalkableMap::parse(text)?;

        if let Some((width, height)) = map.view_size() {
            self.width = width;
            self.height = height;
        }

        info!("Loaded map with {} segments", map.segments().len());
        self.map = Some(map);
        self.player.x = self.player.x.clamp(0.0, self.width);
        self.player.y = self.player.y.clamp(0.0, self.height);

        Ok(())
    }

    /// Advances movement and animation to `now`.
    pub fn update(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.now).min(MAX_STEP);
        self.now = now;
        self.held.retain(|_, until| *until > now);

        let (mut dx, mut dy) = self
            .held
            .keys()
            .map(|key| key.vector())
            .fold((0.0, 0.0), |(x, y), (kx, ky)| (x + kx, y + ky));

        if dx == 0.0 && dy == 0.0 {
            if let Some((tx, ty)) = self.click_target {
                let distance = (tx - self.player.x).hypot(ty - self.player.y);

                if distance <= CLICK_ARRIVE_DISTANCE {
                    self.click_target = None;
                } else {
                    dx = (tx - self.player.x) / distance;
                    dy = (ty - self.player.y) / distance;
                }
            }
        }

        let Some(direction) = Direction::from_motion(dx, dy) else {
            self.stop();
            return;
        };

        let length = dx.hypot(dy);
        let step = PLAYER_SPEED * elapsed.as_secs_f64() / FRAME.as_secs_f64();
        let (x, y) = (self.player.x, self.player.y);
        let nx = (x + dx / length * step).clamp(0.0, self.width);
        let ny = (y + dy / length * step).clamp(0.0, self.height);

        let Some((nx, ny)) = self.walkable_step(x, y, nx, ny) else {
            self.click_target = None;
            self.stop();
            return;
        };

        self.player.x = nx;
        self.player.y = ny;
        self.player.direction = direction;
        self.player.moving = true;

        self.anim_elapsed += elapsed;

        while self.anim_elapsed >= ANIM_INTERVAL {
            self.anim_elapsed -= ANIM_INTERVAL;
            self.player.anim_frame = (self.player.anim_frame + 1) % ANIM_FRAME_COUNT;
        }
    }

    // Sliding along one axis lets the player follow a path edge.
    fn walkable_step(&self, x: f64, y: f64, nx: f64, ny: f64) -> Option<(f64, f64)> {
        let Some(map) = &self.map else {
            return Some((nx, ny));
        };

        if !map.is_on_path(x, y) {
            return Some((nx, ny));
        }

        [(nx, ny), (nx, y), (x, ny)]
            .into_iter()
            .find(|&(cx, cy)| (cx, cy) != (x, y) && map.is_on_path(cx, cy))
    }

    fn stop(&mut self) {
        self.player.moving = false;
        self.player.anim_frame = 0;
        self.anim_elapsed = Duration::ZERO;
    }
}

impl GameHost for Board {
    fn player(&self) -> &PlayerState {
        &self.player
    }

    fn player_mut(&mut self) -> &mut PlayerState {
        &mut self.player
    }

    fn has_local_input(&self) -> bool {
        self.click_target.is_some() || self.held.values().any(|until| *until > self.now)
    }

    fn parse_map_text(&mut self, text: &str) -> bool {
        match self.load_map(text) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring map: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(board: &mut Board, start: Instant, count: u32) -> Instant {
        let mut now = start;

        for _ in 0..count {
            now += FRAME;
            board.update(now);
        }

        now
    }

    #[test]
    fn key_press_moves_and_faces() {
        let start = Instant::now();
        let mut board = Board::new(400.0, 300.0, start);

        board.press(MoveKey::Left, start);
        frames(&mut board, start, 10);

        assert!((board.player.x - (200.0 - 35.0)).abs() < 0.01);
        assert_eq!(board.player.direction, Direction::Left);
        assert!(board.player.moving);
        assert!(board.has_local_input());
    }

    #[test]
    fn input_expires_after_the_hold_window() {
        let start = Instant::now();
        let mut board = Board::new(400.0, 300.0, start);

        board.press(MoveKey::Up, start);
        frames(&mut board, start, 40);

        assert!(!board.has_local_input());
        assert!(!board.player.moving);
        assert_eq!(board.player.anim_frame, 0);
    }

    #[test]
    fn movement_is_clamped_to_the_board() {
        let start = Instant::now();
        let mut board = Board::new(100.0, 100.0, start);

        board.press(MoveKey::Right, start);
        frames(&mut board, start, 25);

        assert_eq!(board.player.x, 100.0);
    }

    #[test]
    fn click_target_is_cleared_on_arrival() {
        let start = Instant::now();
        let mut board = Board::new(400.0, 300.0, start);

        board.click(230.0, 150.0);
        let now = frames(&mut board, start, 20);

        assert!(board.click_target().is_none());
        assert!((board.player.x - 230.0).abs() <= CLICK_ARRIVE_DISTANCE);

        board.update(now + FRAME);
        assert!(!board.has_local_input());
    }

    #[test]
    fn animation_advances_every_interval() {
        let start = Instant::now();
        let mut board = Board::new(1000.0, 1000.0, start);

        board.press(MoveKey::Down, start);
        let mut now = start;

        for _ in 0..3 {
            now += Duration::from_millis(75);
            board.update(now);
        }

        assert_eq!(board.player.anim_frame, 1);
    }

    #[test]
    fn map_confines_movement() {
        let start = Instant::now();
        let mut board = Board::new(400.0, 300.0, start);
        assert!(board.parse_map_text(
            r#"<svg viewBox="0 0 400 300"><line x1="0" y1="150" x2="400" y2="150" stroke-width="20"/></svg>"#
        ));

        board.press(MoveKey::Up, start);
        frames(&mut board, start, 10);

        assert!(board.player.y >= 140.0);
        assert!(board.map().unwrap().is_on_path(board.player.x, board.player.y));
    }

    #[test]
    fn bad_map_keeps_the_previous_one() {
        let start = Instant::now();
        let mut board = Board::new(400.0, 300.0, start);
        board
            .load_map(r#"<svg><line x1="0" y1="0" x2="10" y2="0"/></svg>"#)
            .unwrap();

        assert!(!board.parse_map_text("not a map"));
        assert_eq!(board.map().unwrap().segments().len(), 1);
    }
}
