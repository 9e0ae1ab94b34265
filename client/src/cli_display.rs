use std::io::{Write, stdout};

use client::{SessionMode, UserInfo, player::PlayerState};
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};

pub const KEY_HELP: &str =
    "arrows/wasd move | m mode | v video | c mic | q quit";

pub struct StatusLine<'a> {
    pub mode: SessionMode,
    pub player: &'a PlayerState,
    pub peers: usize,
    pub video: Option<bool>,
    pub audio: Option<bool>,
    pub remote_streams: usize,
}

pub struct CliDisplay;

impl CliDisplay {
    pub fn print_joined(room_url: &str, name: &str, link_addr: &str) {
        println!("Joined as '{}'. Share this link to play together:", name);
        println!("  {}", room_url);
        println!("Peer links on {}", link_addr);
        println!("{}", KEY_HELP);
    }

    /// Prints a line above the status line. Raw mode needs explicit returns.
    pub fn print_notice(message: &str) {
        let mut stdout = stdout();

        let _ = execute!(
            stdout,
            Clear(ClearType::CurrentLine),
            cursor::MoveToColumn(0),
            Print(message),
            Print("\r\n")
        );
        let _ = stdout.flush();
    }

    pub fn print_user_list(users: &[UserInfo]) {
        let mut stdout = stdout();

        let _ = execute!(
            stdout,
            Clear(ClearType::CurrentLine),
            cursor::MoveToColumn(0),
            Print(format!("Players ({}):\r\n", users.len()))
        );

        for user in users {
            let (r, g, b) = user.color.rgb();
            let marker = if user.is_local { " (you)" } else { "" };

            let _ = execute!(
                stdout,
                Print("  * "),
                SetForegroundColor(Color::Rgb { r, g, b }),
                Print(&user.name),
                ResetColor,
                Print(format!("{}\r\n", marker))
            );
        }

        let _ = stdout.flush();
    }

    pub fn draw_status(status: &StatusLine) {
        let mut stdout = stdout();

        let line = format!(
            "[{}] ({:.0}, {:.0}) facing {} | {} connected | video {} | mic {} | {} remote stream(s)",
            status.mode,
            status.player.x,
            status.player.y,
            status.player.direction,
            status.peers,
            Self::switch(status.video),
            Self::switch(status.audio),
            status.remote_streams,
        );

        let _ = execute!(
            stdout,
            Clear(ClearType::CurrentLine),
            cursor::MoveToColumn(0),
            Print(line)
        );
        let _ = stdout.flush();
    }

    fn switch(state: Option<bool>) -> &'static str {
        match state {
            None => "n/a",
            Some(true) => "on",
            Some(false) => "off",
        }
    }
}
