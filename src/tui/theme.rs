//! Color theme for the TUI - using ANSI colors for better terminal compatibility

use ratatui::style::{Color, Modifier, Style};

use crate::transcript::TurnStatus;

/// Theme using ANSI colors that work well across terminal themes
pub struct Theme;

impl Theme {
    pub const CYAN: Color = Color::Cyan;
    pub const GREEN: Color = Color::Green;
    pub const YELLOW: Color = Color::Yellow;
    pub const RED: Color = Color::Red;
    pub const MAGENTA: Color = Color::Magenta;
    pub const DARK_GRAY: Color = Color::DarkGray;

    // Semantic styles
    pub fn title() -> Style {
        Style::default()
            .fg(Self::CYAN)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default()
    }

    pub fn dim() -> Style {
        Style::default().add_modifier(Modifier::DIM)
    }

    pub fn bold() -> Style {
        Style::default().add_modifier(Modifier::BOLD)
    }

    pub fn success() -> Style {
        Style::default().fg(Self::GREEN)
    }

    pub fn warning() -> Style {
        Style::default().fg(Self::YELLOW)
    }

    pub fn error() -> Style {
        Style::default().fg(Self::RED)
    }

    pub fn accent() -> Style {
        Style::default().fg(Self::CYAN)
    }

    pub fn muted() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn border() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(Self::CYAN)
    }

    pub fn inline_code() -> Style {
        Style::default().fg(Self::YELLOW)
    }

    pub fn code_block() -> Style {
        Style::default().fg(Self::GREEN)
    }

    pub fn log_entry() -> Style {
        Style::default()
            .fg(Self::DARK_GRAY)
            .add_modifier(Modifier::ITALIC)
    }

    // Badge styles
    pub fn user_badge() -> Style {
        Style::default()
            .bg(Self::CYAN)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    }

    pub fn jarvix_badge() -> Style {
        Style::default()
            .bg(Self::MAGENTA)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    }

    pub fn copy_badge() -> Style {
        Style::default()
            .bg(Self::DARK_GRAY)
            .fg(Color::White)
    }

    pub fn system_badge() -> Style {
        Style::default()
            .fg(Self::DARK_GRAY)
            .add_modifier(Modifier::ITALIC)
    }

    pub fn status(status: TurnStatus) -> Style {
        match status {
            TurnStatus::Queued => Self::muted(),
            TurnStatus::Processing => Self::accent(),
            TurnStatus::Completed => Self::success(),
            TurnStatus::Failed => Self::error(),
        }
    }

    // Key hints
    pub fn key() -> Style {
        Style::default()
            .fg(Self::CYAN)
            .add_modifier(Modifier::BOLD)
    }

    pub fn key_desc() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }
}
