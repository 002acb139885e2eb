use ratatui::style::{Color, Style};

use crate::board::Priority;

/// Color theme.
///
/// Text and chrome use the terminal's default foreground. Only functional
/// glyphs (priority, drop marker, write state) get color.
pub struct Theme;

impl Theme {
    pub const FG: Color = Color::Reset;
    pub const DIM: Color = Color::DarkGray;

    // Swimlanes and cells
    pub const LANE_HEADER: Color = Color::Reset;
    pub const CELL_BORDER: Color = Color::DarkGray;
    pub const CELL_FOCUSED_BORDER: Color = Color::Reset;
    pub const TASK_TITLE: Color = Color::Reset;

    pub const PRIORITY_LOW: Color = Color::Green;
    pub const PRIORITY_MEDIUM: Color = Color::Yellow;
    pub const PRIORITY_HIGH: Color = Color::Red;

    /// Where a carried task will land.
    pub const DROP_MARKER: Color = Color::Cyan;
    pub const UNPLACED: Color = Color::Yellow;

    // Status bar
    pub const STATUS_ERROR: Color = Color::Red;
    pub const SAVING: Color = Color::Yellow;

    pub fn dim_style() -> Style {
        Style::default().fg(Self::DIM)
    }

    pub fn status_style() -> Style {
        Style::default().fg(Self::FG)
    }

    pub fn priority_color(priority: Option<Priority>) -> Color {
        match priority {
            Some(Priority::Low) => Self::PRIORITY_LOW,
            Some(Priority::Medium) => Self::PRIORITY_MEDIUM,
            Some(Priority::High) => Self::PRIORITY_HIGH,
            None => Self::DIM,
        }
    }

    /// One-character priority glyph.
    pub fn priority_glyph(priority: Option<Priority>) -> &'static str {
        match priority {
            Some(Priority::Low) => "↓",
            Some(Priority::Medium) => "•",
            Some(Priority::High) => "↑",
            None => " ",
        }
    }
}
