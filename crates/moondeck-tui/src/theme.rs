//! Minimal style table. The console runs on small dedicated displays, so
//! styling stays within the terminal's own palette.

use ratatui::style::{Color, Modifier, Style};

use moondeck_core::{MessageLevel, PrinterState};

pub const ACCENT: Color = Color::Cyan;
pub const SUCCESS: Color = Color::Green;
pub const WARNING: Color = Color::Yellow;
pub const ERROR: Color = Color::Red;
pub const DIM: Color = Color::DarkGray;

pub fn title_style() -> Style {
    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
}

pub fn border_default() -> Style {
    Style::default().fg(DIM)
}

pub fn key_hint() -> Style {
    Style::default().fg(DIM)
}

pub fn key_hint_key() -> Style {
    Style::default().fg(ACCENT)
}

pub fn selected_row() -> Style {
    Style::default().fg(Color::Black).bg(ACCENT)
}

/// Color for the header state indicator.
pub fn state_color(state: PrinterState) -> Color {
    match state {
        PrinterState::Ready => SUCCESS,
        PrinterState::Printing => ACCENT,
        PrinterState::Paused | PrinterState::Startup => WARNING,
        PrinterState::Error | PrinterState::Shutdown => ERROR,
        PrinterState::Disconnected => DIM,
    }
}

/// Border color for popup toasts.
pub fn level_color(level: MessageLevel) -> Color {
    match level {
        MessageLevel::Info => ACCENT,
        MessageLevel::Warning => WARNING,
        MessageLevel::Error => ERROR,
    }
}
