//! Splash panel — the boot/progress surface.
//!
//! Shows connection and initialization messages, including the retry
//! countdowns and terminal errors from the sequencer. `r` re-triggers
//! initialization manually after retries were exhausted.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
};

use crate::action::Action;
use crate::panel::{Panel, PanelId};
use crate::theme;

pub struct SplashPanel {
    message: String,
}

impl SplashPanel {
    pub fn new() -> Self {
        Self {
            message: "Initializing".into(),
        }
    }
}

impl Panel for SplashPanel {
    fn id(&self) -> PanelId {
        PanelId::Splash
    }

    fn set_status_text(&mut self, text: &str) {
        self.message = text.to_owned();
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('r') => Some(Action::RetryInit),
            KeyCode::Char('p') => Some(Action::ShowPanel(PanelId::PrinterSelect)),
            _ => None,
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" moondeck ")
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let layout = Layout::vertical([
            Constraint::Min(1),    // message
            Constraint::Length(1), // hints
        ])
        .split(inner);

        let message = Paragraph::new(self.message.as_str())
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false });
        frame.render_widget(message, layout[0]);

        let hints = Line::from(vec![
            Span::styled(" r ", theme::key_hint_key()),
            Span::styled("retry  ", theme::key_hint()),
            Span::styled("p ", theme::key_hint_key()),
            Span::styled("printer select  ", theme::key_hint()),
            Span::styled("q ", theme::key_hint_key()),
            Span::styled("quit", theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(hints), layout[1]);
    }
}
