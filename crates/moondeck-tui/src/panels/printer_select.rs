//! Printer selection panel. While this panel is on the stack the
//! initialization sequencer refuses to run -- selection pre-empts
//! connection attempts.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
};

use crate::action::Action;
use crate::panel::{Panel, PanelId};
use crate::theme;

pub struct PrinterSelectPanel {
    printers: Vec<String>,
    selected: usize,
}

impl PrinterSelectPanel {
    pub fn new(printers: Vec<String>) -> Self {
        Self {
            printers,
            selected: 0,
        }
    }
}

impl Panel for PrinterSelectPanel {
    fn id(&self) -> PanelId {
        PanelId::PrinterSelect
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.printers.len() {
                    self.selected += 1;
                }
                None
            }
            KeyCode::Enter => self
                .printers
                .get(self.selected)
                .cloned()
                .map(Action::ConnectPrinter),
            _ => None,
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Printer Select ")
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let layout = Layout::vertical([
            Constraint::Min(1),    // list
            Constraint::Length(1), // hints
        ])
        .split(inner);

        let lines: Vec<Line> = if self.printers.is_empty() {
            vec![Line::from(Span::styled(
                "  No printers configured",
                theme::key_hint(),
            ))]
        } else {
            self.printers
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    if i == self.selected {
                        Line::from(Span::styled(format!("  {name}  "), theme::selected_row()))
                    } else {
                        Line::from(format!("  {name}"))
                    }
                })
                .collect()
        };
        frame.render_widget(Paragraph::new(lines), layout[0]);

        let hints = Line::from(vec![
            Span::styled(" ↑/↓ ", theme::key_hint_key()),
            Span::styled("select  ", theme::key_hint()),
            Span::styled("Enter ", theme::key_hint_key()),
            Span::styled("connect", theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(hints), layout[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn enter_emits_connect_for_the_selected_printer() {
        let mut panel = PrinterSelectPanel::new(vec!["voron".into(), "ender".into()]);

        panel.handle_key(key(KeyCode::Down));
        let action = panel.handle_key(key(KeyCode::Enter));

        match action {
            Some(Action::ConnectPrinter(name)) => assert_eq!(name, "ender"),
            other => panic!("expected ConnectPrinter, got: {other:?}"),
        }
    }

    #[test]
    fn selection_clamps_at_both_ends() {
        let mut panel = PrinterSelectPanel::new(vec!["a".into(), "b".into()]);

        panel.handle_key(key(KeyCode::Up));
        assert_eq!(panel.selected, 0);

        panel.handle_key(key(KeyCode::Down));
        panel.handle_key(key(KeyCode::Down));
        panel.handle_key(key(KeyCode::Down));
        assert_eq!(panel.selected, 1);
    }

    #[test]
    fn enter_with_no_printers_is_a_noop() {
        let mut panel = PrinterSelectPanel::new(Vec::new());
        assert!(panel.handle_key(key(KeyCode::Enter)).is_none());
    }
}
