//! Main menu panel, shown when the printer is ready.

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

/// A menu entry and the action it dispatches.
struct MenuItem {
    label: &'static str,
    action: fn() -> Action,
}

const ITEMS: &[MenuItem] = &[
    MenuItem {
        label: "Job status",
        action: || Action::ShowPanel(PanelId::JobStatus),
    },
    MenuItem {
        label: "Printer select",
        action: || Action::ShowPanel(PanelId::PrinterSelect),
    },
    MenuItem {
        label: "Firmware restart",
        action: || Action::Invoke {
            method: "printer.firmware_restart".into(),
        },
    },
    MenuItem {
        label: "Restart host service",
        action: || Action::Invoke {
            method: "printer.restart".into(),
        },
    },
    MenuItem {
        label: "Emergency stop",
        action: || Action::Invoke {
            method: "printer.emergency_stop".into(),
        },
    },
];

pub struct MainMenuPanel {
    selected: usize,
}

impl MainMenuPanel {
    pub fn new() -> Self {
        Self { selected: 0 }
    }
}

impl Panel for MainMenuPanel {
    fn id(&self) -> PanelId {
        PanelId::MainMenu
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < ITEMS.len() {
                    self.selected += 1;
                }
                None
            }
            KeyCode::Enter => ITEMS.get(self.selected).map(|item| (item.action)()),
            _ => None,
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Main Menu ")
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let layout = Layout::vertical([
            Constraint::Min(1),    // items
            Constraint::Length(1), // hints
        ])
        .split(inner);

        let lines: Vec<Line> = ITEMS
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if i == self.selected {
                    Line::from(Span::styled(
                        format!("  {}  ", item.label),
                        theme::selected_row(),
                    ))
                } else {
                    Line::from(format!("  {}", item.label))
                }
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), layout[0]);

        let hints = Line::from(vec![
            Span::styled(" ↑/↓ ", theme::key_hint_key()),
            Span::styled("select  ", theme::key_hint()),
            Span::styled("Enter ", theme::key_hint_key()),
            Span::styled("open  ", theme::key_hint()),
            Span::styled("Esc ", theme::key_hint_key()),
            Span::styled("home", theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(hints), layout[1]);
    }
}
