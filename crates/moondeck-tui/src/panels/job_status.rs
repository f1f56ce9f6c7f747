//! Job status panel — print progress from live status deltas.

use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Gauge, Paragraph},
};
use serde_json::Value;

use moondeck_core::NotifyMethod;

use crate::panel::{Panel, PanelId};
use crate::theme;

#[derive(Debug, Default)]
pub struct JobStatusPanel {
    filename: String,
    print_state: String,
    progress: f64,
    print_duration: f64,
    filament_used: f64,
    message: String,
}

impl JobStatusPanel {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_status(&mut self, status: &Value) {
        if let Some(stats) = status.get("print_stats") {
            if let Some(filename) = stats.get("filename").and_then(Value::as_str) {
                self.filename = filename.to_owned();
            }
            if let Some(state) = stats.get("state").and_then(Value::as_str) {
                self.print_state = state.to_owned();
            }
            if let Some(duration) = stats.get("print_duration").and_then(Value::as_f64) {
                self.print_duration = duration;
            }
            if let Some(filament) = stats.get("filament_used").and_then(Value::as_f64) {
                self.filament_used = filament;
            }
            if let Some(message) = stats.get("message").and_then(Value::as_str) {
                self.message = message.to_owned();
            }
        }
        // virtual_sdcard progress is the more reliable of the two sources.
        if let Some(progress) = status
            .get("virtual_sdcard")
            .and_then(|v| v.get("progress"))
            .and_then(Value::as_f64)
            .or_else(|| {
                status
                    .get("display_status")
                    .and_then(|d| d.get("progress"))
                    .and_then(Value::as_f64)
            })
        {
            self.progress = progress.clamp(0.0, 1.0);
        }
    }
}

impl Panel for JobStatusPanel {
    fn id(&self) -> PanelId {
        PanelId::JobStatus
    }

    fn wants_updates(&self) -> bool {
        true
    }

    fn process_update(&mut self, method: &NotifyMethod, payload: &Value) {
        if *method != NotifyMethod::StatusUpdate {
            return;
        }
        if let Some(status) = payload.get(0) {
            self.apply_status(status);
        }
    }

    /// A new print started while this panel is already visible: restart
    /// the content in place instead of navigating.
    fn refresh(&mut self) {
        *self = Self::new();
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Printing ")
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let layout = Layout::vertical([
            Constraint::Length(2), // filename + state
            Constraint::Length(1), // gauge
            Constraint::Length(2), // durations
            Constraint::Min(0),    // message
        ])
        .split(inner);

        let head = vec![
            Line::from(vec![
                Span::styled(" File: ", theme::key_hint()),
                Span::raw(self.filename.as_str()),
            ]),
            Line::from(vec![
                Span::styled(" State: ", theme::key_hint()),
                Span::raw(self.print_state.as_str()),
            ]),
        ];
        frame.render_widget(Paragraph::new(head), layout[0]);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (self.progress * 100.0).round() as u16;
        let gauge = Gauge::default()
            .ratio(self.progress)
            .label(format!("{percent}%"));
        frame.render_widget(gauge, layout[1]);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let elapsed = humantime::format_duration(Duration::from_secs(self.print_duration as u64));
        let stats = vec![
            Line::from(vec![
                Span::styled(" Elapsed: ", theme::key_hint()),
                Span::raw(elapsed.to_string()),
            ]),
            Line::from(vec![
                Span::styled(" Filament: ", theme::key_hint()),
                Span::raw(format!("{:.1} mm", self.filament_used)),
            ]),
        ];
        frame.render_widget(Paragraph::new(stats), layout[2]);

        if !self.message.is_empty() {
            frame.render_widget(
                Paragraph::new(Line::from(Span::raw(format!(" {}", self.message)))),
                layout[3],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deltas_accumulate_into_the_view_state() {
        let mut panel = JobStatusPanel::new();

        panel.process_update(
            &NotifyMethod::StatusUpdate,
            &json!([{
                "print_stats": { "filename": "benchy.gcode", "state": "printing" },
                "virtual_sdcard": { "progress": 0.25 }
            }, 1.0]),
        );
        panel.process_update(
            &NotifyMethod::StatusUpdate,
            &json!([{
                "print_stats": { "print_duration": 654.0 },
                "virtual_sdcard": { "progress": 0.5 }
            }, 2.0]),
        );

        // Later deltas update named fields; earlier fields persist.
        assert_eq!(panel.filename, "benchy.gcode");
        assert_eq!(panel.progress, 0.5);
        assert_eq!(panel.print_duration, 654.0);
    }

    #[test]
    fn refresh_resets_for_a_new_print() {
        let mut panel = JobStatusPanel::new();
        panel.process_update(
            &NotifyMethod::StatusUpdate,
            &json!([{ "virtual_sdcard": { "progress": 0.9 } }, 1.0]),
        );

        panel.refresh();
        assert_eq!(panel.progress, 0.0);
        assert!(panel.filename.is_empty());
    }

    #[test]
    fn non_status_notifications_are_ignored() {
        let mut panel = JobStatusPanel::new();
        panel.process_update(
            &NotifyMethod::GcodeResponse,
            &json!(["echo: not a status delta"]),
        );
        assert!(panel.filename.is_empty());
    }
}
