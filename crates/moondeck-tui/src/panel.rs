//! Panel capability trait and panel identifiers.
//!
//! Every view the navigation stack manages implements [`Panel`]. All
//! lifecycle and data-delivery capabilities default to no-ops; a panel
//! opts in by overriding the method, and the stack drives whatever the
//! panel exposes -- activate/deactivate on stack-top changes, delta
//! delivery for panels that want updates, in-place refresh for panels
//! that can restart their content.

use std::fmt;

use crossterm::event::KeyEvent;
use ratatui::{Frame, layout::Rect};
use serde_json::Value;

use moondeck_core::NotifyMethod;

use crate::action::Action;

/// Identifies each panel the console can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelId {
    /// Boot/progress surface; shows initialization and error text.
    Splash,
    /// Printer selection list. While active, connection attempts are
    /// pre-empted.
    PrinterSelect,
    /// Main menu, shown when the printer is ready.
    MainMenu,
    /// Print-progress view, shown while printing or paused.
    JobStatus,
}

impl PanelId {
    /// Panels whose instances survive a pop-all.
    pub fn persistent(self) -> bool {
        matches!(self, Self::Splash | Self::PrinterSelect)
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Splash => "moondeck",
            Self::PrinterSelect => "Printer Select",
            Self::MainMenu => "Main Menu",
            Self::JobStatus => "Printing",
        }
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Every navigable view implements Panel.
///
/// Lifecycle: built lazily on first show, then
/// (`activate` | `deactivate` | `process_update` | `handle_key` | `render`)*
/// until a pop-all drops the instance.
pub trait Panel: Send {
    /// Unique identifier for stack membership and memoization.
    fn id(&self) -> PanelId;

    /// Called when this panel becomes the visible stack top.
    fn activate(&mut self) {}

    /// Called when this panel stops being the visible stack top.
    fn deactivate(&mut self) {}

    /// Whether this panel wants notification deltas while visible.
    fn wants_updates(&self) -> bool {
        false
    }

    /// Deliver one forwarded notification. Only called while this panel
    /// is the stack top and [`wants_updates`](Self::wants_updates) is true.
    fn process_update(&mut self, _method: &NotifyMethod, _payload: &Value) {}

    /// Restart the panel's content in place (e.g. a new print started
    /// while the progress view is already visible).
    fn refresh(&mut self) {}

    /// Update the panel's status text, for message-bearing surfaces.
    fn set_status_text(&mut self, _text: &str) {}

    /// Handle a key while this panel is the stack top. Return an Action
    /// to dispatch, or None.
    fn handle_key(&mut self, _key: KeyEvent) -> Option<Action> {
        None
    }

    /// Render into the provided frame area.
    fn render(&self, frame: &mut Frame, area: Rect);
}
