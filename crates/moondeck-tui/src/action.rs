//! All possible UI actions. Actions are the sole mechanism for state
//! mutation in the app loop.

use moondeck_core::SessionEvent;

use crate::panel::PanelId;

#[derive(Debug, Clone)]
pub enum Action {
    /// Exit the application.
    Quit,

    /// Periodic housekeeping (popup timeouts).
    Tick,

    /// Draw a frame.
    Render,

    /// Terminal resized to (cols, rows).
    Resize(u16, u16),

    /// Pop the top panel (Backspace).
    GoBack,

    /// Pop to the root panel (Esc).
    GoHome,

    /// Push a panel on top of the stack.
    ShowPanel(PanelId),

    /// Connect to a configured printer by name.
    ConnectPrinter(String),

    /// Manual initialization re-trigger from the splash surface.
    RetryInit,

    /// Fire-and-forget method invocation on the host.
    Invoke { method: String },

    /// An event from the session controller.
    Session(SessionEvent),
}
