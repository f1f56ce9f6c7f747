//! Application core — event loop, navigation driving, action dispatch.
//!
//! The app is the navigation driver for the session controller: it maps
//! session events onto the panel stack through one exhaustive per-state
//! hook, forwards status deltas to the subscribed top panel, and turns
//! user intents into session commands. All mutation happens through
//! [`Action`]s drained in turn order, so a state transition observed in
//! one turn is applied to the stack before the next turn begins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use moondeck_config::Config;
use moondeck_core::{
    MessageLevel, NotifyMethod, PrinterState, SessionCommand, SessionConfig, SessionEvent,
    SessionHandle, spawn_session,
};

use crate::action::Action;
use crate::event::{Event, EventReader};
use crate::navigation::{BackOutcome, NavigationStack, ReplacePolicy};
use crate::panel::{Panel, PanelId};
use crate::panels::{JobStatusPanel, MainMenuPanel, PrinterSelectPanel, SplashPanel};
use crate::theme;
use crate::tui::Tui;

/// How long a popup toast stays up before auto-dismissing.
const POPUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Header state fed from session events -- the persistent base view.
/// Unlike stacked panels it receives every forwarded delta.
#[derive(Debug)]
struct Header {
    printer: Option<String>,
    hostname: Option<String>,
    state: PrinterState,
    extruder_temp: Option<f64>,
    extruder_target: Option<f64>,
    bed_temp: Option<f64>,
}

/// Active popup toast.
#[derive(Debug)]
struct Toast {
    level: MessageLevel,
    message: String,
    shown: Instant,
}

/// Top-level application state and event loop.
pub struct App {
    config: Config,
    /// Printer requested on the command line, overriding the config.
    printer_override: Option<String>,
    nav: NavigationStack,
    running: bool,
    /// Action sender — panels and forward tasks dispatch through this.
    action_tx: mpsc::UnboundedSender<Action>,
    /// Action receiver — main loop drains this.
    action_rx: mpsc::UnboundedReceiver<Action>,
    session: SessionHandle,
    /// Shared with the session: while the printer-selection panel is on
    /// the stack, the initialization sequencer refuses to run.
    selection_active: Arc<AtomicBool>,
    header: Header,
    popup: Option<Toast>,
}

impl App {
    /// Create the app and spawn the session actor.
    pub fn new(config: Config, printer_override: Option<String>) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (session_tx, mut session_rx) = mpsc::unbounded_channel();
        let selection_active = Arc::new(AtomicBool::new(false));

        let session = spawn_session(
            SessionConfig::default(),
            session_tx,
            Arc::clone(&selection_active),
        );

        // Forward session events into the action loop so everything is
        // processed in one place, in arrival order.
        let forward_tx = action_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = session_rx.recv().await {
                if forward_tx.send(Action::Session(event)).is_err() {
                    break;
                }
            }
        });

        Self {
            config,
            printer_override,
            nav: NavigationStack::new(),
            running: true,
            action_tx,
            action_rx,
            session,
            selection_active,
            header: Header {
                printer: None,
                hostname: None,
                state: PrinterState::Disconnected,
                extruder_temp: None,
                extruder_target: None,
                bed_temp: None,
            },
            popup: None,
        }
    }

    /// Run the main event loop. This is the heart of the console.
    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;

        self.initial_connection();

        let mut events = EventReader::new(
            Duration::from_millis(250), // 4 Hz tick
            Duration::from_millis(33),  // ~30 FPS render
        );

        info!("console event loop started");

        while self.running {
            // 1. Wait for the next event
            let Some(event) = events.next().await else {
                break;
            };

            // 2. Map event → action
            match event {
                Event::Key(key) => {
                    if let Some(action) = self.handle_key(key) {
                        self.action_tx.send(action)?;
                    }
                }
                Event::Resize(w, h) => self.action_tx.send(Action::Resize(w, h))?,
                Event::Tick => self.action_tx.send(Action::Tick)?,
                Event::Render => self.action_tx.send(Action::Render)?,
            }

            // 3. Drain and process all queued actions in arrival order
            while let Ok(action) = self.action_rx.try_recv() {
                self.process_action(&action);

                if let Action::Render = action {
                    tui.draw(|frame| self.render(frame))?;
                }
            }
        }

        events.stop();
        self.session.shutdown();
        info!("console event loop ended");
        Ok(())
    }

    /// Connect to the configured startup printer, or fall back to the
    /// selection view when the choice is ambiguous.
    fn initial_connection(&mut self) {
        let startup = self
            .printer_override
            .clone()
            .filter(|name| self.config.printers.iter().any(|p| &p.name == name))
            .or_else(|| moondeck_config::startup_printer(&self.config).map(|p| p.name.clone()));

        match startup {
            Some(name) => self.connect_printer(&name),
            None => self.show_panel(PanelId::PrinterSelect, ReplacePolicy::PopAll),
        }
    }

    // ── Key mapping ──────────────────────────────────────────────────

    /// Global keys first; everything else goes to the top panel.
    fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Some(Action::Quit),
            (KeyModifiers::NONE, KeyCode::Char('q')) => return Some(Action::Quit),
            (KeyModifiers::NONE, KeyCode::Esc) => return Some(Action::GoHome),
            (KeyModifiers::NONE, KeyCode::Backspace) => return Some(Action::GoBack),
            _ => {}
        }
        self.nav.top_panel_mut()?.handle_key(key)
    }

    // ── Action processing ────────────────────────────────────────────

    fn process_action(&mut self, action: &Action) {
        match action {
            Action::Quit => self.running = false,

            Action::Render => {}

            // Layout is recomputed from the frame area on every render.
            Action::Resize(..) => {}

            Action::Tick => {
                if let Some(toast) = &self.popup {
                    if toast.shown.elapsed() > POPUP_TIMEOUT {
                        self.popup = None;
                    }
                }
            }

            Action::GoBack => {
                self.popup = None;
                match self.nav.go_back() {
                    // Backing out of the last panel reloads state instead.
                    BackOutcome::Reload => self.session.send(SessionCommand::Reload),
                    BackOutcome::Popped => {}
                }
                self.sync_selection();
            }

            Action::GoHome => {
                self.popup = None;
                self.nav.go_home();
                self.sync_selection();
            }

            Action::ShowPanel(id) => self.show_panel(*id, ReplacePolicy::None),

            Action::ConnectPrinter(name) => self.connect_printer(name),

            Action::RetryInit => self.session.send(SessionCommand::RetryInit),

            Action::Invoke { method } => self.session.send(SessionCommand::SendMethod {
                method: method.clone(),
                params: json!({}),
            }),

            Action::Session(event) => self.handle_session_event(event.clone()),
        }
    }

    fn connect_printer(&mut self, name: &str) {
        let Some(endpoint) = self
            .config
            .printers
            .iter()
            .find(|p| p.name == name)
            .map(moondeck_config::resolve_endpoint)
        else {
            self.popup = Some(Toast {
                level: MessageLevel::Error,
                message: format!("Unknown printer: {name}"),
                shown: Instant::now(),
            });
            return;
        };

        info!(printer = name, "connecting");
        self.header.printer = Some(name.to_owned());
        self.header.hostname = None;
        self.show_splash(&format!("Connecting to {name}"), true);
        self.session.send(SessionCommand::Connect(endpoint));
    }

    // ── Session events ───────────────────────────────────────────────

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Splash { message, reset } => self.show_splash(&message, reset),

            SessionEvent::StateChanged { state, message } => {
                self.header.state = state;
                self.on_state_changed(state, message);
            }

            SessionEvent::StatusUpdate { method, payload } => {
                // Base view first, then the subscribed top panel.
                self.update_header(&method, &payload);
                self.nav.deliver_update(&method, &payload);
            }

            SessionEvent::Popup { level, message } => {
                self.popup = Some(Toast {
                    level,
                    message,
                    shown: Instant::now(),
                });
            }

            SessionEvent::Initialized { hostname } => {
                self.header.hostname = (!hostname.is_empty()).then_some(hostname);
            }

            SessionEvent::InitAbandoned { message } => {
                self.show_splash(&message, false);
                self.popup = Some(Toast {
                    level: MessageLevel::Error,
                    message: "Initialization failed; press r to retry".into(),
                    shown: Instant::now(),
                });
            }

            SessionEvent::ConnectionLost { reason } => {
                self.show_splash(&format!("Connection lost\n\n{reason}"), true);
            }
        }
    }

    /// The per-state navigation hook -- one arm per printer state.
    ///
    /// Ownership of "what happens on ready" is context-dependent: while
    /// the print-progress panel is on the stack, a ready transition is
    /// suppressed so job completion keeps the progress view up, and a
    /// printing transition refreshes it in place instead of navigating.
    fn on_state_changed(&mut self, state: PrinterState, message: Option<String>) {
        debug!(%state, "state hook");
        match state {
            PrinterState::Startup => {
                self.show_splash("Klipper is attempting to start", false);
            }
            PrinterState::Ready => {
                if self.nav.contains(PanelId::JobStatus) {
                    return;
                }
                self.popup = None;
                self.show_panel(PanelId::MainMenu, ReplacePolicy::PopAll);
            }
            PrinterState::Printing => {
                if self.nav.contains(PanelId::JobStatus) {
                    self.nav.refresh_panel(PanelId::JobStatus);
                } else {
                    self.popup = None;
                    self.show_panel(PanelId::JobStatus, ReplacePolicy::PopAll);
                }
            }
            PrinterState::Paused => {
                if !self.nav.contains(PanelId::JobStatus) {
                    self.show_panel(PanelId::JobStatus, ReplacePolicy::PopAll);
                }
            }
            PrinterState::Error => {
                let text =
                    message.unwrap_or_else(|| "Klipper has encountered an error.".into());
                self.show_splash(&text, true);
            }
            PrinterState::Shutdown => {
                let text = message.unwrap_or_else(|| "Klipper has shutdown".into());
                self.show_splash(&text, true);
            }
            PrinterState::Disconnected => {
                self.show_splash("Klipper has disconnected", true);
            }
        }
    }

    // ── Navigation helpers ───────────────────────────────────────────

    fn show_panel(&mut self, id: PanelId, replace: ReplacePolicy) {
        let printers: Vec<String> = self.config.printers.iter().map(|p| p.name.clone()).collect();
        self.nav.show(id, replace, || match id {
            PanelId::Splash => Box::new(SplashPanel::new()) as Box<dyn Panel>,
            PanelId::PrinterSelect => Box::new(PrinterSelectPanel::new(printers)),
            PanelId::MainMenu => Box::new(MainMenuPanel::new()),
            PanelId::JobStatus => Box::new(JobStatusPanel::new()),
        });
        self.sync_selection();
    }

    /// Show (or just update) the splash surface. `reset` clears the
    /// stack down to it; otherwise an existing instance only gets new
    /// text, wherever it sits.
    fn show_splash(&mut self, message: &str, reset: bool) {
        if reset || !self.nav.has_instance(PanelId::Splash) {
            self.show_panel(PanelId::Splash, ReplacePolicy::PopAll);
        }
        if let Some(panel) = self.nav.panel_mut(PanelId::Splash) {
            panel.set_status_text(message);
        }
    }

    /// Fold temperature fields out of a status delta into the header.
    fn update_header(&mut self, method: &NotifyMethod, payload: &Value) {
        if *method != NotifyMethod::StatusUpdate {
            return;
        }
        let Some(status) = payload.get(0) else { return };
        if let Some(extruder) = status.get("extruder") {
            if let Some(temp) = extruder.get("temperature").and_then(Value::as_f64) {
                self.header.extruder_temp = Some(temp);
            }
            if let Some(target) = extruder.get("target").and_then(Value::as_f64) {
                self.header.extruder_target = Some(target);
            }
        }
        if let Some(temp) = status
            .get("heater_bed")
            .and_then(|b| b.get("temperature"))
            .and_then(Value::as_f64)
        {
            self.header.bed_temp = Some(temp);
        }
    }

    /// Keep the shared sequencer guard in sync with stack membership.
    fn sync_selection(&mut self) {
        self.selection_active.store(
            self.nav.contains(PanelId::PrinterSelect),
            Ordering::Relaxed,
        );
    }

    // ── Rendering ────────────────────────────────────────────────────

    /// Render the full frame: header (base view), panel content, status
    /// bar, popup overlay.
    fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let layout = Layout::vertical([
            Constraint::Length(1), // header
            Constraint::Min(1),    // panel content
            Constraint::Length(1), // status bar
        ])
        .split(area);

        self.render_header(frame, layout[0]);

        if let Some(panel) = self.nav.top_panel() {
            panel.render(frame, layout[1]);
        }

        self.render_status_bar(frame, layout[2]);

        if let Some(toast) = &self.popup {
            self.render_toast(frame, area, toast);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let printer = self.header.printer.as_deref().unwrap_or("no printer");
        let mut spans = vec![
            Span::raw(" "),
            Span::styled(printer, theme::title_style()),
        ];
        if let Some(hostname) = &self.header.hostname {
            spans.push(Span::styled(
                format!(" ({hostname})"),
                theme::key_hint(),
            ));
        }
        spans.push(Span::styled(
            format!("  ● {}", self.header.state),
            Style::default().fg(theme::state_color(self.header.state)),
        ));
        if let Some(temp) = self.header.extruder_temp {
            let target = self.header.extruder_target.unwrap_or(0.0);
            spans.push(Span::styled(
                format!("  E:{temp:.0}/{target:.0}"),
                theme::key_hint(),
            ));
        }
        if let Some(temp) = self.header.bed_temp {
            spans.push(Span::styled(format!("  B:{temp:.0}"), theme::key_hint()));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let line = Line::from(vec![
            Span::styled(" Backspace ", theme::key_hint_key()),
            Span::styled("back  ", theme::key_hint()),
            Span::styled("Esc ", theme::key_hint_key()),
            Span::styled("home  ", theme::key_hint()),
            Span::styled("q ", theme::key_hint_key()),
            Span::styled("quit", theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    /// Render a popup toast in the bottom-right corner.
    #[allow(clippy::unused_self)]
    fn render_toast(&self, frame: &mut Frame, area: Rect, toast: &Toast) {
        #[allow(clippy::cast_possible_truncation)]
        let msg_len = toast.message.len().min(u16::MAX as usize) as u16;
        let width = (msg_len + 6).clamp(20, 60);
        let height = 3u16;

        let x = area.width.saturating_sub(width + 1);
        let y = area.height.saturating_sub(height + 2); // above status bar
        let toast_area = Rect::new(area.x + x, area.y + y, width, height);

        let color = theme::level_color(toast.level);
        let icon = match toast.level {
            MessageLevel::Info => "·",
            MessageLevel::Warning => "!",
            MessageLevel::Error => "✗",
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(color));

        let inner = block.inner(toast_area);
        frame.render_widget(ratatui::widgets::Clear, toast_area);
        frame.render_widget(block, toast_area);

        let line = Line::from(vec![
            Span::styled(format!(" {icon} "), Style::default().fg(color)),
            Span::raw(toast.message.as_str()),
        ]);
        frame.render_widget(Paragraph::new(line), inner);
    }
}

// ── Tests ────────────────────────────────────────────────────────────
