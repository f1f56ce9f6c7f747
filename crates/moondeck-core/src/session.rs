//! Session controller -- connection lifecycle, the bounded-retry
//! initialization sequencer, and notification routing.
//!
//! One [`Session`] actor owns the push channel, the REST client, the
//! [`Printer`] state machine, the [`UpdateGate`], and the attempt counter.
//! Everything it reacts to -- push-channel events, UI commands, timer
//! firings, pass outcomes -- arrives as a discrete turn on a biased
//! `select!` loop, so messages are processed strictly in arrival order and
//! a state transition observed in one turn is visible to the navigation
//! driver before the next turn begins.
//!
//! The initialization pass (stages 1-8) runs as a spawned task so the
//! bootstrap round trips never stall message delivery; its outcome is
//! applied back on the actor in a single turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use moondeck_api::{
    ChannelEvent, FileEntry, HostInfo, Notification, NotifyMethod, PowerDevice, PushChannel,
    RestClient, TempStoreEntry, TransportConfig,
};

use crate::config::{PrinterEndpoint, SessionConfig};
use crate::files::FileIndex;
use crate::gate::{GateAction, UpdateGate};
use crate::printer::{Printer, PrinterState, Topology};
use crate::subscriptions::{bulk_query_objects, subscribe_params};

// ── Public surface ───────────────────────────────────────────────────

/// Severity of a user-visible popup message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Intents from the view layer.
#[derive(Debug)]
pub enum SessionCommand {
    /// Connect to (or switch to) a printer. Replaces the current
    /// connection wholesale; in-flight requests keep their old handles.
    Connect(PrinterEndpoint),

    /// Manual re-trigger after retries were exhausted.
    RetryInit,

    /// Re-dispatch the current state so the view layer can rebuild.
    Reload,

    /// Fire-and-forget method invocation over the push channel.
    SendMethod { method: String, params: Value },

    /// Toggle a power device.
    PowerAction { device: String, on: bool },
}

/// Events delivered to the view layer, in turn order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Show (or update) the boot/progress surface. `reset` asks the
    /// navigation driver to clear the stack down to it.
    Splash { message: String, reset: bool },

    /// The printer state machine transitioned. `message` carries composed
    /// display text for error/shutdown.
    StateChanged {
        state: PrinterState,
        message: Option<String>,
    },

    /// A notification to forward to the base view and the subscribed top
    /// panel. `payload` is the raw notification params.
    StatusUpdate { method: NotifyMethod, payload: Value },

    /// Leveled popup for the notification surface.
    Popup { level: MessageLevel, message: String },

    /// Initialization completed; the session is fully synchronized.
    Initialized { hostname: String },

    /// Automatic retries were exhausted; the last message stays displayed
    /// until a manual retry or a fresh connect.
    InitAbandoned { message: String },

    /// The push channel dropped. A reconnect is already scheduled.
    ConnectionLost { reason: String },
}

/// Handle to a running session actor.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn send(&self, cmd: SessionCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("session command dropped: actor is gone");
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the session actor.
///
/// `selection_active` is owned by the navigation driver: while the
/// printer-selection view is active the sequencer refuses to run.
pub fn spawn(
    config: SessionConfig,
    ui_tx: mpsc::UnboundedSender<SessionEvent>,
    selection_active: Arc<AtomicBool>,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let attempts = InitAttempts::new(config.max_retries);

    let session = Session {
        config,
        ui_tx,
        cmd_rx,
        internal_tx,
        internal_rx,
        cancel: cancel.clone(),
        selection_active,
        target: None,
        rest: None,
        push: None,
        chan_rx: None,
        printer: Printer::new(),
        files: FileIndex::new(),
        gate: UpdateGate::new(),
        attempts,
        pending: None,
        retry_timer: None,
        reconnect_timer: None,
        init_task: None,
    };

    tokio::spawn(session.run());

    SessionHandle { cmd_tx, cancel }
}

// ── Attempt counter ──────────────────────────────────────────────────

/// Bounded initialization attempt counter.
///
/// Reset to zero on success and on every fresh connect; incremented per
/// counted retry; beyond the bound automatic retries stop.
#[derive(Debug)]
struct InitAttempts {
    count: u32,
    max: u32,
}

impl InitAttempts {
    fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Count one attempt. Returns `true` while within the bound.
    fn record(&mut self) -> bool {
        self.count += 1;
        self.count <= self.max
    }

    fn exhausted(&self) -> bool {
        self.count > self.max
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn count(&self) -> u32 {
        self.count
    }
}

// ── Internal events ──────────────────────────────────────────────────

#[derive(Debug)]
enum Internal {
    InitOutcome(InitOutcome),
    RetryTimer,
    ReconnectTimer,
}

/// Result of one initialization pass.
#[derive(Debug)]
enum InitOutcome {
    /// Stage 1 failed: the control service itself is unreachable.
    /// Retried without counting against the attempt bound.
    Unreachable { error: String },

    /// Stage 2 failed: the service is up but the firmware link is down.
    LinkDown {
        klippy_state: String,
        power_devices: Option<Vec<PowerDevice>>,
    },

    /// A later required stage failed; the whole sequence reschedules.
    StageFailed { what: &'static str, error: String },

    /// Stages 1-7 succeeded; apply on the actor as stage 8.
    Ready(Box<InitPayload>),
}

#[derive(Debug)]
struct InitPayload {
    host: HostInfo,
    config: serde_json::Map<String, Value>,
    bulk: serde_json::Map<String, Value>,
    temp_store: Option<std::collections::HashMap<String, TempStoreEntry>>,
    power_devices: Option<Vec<PowerDevice>>,
    files: Option<Vec<FileEntry>>,
}

/// Stages 1-7 of the bootstrap pipeline, strictly ordered, each gated on
/// the previous succeeding. Runs off-actor; no shared state is touched.
async fn run_init_pass(rest: &RestClient, push: Option<&PushChannel>) -> InitOutcome {
    // Stage 1: reachability probe.
    let info = match rest.server_info().await {
        Ok(info) => info,
        Err(e) => {
            return InitOutcome::Unreachable {
                error: e.to_string(),
            };
        }
    };

    // Power-device listing, best-effort: hosts without the power
    // component answer with an API error, treated as "none".
    let power_devices = rest.power_devices().await.ok();

    // Stage 2: firmware link embedded in the probe response.
    if !info.klippy_connected {
        return InitOutcome::LinkDown {
            klippy_state: info.klippy_state,
            power_devices,
        };
    }

    // Stage 3: printer identity.
    let host = match rest.printer_info().await {
        Ok(host) => host,
        Err(e) => {
            return InitOutcome::StageFailed {
                what: "printer information",
                error: e.to_string(),
            };
        }
    };

    // Stage 4: configuration snapshot.
    let config_snap = match rest.objects_query(&["configfile".into()]).await {
        Ok(snap) => snap,
        Err(e) => {
            return InitOutcome::StageFailed {
                what: "printer configuration",
                error: e.to_string(),
            };
        }
    };
    let Some(config) = config_snap
        .status
        .get("configfile")
        .and_then(|c| c.get("config"))
        .and_then(Value::as_object)
        .cloned()
    else {
        return InitOutcome::StageFailed {
            what: "printer configuration",
            error: "response missing configfile.config".into(),
        };
    };

    let topology = Topology::discover(&config);

    // Stage 5: install subscriptions. Fire-and-forget; a failure here
    // folds into the next full restart downstream.
    if let Some(push) = push {
        push.send_method("printer.objects.subscribe", subscribe_params(&topology));
    }

    // Stage 6: bulk status fetch over the base set plus topology.
    let bulk = match rest.objects_query(&bulk_query_objects(&topology)).await {
        Ok(snap) => snap.status,
        Err(e) => {
            return InitOutcome::StageFailed {
                what: "printer state",
                error: e.to_string(),
            };
        }
    };

    // Stage 7: temperature history, non-fatal.
    let temp_store = rest.temperature_store().await.ok();

    // File listing, non-fatal.
    let files = rest.files_list("gcodes").await.ok();

    InitOutcome::Ready(Box::new(InitPayload {
        host,
        config,
        bulk,
        temp_store,
        power_devices,
        files,
    }))
}

// ── The actor ────────────────────────────────────────────────────────

struct Session {
    config: SessionConfig,
    ui_tx: mpsc::UnboundedSender<SessionEvent>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    cancel: CancellationToken,
    selection_active: Arc<AtomicBool>,

    /// Requested target host. Preserved across reconnects.
    target: Option<PrinterEndpoint>,
    rest: Option<RestClient>,
    push: Option<PushChannel>,
    chan_rx: Option<mpsc::UnboundedReceiver<ChannelEvent>>,

    printer: Printer,
    files: FileIndex,
    gate: UpdateGate,
    attempts: InitAttempts,
    /// Action riding the in-flight pass; fires when the pass completes.
    pending: Option<GateAction>,

    retry_timer: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    init_task: Option<JoinHandle<()>>,
}

/// Await the next channel event, or never when no channel is open.
async fn recv_channel(
    rx: &mut Option<mpsc::UnboundedReceiver<ChannelEvent>>,
) -> Option<ChannelEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Session {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(cmd) = self.cmd_rx.recv() => self.handle_command(cmd),
                Some(event) = recv_channel(&mut self.chan_rx) => self.handle_channel_event(event),
                Some(event) = self.internal_rx.recv() => self.handle_internal(event),
            }
        }

        if let Some(push) = &self.push {
            push.shutdown();
        }
        for handle in [self.retry_timer.take(), self.reconnect_timer.take(), self.init_task.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
        debug!("session actor stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.ui_tx.send(event);
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect(endpoint) => self.connect(endpoint),
            SessionCommand::RetryInit => {
                self.attempts.reset();
                self.run_gated(GateAction::Reinit);
            }
            SessionCommand::Reload => {
                let state = self.printer.state();
                self.emit_state(state);
            }
            SessionCommand::SendMethod { method, params } => {
                if let Some(push) = &self.push {
                    info!(%method, "method invocation");
                    push.send_method(&method, params);
                } else {
                    self.emit(SessionEvent::Popup {
                        level: MessageLevel::Warning,
                        message: "Not connected".into(),
                    });
                }
            }
            SessionCommand::PowerAction { device, on } => {
                let action = if on { "on" } else { "off" };
                info!(%device, action, "power device toggle");
                self.emit(SessionEvent::Popup {
                    level: MessageLevel::Info,
                    message: format!("Sending power {action} signal to: {device}"),
                });
                if let Some(push) = &self.push {
                    push.send_method(
                        "machine.device_power.post_device",
                        json!({ "device": device, "action": action }),
                    );
                }
            }
        }
    }

    /// Connect to a printer. If a channel is live it is closed first; the
    /// resulting `Closed` event drives reconnection to the new target.
    fn connect(&mut self, endpoint: PrinterEndpoint) {
        info!(printer = %endpoint.name, "connecting");
        self.invalidate_timers();
        self.attempts.reset();
        self.target = Some(endpoint);

        if let Some(push) = &self.push {
            push.shutdown();
            return;
        }
        self.open_channel();
    }

    fn open_channel(&mut self) {
        let Some(endpoint) = self.target.clone() else {
            return;
        };

        self.emit(SessionEvent::Splash {
            message: format!("Connecting to {}", endpoint.name),
            reset: true,
        });

        let transport = TransportConfig {
            timeout: Some(self.config.request_timeout),
            api_key: endpoint.api_key.clone(),
        };
        match RestClient::new(&endpoint.host, endpoint.port, &transport) {
            Ok(client) => self.rest = Some(client),
            Err(e) => {
                error!(error = %e, "invalid printer endpoint");
                self.emit(SessionEvent::Popup {
                    level: MessageLevel::Error,
                    message: format!("Invalid printer endpoint: {e}"),
                });
                return;
            }
        }

        let (push, chan_rx) =
            PushChannel::connect(&endpoint.host, endpoint.port, self.cancel.child_token());
        self.push = Some(push);
        self.chan_rx = Some(chan_rx);
    }

    // ── Channel events ───────────────────────────────────────────────

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                // A fresh connect always resets the counter.
                self.attempts.reset();
                self.run_gated(GateAction::Reinit);
            }
            ChannelEvent::Message(notification) => self.route_notification(notification),
            ChannelEvent::Closed { reason } => self.handle_closed(reason),
        }
    }

    /// Channel loss: reset connection state (topology markers included),
    /// keep the requested target, schedule exactly one reconnect. A stale
    /// in-flight pass is allowed to finish; its results are superseded by
    /// the deferred reinitialization the reconnect enqueues.
    fn handle_closed(&mut self, reason: String) {
        info!(%reason, "push channel lost");
        self.push = None;
        self.chan_rx = None;
        self.printer = Printer::new();
        self.files.reset();
        if let Some(handle) = self.retry_timer.take() {
            handle.abort();
        }

        self.emit(SessionEvent::ConnectionLost {
            reason: reason.clone(),
        });

        if self.target.is_some() {
            if let Some(handle) = self.reconnect_timer.take() {
                handle.abort();
            }
            let tx = self.internal_tx.clone();
            let delay = self.config.reconnect_delay;
            self.reconnect_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Internal::ReconnectTimer);
            }));
        }
    }

    /// Route one push notification: drive the state machine, patch the
    /// caches, surface popups, then forward to the view layer.
    fn route_notification(&mut self, notification: Notification) {
        let Notification { method, params } = notification;
        match &method {
            NotifyMethod::KlippyDisconnected => {
                self.apply_transition(PrinterState::Disconnected);
                return;
            }
            NotifyMethod::KlippyShutdown => self.apply_transition(PrinterState::Shutdown),
            NotifyMethod::KlippyReady => self.apply_transition(PrinterState::Ready),
            NotifyMethod::StatusUpdate => {
                if let Some(status) = params.get(0) {
                    if let Some(state) = self.printer.process_update(status) {
                        self.dispatch_transition(state);
                    }
                }
            }
            NotifyMethod::FilelistChanged => {
                if let Some(change) = params.get(0) {
                    self.files.process_update(change);
                }
            }
            NotifyMethod::MetadataUpdate => {
                if let Some(filename) = params
                    .get(0)
                    .and_then(|p| p.get("filename"))
                    .and_then(Value::as_str)
                {
                    if let Some(push) = &self.push {
                        push.send_method("server.files.metadata", json!({ "filename": filename }));
                    }
                }
            }
            NotifyMethod::UpdateResponse => {
                if let Some(message) = params
                    .get(0)
                    .and_then(|p| p.get("message"))
                    .and_then(Value::as_str)
                {
                    if message.contains("Error") {
                        error!(%message, "update response error");
                        self.emit(SessionEvent::Popup {
                            level: MessageLevel::Error,
                            message: message.to_owned(),
                        });
                    }
                }
            }
            NotifyMethod::PowerChanged => {
                if let Some(update) = params.get(0) {
                    debug!(?update, "power status changed");
                    self.printer.process_power_update(update);
                }
            }
            NotifyMethod::GcodeResponse => {
                if let Some(line) = params.get(0).and_then(Value::as_str) {
                    if let Some((level, message)) =
                        gcode_response_popup(self.printer.state(), line)
                    {
                        self.emit(SessionEvent::Popup { level, message });
                    }
                }
            }
            NotifyMethod::Other(_) => {}
        }

        self.emit(SessionEvent::StatusUpdate {
            method,
            payload: params,
        });
    }

    // ── State dispatch through the gate ──────────────────────────────

    fn apply_transition(&mut self, state: PrinterState) {
        if let Some(transition) = self.printer.change_state(state) {
            self.dispatch_transition(transition);
        }
    }

    /// Every state transition re-synchronizes before its callback fires:
    /// the transition rides an initialization pass through the gate.
    fn dispatch_transition(&mut self, state: PrinterState) {
        self.run_gated(GateAction::StateEvent(state));
    }

    /// Run a gated action. If a pass is in flight the action defers
    /// (last call wins at release). If the sequencer is blocked -- the
    /// selection view is active, retries are exhausted, or there is no
    /// endpoint -- the pass is skipped but a state callback still fires.
    fn run_gated(&mut self, action: GateAction) {
        if self.gate.is_busy() {
            self.gate.defer(action);
            return;
        }

        let blocked = self.selection_active.load(Ordering::Relaxed)
            || self.attempts.exhausted()
            || self.rest.is_none();
        if blocked {
            if let GateAction::StateEvent(state) = action {
                self.emit_state(state);
            }
            return;
        }

        let Some(rest) = self.rest.clone() else {
            return;
        };
        self.gate.start();
        self.pending = Some(action);

        let push = self.push.clone();
        let tx = self.internal_tx.clone();
        self.init_task = Some(tokio::spawn(async move {
            let outcome = run_init_pass(&rest, push.as_ref()).await;
            let _ = tx.send(Internal::InitOutcome(outcome));
        }));
    }

    // ── Internal events ──────────────────────────────────────────────

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::InitOutcome(outcome) => self.handle_outcome(outcome),
            Internal::RetryTimer => {
                self.retry_timer = None;
                self.run_gated(GateAction::Reinit);
            }
            Internal::ReconnectTimer => {
                self.reconnect_timer = None;
                self.open_channel();
            }
        }
    }

    /// Stage 8 plus failure handling: apply results or schedule the next
    /// retry, fire the pending action, then release the gate and replay
    /// at most one deferred action.
    fn handle_outcome(&mut self, outcome: InitOutcome) {
        self.init_task = None;

        match outcome {
            InitOutcome::Unreachable { error: e } => {
                // Stage 1 retries do not count against the bound.
                info!(error = %e, "control service unreachable");
                self.emit(SessionEvent::Splash {
                    message: format!("Control service unreachable\n\n{e}"),
                    reset: false,
                });
                self.schedule_retry();
            }
            InitOutcome::LinkDown {
                klippy_state,
                power_devices,
            } => {
                if let Some(devices) = power_devices {
                    self.printer.configure_power_devices(devices);
                }
                let within = self.attempts.record();
                let mut message = format!("Service: connected\n\nKlipper: {klippy_state}");
                if within {
                    message.push_str(&format!("\n\nRetrying #{}", self.attempts.count()));
                }
                info!(%klippy_state, attempt = self.attempts.count(), "firmware link down");
                self.emit(SessionEvent::Splash {
                    message: message.clone(),
                    reset: false,
                });
                if within {
                    self.schedule_retry();
                } else {
                    self.abandon(message);
                }
            }
            InitOutcome::StageFailed { what, error: e } => {
                let within = self.attempts.record();
                warn!(what, error = %e, attempt = self.attempts.count(), "initialization stage failed");
                let message = format!("Error fetching {what}\n\n{e}");
                self.emit(SessionEvent::Splash {
                    message: message.clone(),
                    reset: false,
                });
                if within {
                    self.schedule_retry();
                } else {
                    self.abandon(message);
                }
            }
            InitOutcome::Ready(payload) => {
                self.attempts.reset();
                self.printer.reinit(payload.host.clone(), &payload.config);
                if let Some(devices) = payload.power_devices {
                    self.printer.configure_power_devices(devices);
                }
                if let Some(store) = payload.temp_store {
                    self.printer.init_temp_store(store);
                }
                // Transitions caused by the bulk merge defer behind the
                // gate and replay below.
                if let Some(state) = self.printer.process_update(&Value::Object(payload.bulk)) {
                    self.dispatch_transition(state);
                }
                if let Some(listing) = payload.files {
                    self.files.refresh(listing);
                }
                let hostname = self
                    .printer
                    .host()
                    .map(|h| h.hostname.clone())
                    .unwrap_or_default();
                info!(%hostname, "printer initialized");
                self.emit(SessionEvent::Initialized { hostname });
            }
        }

        // The action that rode this pass fires regardless of outcome, so
        // e.g. the disconnected splash shows while retries continue.
        if let Some(action) = self.pending.take() {
            if let GateAction::StateEvent(state) = action {
                self.emit_state(state);
            }
        }

        match self.gate.release() {
            Some(GateAction::StateEvent(state)) => self.emit_state(state),
            Some(GateAction::Reinit) => self.run_gated(GateAction::Reinit),
            None => {}
        }
    }

    fn abandon(&mut self, message: String) {
        warn!(attempts = self.attempts.count(), "giving up on automatic initialization retries");
        self.emit(SessionEvent::InitAbandoned { message });
    }

    /// Schedule the next pass, invalidating any previous handle first so
    /// one stage never has two in-flight timers.
    fn schedule_retry(&mut self) {
        if let Some(handle) = self.retry_timer.take() {
            handle.abort();
        }
        let tx = self.internal_tx.clone();
        let delay = self.config.retry_delay;
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::RetryTimer);
        }));
    }

    fn invalidate_timers(&mut self) {
        for handle in [self.retry_timer.take(), self.reconnect_timer.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    fn emit_state(&mut self, state: PrinterState) {
        let message = match state {
            PrinterState::Error => Some(error_display_message(self.printer.state_message())),
            PrinterState::Shutdown => Some(shutdown_display_message(self.printer.state_message())),
            _ => None,
        };
        self.emit(SessionEvent::StateChanged { state, message });
    }
}

// ── Display helpers ──────────────────────────────────────────────────

/// Compose the user-visible error text, with domain-specific hints.
fn error_display_message(state_message: Option<&str>) -> String {
    let detail = state_message.unwrap_or("");
    let mut message = String::from("Klipper has encountered an error.\n");
    if detail.contains("FIRMWARE_RESTART") {
        message.push_str("A FIRMWARE_RESTART may fix the issue.\n");
    } else if detail.contains("micro-controller") {
        message.push_str("Please recompile and flash the micro-controller.\n");
    }
    message.push('\n');
    message.push_str(detail);
    message
}

/// Compose the user-visible shutdown text.
fn shutdown_display_message(state_message: Option<&str>) -> String {
    let detail = state_message.filter(|m| !m.contains("ready")).unwrap_or("");
    format!("Klipper has shutdown\n\n{detail}")
}

/// Decide whether a console line becomes a popup. Temperature chatter is
/// suppressed, and nothing surfaces while the host is down -- the
/// error/shutdown surface already owns the screen.
fn gcode_response_popup(state: PrinterState, line: &str) -> Option<(MessageLevel, String)> {
    if matches!(state, PrinterState::Error | PrinterState::Shutdown) {
        return None;
    }
    if line.starts_with("B:") || line.starts_with("T:") {
        return None;
    }
    if let Some(text) = line.strip_prefix("echo: ") {
        return Some((MessageLevel::Info, text.to_owned()));
    }
    if let Some(text) = line.strip_prefix("!! ") {
        return Some((MessageLevel::Error, text.to_owned()));
    }
    None
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn attempts_allow_exactly_max_retries() {
        let mut attempts = InitAttempts::new(4);

        // Failures 1-4: within the bound, retries keep scheduling.
        for i in 1..=4 {
            assert!(attempts.record(), "attempt {i} should be within the bound");
            assert!(!attempts.exhausted());
        }

        // Fifth consecutive failure: terminal.
        assert!(!attempts.record());
        assert!(attempts.exhausted());

        // A successful probe (or fresh connect) resets to zero.
        attempts.reset();
        assert_eq!(attempts.count(), 0);
        assert!(!attempts.exhausted());
        assert!(attempts.record());
    }

    #[test]
    fn stage_one_failures_do_not_touch_the_counter() {
        // Mirrors handle_outcome: Unreachable never calls record().
        let attempts = InitAttempts::new(4);
        assert_eq!(attempts.count(), 0);
        assert!(!attempts.exhausted());
    }

    #[test]
    fn gcode_echo_and_error_lines_become_popups() {
        let popup = gcode_response_popup(PrinterState::Ready, "echo: bed mesh loaded").unwrap();
        assert_eq!(popup, (MessageLevel::Info, "bed mesh loaded".into()));

        let popup = gcode_response_popup(PrinterState::Printing, "!! Extrude below minimum temp").unwrap();
        assert_eq!(popup.0, MessageLevel::Error);
    }

    #[test]
    fn temperature_chatter_is_suppressed() {
        assert!(gcode_response_popup(PrinterState::Ready, "B:60.0 /60.0 T:210.1 /210.0").is_none());
        assert!(gcode_response_popup(PrinterState::Ready, "T:210.1 /210.0").is_none());
    }

    #[test]
    fn no_popups_while_host_is_down() {
        assert!(gcode_response_popup(PrinterState::Error, "echo: hello").is_none());
        assert!(gcode_response_popup(PrinterState::Shutdown, "!! boom").is_none());
    }

    #[test]
    fn error_message_includes_firmware_restart_hint() {
        let message = error_display_message(Some("Lost communication. FIRMWARE_RESTART required"));
        assert!(message.contains("A FIRMWARE_RESTART may fix the issue."));
        assert!(message.contains("Lost communication"));

        let message = error_display_message(Some("micro-controller protocol mismatch"));
        assert!(message.contains("recompile and flash"));
    }

    #[test]
    fn shutdown_message_drops_ready_noise() {
        let message = shutdown_display_message(Some("Printer is ready"));
        assert!(!message.contains("Printer is ready"));

        let message = shutdown_display_message(Some("Heater extruder not heating"));
        assert!(message.contains("Heater extruder"));
    }

    #[tokio::test]
    async fn reload_reemits_the_current_state() {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let handle = spawn(
            SessionConfig::default(),
            ui_tx,
            Arc::new(AtomicBool::new(false)),
        );

        handle.send(SessionCommand::Reload);

        let event = ui_rx.recv().await.unwrap();
        match event {
            SessionEvent::StateChanged { state, message } => {
                assert_eq!(state, PrinterState::Disconnected);
                assert!(message.is_none());
            }
            other => panic!("expected StateChanged, got: {other:?}"),
        }
        handle.shutdown();
    }

    #[tokio::test]
    async fn send_method_without_a_connection_warns() {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let handle = spawn(
            SessionConfig::default(),
            ui_tx,
            Arc::new(AtomicBool::new(false)),
        );

        handle.send(SessionCommand::SendMethod {
            method: "printer.emergency_stop".into(),
            params: json!({}),
        });

        let event = ui_rx.recv().await.unwrap();
        match event {
            SessionEvent::Popup { level, message } => {
                assert_eq!(level, MessageLevel::Warning);
                assert_eq!(message, "Not connected");
            }
            other => panic!("expected Popup, got: {other:?}"),
        }
        handle.shutdown();
    }
}
