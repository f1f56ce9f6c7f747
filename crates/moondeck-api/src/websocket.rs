//! JSON-RPC 2.0 push channel to the printer host.
//!
//! Connects to the host's WebSocket endpoint and streams server-initiated
//! notifications to the owner as [`ChannelEvent`]s over an mpsc channel.
//! Outgoing method invocations are fire-and-forget -- response frames for
//! sent requests are logged and dropped, never correlated.
//!
//! The channel deliberately does NOT reconnect: it emits
//! [`ChannelEvent::Closed`] exactly once per connection instance (covering
//! both failed connects and mid-stream loss) and stops. Reconnect policy
//! belongs to the owning session controller.
//!
//! # Example
//!
//! ```rust,ignore
//! use moondeck_api::websocket::{ChannelEvent, PushChannel};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let (channel, mut events) = PushChannel::connect("mainsailos.local", 7125, cancel.clone());
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChannelEvent::Connected => channel.send_method("server.info", serde_json::json!({})),
//!         ChannelEvent::Message(n) => println!("{}", n.method.as_str()),
//!         ChannelEvent::Closed { reason } => break,
//!     }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

// ── NotifyMethod ─────────────────────────────────────────────────────

/// Notification methods the host pushes over the channel.
///
/// Unknown methods are preserved verbatim in [`NotifyMethod::Other`] so
/// nothing from the host is silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyMethod {
    /// Firmware-host link lost.
    KlippyDisconnected,
    /// Firmware host entered shutdown.
    KlippyShutdown,
    /// Firmware host (re)entered ready.
    KlippyReady,
    /// Partial object-status delta.
    StatusUpdate,
    /// File created/deleted/moved under a file root.
    FilelistChanged,
    /// Metadata became available for a file.
    MetadataUpdate,
    /// Progress/error line from a software update.
    UpdateResponse,
    /// A power device changed state.
    PowerChanged,
    /// Console output line from the firmware.
    GcodeResponse,
    /// Any other notification, kept by raw method name.
    Other(String),
}

impl NotifyMethod {
    pub fn parse(method: &str) -> Self {
        match method {
            "notify_klippy_disconnected" => Self::KlippyDisconnected,
            "notify_klippy_shutdown" => Self::KlippyShutdown,
            "notify_klippy_ready" => Self::KlippyReady,
            "notify_status_update" => Self::StatusUpdate,
            "notify_filelist_changed" => Self::FilelistChanged,
            "notify_metadata_update" => Self::MetadataUpdate,
            "notify_update_response" => Self::UpdateResponse,
            "notify_power_changed" => Self::PowerChanged,
            "notify_gcode_response" => Self::GcodeResponse,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::KlippyDisconnected => "notify_klippy_disconnected",
            Self::KlippyShutdown => "notify_klippy_shutdown",
            Self::KlippyReady => "notify_klippy_ready",
            Self::StatusUpdate => "notify_status_update",
            Self::FilelistChanged => "notify_filelist_changed",
            Self::MetadataUpdate => "notify_metadata_update",
            Self::UpdateResponse => "notify_update_response",
            Self::PowerChanged => "notify_power_changed",
            Self::GcodeResponse => "notify_gcode_response",
            Self::Other(s) => s,
        }
    }
}

// ── Channel events ───────────────────────────────────────────────────

/// A parsed notification from the push channel.
#[derive(Debug, Clone)]
pub struct Notification {
    pub method: NotifyMethod,

    /// Raw `params` payload, untouched. Most notifications carry a
    /// single-element array; status updates carry `[status, eventtime]`.
    pub params: Value,
}

/// Lifecycle and message events delivered to the channel owner.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The WebSocket handshake completed.
    Connected,
    /// A notification arrived.
    Message(Notification),
    /// The connection is gone. Emitted exactly once per connection
    /// instance, whether the connect failed or an established stream
    /// dropped. No further events follow.
    Closed { reason: String },
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Handle to a running push-channel connection.
///
/// Cheaply cloneable. Dropping all handles does not close the socket;
/// cancel the token passed to [`connect`](Self::connect) for that.
#[derive(Clone)]
pub struct PushChannel {
    out_tx: mpsc::UnboundedSender<String>,
    next_id: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl PushChannel {
    /// Spawn the connection task for `ws://{host}:{port}/websocket`.
    ///
    /// Returns immediately; the handshake happens asynchronously and is
    /// reported through the returned event receiver.
    pub fn connect(
        host: &str,
        port: u16,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let ws_url = format!("ws://{host}:{port}/websocket");
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            channel_loop(ws_url, out_rx, event_tx, task_cancel).await;
        });

        let channel = Self {
            out_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            cancel,
        };
        (channel, event_rx)
    }

    /// Fire-and-forget JSON-RPC method invocation.
    ///
    /// Assigns a fresh request id so the host answers cleanly, but the
    /// response is dropped on arrival -- there is no correlation at this
    /// layer. Sending on a closed channel logs and discards.
    pub fn send_method(&self, method: &str, params: Value) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = rpc_request(id, method, &params);
        if self.out_tx.send(frame).is_err() {
            tracing::debug!(method, "send_method on closed push channel");
        }
    }

    /// Close the connection. The task emits its final `Closed` event.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Serialize a JSON-RPC 2.0 request frame.
fn rpc_request(id: u64, method: &str, params: &Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id,
    })
    .to_string()
}

// ── Connection task ──────────────────────────────────────────────────

/// Single connection lifecycle: connect, pump frames both ways, emit
/// `Closed` exactly once on the way out.
async fn channel_loop(
    ws_url: String,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
) {
    tracing::info!(url = %ws_url, "connecting push channel");

    let ws_stream = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            let _ = event_tx.send(ChannelEvent::Closed { reason: "cancelled before connect".into() });
            return;
        }
        result = tokio_tungstenite::connect_async(ws_url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "push channel connect failed");
                let _ = event_tx.send(ChannelEvent::Closed { reason: e.to_string() });
                return;
            }
        }
    };

    tracing::info!("push channel connected");
    let _ = event_tx.send(ChannelEvent::Connected);

    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break "closed by client".to_owned(),

            Some(frame) = out_rx.recv() => {
                if let Err(e) = write.send(tungstenite::Message::Text(frame.into())).await {
                    break format!("send failed: {e}");
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(notification) = parse_frame(text.as_str()) {
                            let _ = event_tx.send(ChannelEvent::Message(notification));
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("push channel ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        break match frame {
                            Some(cf) => format!("close frame ({}): {}", cf.code, cf.reason),
                            None => "close frame".to_owned(),
                        };
                    }
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_owned(),
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    };

    tracing::info!(%reason, "push channel closed");
    let _ = event_tx.send(ChannelEvent::Closed { reason });
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Raw JSON-RPC frame shape: notifications carry `method`, responses
/// carry `id` with `result` or `error`.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    error: Option<Value>,
}

/// Parse an incoming text frame. Returns the notification to forward,
/// or `None` for responses (logged and dropped) and malformed frames.
fn parse_frame(text: &str) -> Option<Notification> {
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable push frame");
            return None;
        }
    };

    if let Some(method) = frame.method {
        return Some(Notification {
            method: NotifyMethod::parse(&method),
            params: frame.params.unwrap_or(Value::Null),
        });
    }

    // Response to a fire-and-forget request: surface errors in the log,
    // otherwise drop silently.
    if let Some(id) = frame.id {
        match frame.error {
            Some(err) => tracing::warn!(id, error = %err, "method invocation failed"),
            None => tracing::trace!(id, "method invocation acknowledged"),
        }
    }
    None
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_update_notification() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "notify_status_update",
            "params": [{ "extruder": { "temperature": 210.2 } }, 578243.57]
        }"#;

        let n = parse_frame(text).unwrap();
        assert_eq!(n.method, NotifyMethod::StatusUpdate);
        assert_eq!(n.params[0]["extruder"]["temperature"], 210.2);
    }

    #[test]
    fn parse_lifecycle_notification_without_params() {
        let text = r#"{ "jsonrpc": "2.0", "method": "notify_klippy_ready" }"#;

        let n = parse_frame(text).unwrap();
        assert_eq!(n.method, NotifyMethod::KlippyReady);
        assert!(n.params.is_null());
    }

    #[test]
    fn parse_unknown_notification_keeps_raw_name() {
        let text = r#"{ "jsonrpc": "2.0", "method": "notify_proc_stat_update", "params": [{}] }"#;

        let n = parse_frame(text).unwrap();
        assert_eq!(
            n.method,
            NotifyMethod::Other("notify_proc_stat_update".into())
        );
        assert_eq!(n.method.as_str(), "notify_proc_stat_update");
    }

    #[test]
    fn responses_are_dropped() {
        let text = r#"{ "jsonrpc": "2.0", "id": 4, "result": { "connection_id": 12 } }"#;
        assert!(parse_frame(text).is_none());
    }

    #[test]
    fn error_responses_are_dropped() {
        let text = r#"{ "jsonrpc": "2.0", "id": 9, "error": { "code": -32601, "message": "Method not found" } }"#;
        assert!(parse_frame(text).is_none());
    }

    #[test]
    fn malformed_frames_are_dropped() {
        assert!(parse_frame("not json at all").is_none());
    }

    #[test]
    fn rpc_request_shape() {
        let frame = rpc_request(7, "printer.emergency_stop", &json!({}));
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "printer.emergency_stop");
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn notify_method_parse_round_trips() {
        for raw in [
            "notify_klippy_disconnected",
            "notify_klippy_shutdown",
            "notify_klippy_ready",
            "notify_status_update",
            "notify_filelist_changed",
            "notify_metadata_update",
            "notify_update_response",
            "notify_power_changed",
            "notify_gcode_response",
        ] {
            assert_eq!(NotifyMethod::parse(raw).as_str(), raw);
        }
    }
}
