use thiserror::Error;

/// Top-level error type for the `moondeck-api` crate.
///
/// Covers every failure mode across both API surfaces: HTTP transport,
/// the Moonraker result/error envelope, and the WebSocket push channel.
/// `moondeck-core` maps these into retry decisions and user-facing text.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Moonraker API ───────────────────────────────────────────────
    /// Structured error from the host (parsed from the `{"error": ...}`
    /// envelope).
    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The push channel is gone (send attempted after close).
    #[error("Push channel closed")]
    ChannelClosed,
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying --
    /// ordinary unreachability rather than a malformed response.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::WebSocketConnect(_) | Self::ChannelClosed => true,
            _ => false,
        }
    }
}
