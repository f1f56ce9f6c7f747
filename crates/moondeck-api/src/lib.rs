//! Async client for a Moonraker-compatible printer host.
//!
//! Two surfaces, mirroring the two halves of the Moonraker protocol:
//!
//! - **[`RestClient`]** — the synchronous request/response API used during
//!   session bootstrap (`server_info`, `printer_info`, object queries,
//!   temperature history, device power). Responses arrive in a
//!   `{ "result": ... }` envelope which is stripped before the caller sees it.
//!
//! - **[`PushChannel`]** — the persistent JSON-RPC 2.0 WebSocket carrying
//!   server-initiated notifications (`notify_status_update`,
//!   `notify_klippy_ready`, ...). The channel reports its lifecycle to the
//!   owner as [`ChannelEvent`]s and never reconnects on its own — retry
//!   policy belongs to the session controller, not the transport.
//!
//! This crate contains no business logic: state tracking, retry sequencing,
//! and subscription management live in `moondeck-core`.

pub mod error;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use rest::{
    FileEntry, HostInfo, PowerDevice, RestClient, ServerInfo, StatusSnapshot, TempStoreEntry,
};
pub use transport::TransportConfig;
pub use websocket::{ChannelEvent, Notification, NotifyMethod, PushChannel};
