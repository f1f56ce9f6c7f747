//! Session and state controller between `moondeck-api` and the console UI.
//!
//! This crate owns everything that keeps a long-lived screen process
//! synchronized with the printer host over an unreliable connection:
//!
//! - **[`session`]** — the `Session` actor: connection lifecycle, the
//!   bounded-retry initialization sequencer, notification routing, and
//!   the [`SessionEvent`] / [`SessionCommand`] contract with the UI.
//!
//! - **[`Printer`]** — the operational state machine
//!   (startup/ready/printing/paused/error/shutdown/disconnected), the
//!   merge-only object-status cache, discovered [`Topology`], power
//!   devices, and temperature history.
//!
//! - **[`subscriptions`]** — computes the (object, fields) set to
//!   subscribe to from a fixed base set plus the topology.
//!
//! - **[`UpdateGate`]** — single-flight coordinator: at most one
//!   initialization pass in flight, at most one deferred replay
//!   (last call wins).
//!
//! - **[`FileIndex`]** — a light mirror of the host's gcode listing.

pub mod config;
pub mod error;
pub mod files;
pub mod gate;
pub mod printer;
pub mod session;
pub mod subscriptions;

pub use moondeck_api::NotifyMethod;

pub use config::{PrinterEndpoint, SessionConfig};
pub use error::CoreError;
pub use files::FileIndex;
pub use gate::{GateAction, UpdateGate};
pub use printer::{Printer, PrinterState, TempHistory, Topology};
pub use session::{
    MessageLevel, SessionCommand, SessionEvent, SessionHandle, spawn as spawn_session,
};
