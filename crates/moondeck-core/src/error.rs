use thiserror::Error;

/// Errors surfaced by the session and state layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A transport or protocol failure from the API layer.
    #[error("control service error: {0}")]
    Api(#[from] moondeck_api::Error),

    /// An operation that needs a live session was attempted without one.
    #[error("session is not connected")]
    NotConnected,

    /// Automatic initialization retries were exhausted.
    #[error("initialization abandoned after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
