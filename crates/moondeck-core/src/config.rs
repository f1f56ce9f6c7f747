//! Session configuration types.

use std::time::Duration;

use secrecy::SecretString;

/// Where to find one printer host.
#[derive(Debug, Clone)]
pub struct PrinterEndpoint {
    /// Display name, from configuration.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub api_key: Option<SecretString>,
}

/// Tuning knobs for the session controller.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between initialization retries of a failed stage.
    pub retry_delay: Duration,

    /// Delay before the single reconnect attempt after channel loss.
    pub reconnect_delay: Duration,

    /// Initialization attempts beyond this bound stop auto-retrying.
    pub max_retries: u32,

    /// Per-request timeout for the bootstrap REST calls.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(2),
            max_retries: 4,
            request_timeout: Duration::from_secs(10),
        }
    }
}
