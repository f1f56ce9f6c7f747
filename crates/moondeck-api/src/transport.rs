// Shared transport configuration for building reqwest::Client instances.
//
// Moonraker speaks plain HTTP on the LAN; the only cross-cutting concerns
// are the request timeout and the optional X-Api-Key header, which is
// injected as a default header so every request carries it.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub timeout: Option<Duration>,
    pub api_key: Option<SecretString>,
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ref key) = self.api_key {
            let mut value = reqwest::header::HeaderValue::from_str(key.expose_secret())
                .map_err(|_| crate::error::Error::Api {
                    code: 0,
                    message: "API key contains invalid header characters".into(),
                })?;
            value.set_sensitive(true);
            headers.insert("X-Api-Key", value);
        }

        reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .user_agent(concat!("moondeck/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(crate::error::Error::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_without_api_key() {
        let config = TransportConfig::default();
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn builds_with_api_key() {
        let config = TransportConfig {
            timeout: Some(Duration::from_secs(5)),
            api_key: Some(SecretString::from("abc123")),
        };
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn rejects_invalid_api_key() {
        let config = TransportConfig {
            timeout: None,
            api_key: Some(SecretString::from("bad\nkey")),
        };
        assert!(config.build_client().is_err());
    }
}
