//! Configuration for the moondeck console.
//!
//! TOML printer profiles with env-var overrides, resolved through figment,
//! and translation to `moondeck_core::PrinterEndpoint`. The config file is
//! deliberately small: which printers exist, which one to reach first, and
//! where the log goes. Everything else the session learns from the host.

use std::path::PathBuf;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use moondeck_core::PrinterEndpoint;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Printer to connect to at startup. With exactly one printer
    /// configured this is implicit; with several and no default the
    /// console opens on the selection view.
    pub default_printer: Option<String>,

    /// Log file path override.
    pub log_file: Option<PathBuf>,

    /// Configured printers, in file order.
    #[serde(default, rename = "printer")]
    pub printers: Vec<PrinterProfile>,
}

/// One `[[printer]]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterProfile {
    pub name: String,

    /// Host name or address of the control service.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// API key (plaintext — prefer `api_key_env`).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    7125
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "moondeck", "moondeck").map_or_else(
        || PathBuf::from("moondeck.toml"),
        |dirs| dirs.config_dir().join("moondeck.toml"),
    )
}

/// Default log file location.
pub fn default_log_path() -> PathBuf {
    std::env::temp_dir().join("moondeck.log")
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load configuration from the default path plus `MOONDECK_` env vars.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load configuration from an explicit path plus `MOONDECK_` env vars.
/// A missing file yields the defaults rather than an error.
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MOONDECK_"))
        .extract()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    for profile in &config.printers {
        if profile.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "printer.name".into(),
                reason: "must not be empty".into(),
            });
        }
        if profile.port == 0 {
            return Err(ConfigError::Validation {
                field: format!("printer.{}.port", profile.name),
                reason: "must be non-zero".into(),
            });
        }
    }
    Ok(())
}

// ── Endpoint resolution ─────────────────────────────────────────────

/// Resolve a profile to a connectable endpoint. The API key comes from
/// the named env var when set, falling back to the plaintext value.
pub fn resolve_endpoint(profile: &PrinterProfile) -> PrinterEndpoint {
    let api_key = profile
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .or_else(|| profile.api_key.clone())
        .map(SecretString::from);

    PrinterEndpoint {
        name: profile.name.clone(),
        host: profile.host.clone(),
        port: profile.port,
        api_key,
    }
}

/// The printer to connect to at startup, if any: the configured default
/// when it names a known printer, otherwise a sole configured printer.
/// `None` means the selection view decides.
pub fn startup_printer(config: &Config) -> Option<&PrinterProfile> {
    if let Some(name) = &config.default_printer {
        if let Some(profile) = config.printers.iter().find(|p| &p.name == name) {
            return Some(profile);
        }
    }
    match config.printers.as_slice() {
        [only] => Some(only),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_printer_tables() {
        let file = write_config(
            r#"
            default_printer = "voron"

            [[printer]]
            name = "voron"
            host = "192.168.1.40"

            [[printer]]
            name = "ender"
            host = "192.168.1.41"
            port = 7126
            api_key = "secret"
            "#,
        );

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.printers.len(), 2);
        assert_eq!(config.printers[0].port, 7125);
        assert_eq!(config.printers[1].port, 7126);
        assert_eq!(config.default_printer.as_deref(), Some("voron"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from(std::path::Path::new("/nonexistent/moondeck.toml")).unwrap();
        assert!(config.printers.is_empty());
        assert!(config.default_printer.is_none());
    }

    #[test]
    fn rejects_empty_printer_name() {
        let file = write_config(
            r#"
            [[printer]]
            name = ""
            "#,
        );

        let result = load_config_from(file.path());
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn startup_printer_prefers_default_then_sole_entry() {
        let file = write_config(
            r#"
            default_printer = "b"

            [[printer]]
            name = "a"

            [[printer]]
            name = "b"
            "#,
        );
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(startup_printer(&config).unwrap().name, "b");

        let file = write_config(
            r#"
            [[printer]]
            name = "solo"
            "#,
        );
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(startup_printer(&config).unwrap().name, "solo");

        let file = write_config(
            r#"
            [[printer]]
            name = "a"

            [[printer]]
            name = "b"
            "#,
        );
        let config = load_config_from(file.path()).unwrap();
        assert!(startup_printer(&config).is_none());
    }

    #[test]
    fn endpoint_resolution_prefers_env_key() {
        let profile = PrinterProfile {
            name: "voron".into(),
            host: "localhost".into(),
            port: 7125,
            api_key: Some("plain".into()),
            api_key_env: Some("MOONDECK_TEST_KEY_DOES_NOT_EXIST".into()),
        };

        // Env var unset: falls back to the plaintext key.
        let endpoint = resolve_endpoint(&profile);
        assert!(endpoint.api_key.is_some());
        assert_eq!(endpoint.port, 7125);
    }
}
