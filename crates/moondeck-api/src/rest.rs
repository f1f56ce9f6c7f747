// Moonraker REST client
//
// Wraps `reqwest::Client` with Moonraker-specific URL construction and
// envelope unwrapping. The host answers every request with either
// `{ "result": ... }` or `{ "error": { "code", "message" } }`; the envelope
// is stripped before the caller sees it.

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

// ── Response types ───────────────────────────────────────────────────

/// `GET /server/info` — service reachability and host link status.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Whether the service currently holds a connection to the firmware host.
    pub klippy_connected: bool,

    /// Host state as reported by the service: `"ready"`, `"startup"`,
    /// `"shutdown"`, `"error"`, or `"disconnected"`.
    #[serde(default)]
    pub klippy_state: String,

    /// Optional service components (power, history, ...).
    #[serde(default)]
    pub components: Vec<String>,
}

/// `GET /printer/info` — printer identity and firmware link details.
#[derive(Debug, Clone, Deserialize)]
pub struct HostInfo {
    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub state_message: String,

    #[serde(default)]
    pub hostname: String,

    #[serde(default)]
    pub software_version: String,
}

/// `GET /printer/objects/query` — a point-in-time object status snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub eventtime: f64,

    /// Object name -> field map. Only the queried objects/fields appear.
    #[serde(default)]
    pub status: serde_json::Map<String, Value>,
}

/// One sensor's history from `GET /server/temperature_store`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TempStoreEntry {
    #[serde(default)]
    pub temperatures: Vec<f64>,
    #[serde(default)]
    pub targets: Vec<f64>,
    #[serde(default)]
    pub powers: Vec<f64>,
    #[serde(default)]
    pub speeds: Vec<f64>,
}

/// One entry from `GET /machine/device_power/devices`.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerDevice {
    pub device: String,

    /// `"on"` or `"off"`.
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub locked_while_printing: bool,
}

#[derive(Debug, Deserialize)]
struct PowerDeviceList {
    #[serde(default)]
    devices: Vec<PowerDevice>,
}

/// One entry from `GET /server/files/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub path: String,

    #[serde(default)]
    pub modified: f64,

    #[serde(default)]
    pub size: u64,
}

// ── RestClient ───────────────────────────────────────────────────────

/// Raw HTTP client for the Moonraker request/response API.
///
/// Cheaply cloneable (wraps `reqwest::Client`). A failed request returns
/// `Err` rather than panicking; ordinary unreachability classifies as
/// transient via [`Error::is_transient`], so callers can fold it into
/// their retry path.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Create a new client for `http://{host}:{port}`.
    pub fn new(host: &str, port: u16, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("http://{host}:{port}/"))?;
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// The host base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Service reachability probe plus firmware-host link status.
    pub async fn server_info(&self) -> Result<ServerInfo, Error> {
        self.get(self.api_url("server/info", None)?).await
    }

    /// Printer identity: hostname, software version, host state.
    pub async fn printer_info(&self) -> Result<HostInfo, Error> {
        self.get(self.api_url("printer/info", None)?).await
    }

    /// Query the given objects (all fields each) in one round trip.
    pub async fn objects_query(&self, objects: &[String]) -> Result<StatusSnapshot, Error> {
        let query = objects.join("&");
        self.get(self.api_url("printer/objects/query", Some(&query))?)
            .await
    }

    /// Temperature history for every sensor the host tracks.
    pub async fn temperature_store(&self) -> Result<HashMap<String, TempStoreEntry>, Error> {
        self.get(self.api_url("server/temperature_store", None)?)
            .await
    }

    /// List configured power devices. Hosts without the power component
    /// answer with an API error, which callers treat as "none".
    pub async fn power_devices(&self) -> Result<Vec<PowerDevice>, Error> {
        let list: PowerDeviceList = self
            .get(self.api_url("machine/device_power/devices", None)?)
            .await?;
        Ok(list.devices)
    }

    /// List files under the given root (usually `"gcodes"`).
    pub async fn files_list(&self, root: &str) -> Result<Vec<FileEntry>, Error> {
        let query = format!("root={root}");
        self.get(self.api_url("server/files/list", Some(&query))?)
            .await
    }

    /// Toggle a power device. `action` is `"on"`, `"off"`, or `"toggle"`.
    pub async fn post_power_action(&self, device: &str, action: &str) -> Result<Value, Error> {
        let query = format!("device={device}&action={action}");
        self.post(self.api_url("machine/device_power/device", Some(&query))?)
            .await
    }

    // ── URL + request helpers ────────────────────────────────────────

    fn api_url(&self, path: &str, query: Option<&str>) -> Result<Url, Error> {
        let mut url = self.base_url.join(path)?;
        url.set_query(query);
        Ok(url)
    }

    /// Send a GET request and unwrap the result envelope.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        parse_envelope(resp).await
    }

    /// Send a bodyless POST request and unwrap the result envelope.
    async fn post<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self.http.post(url).send().await.map_err(Error::Transport)?;
        parse_envelope(resp).await
    }
}

/// Parse the `{ result }` / `{ error }` envelope, returning the decoded
/// `result` on success or [`Error::Api`] when the host reports a failure.
async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::Transport)?;

    let value: Value = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.clone(),
    })?;

    if let Some(err) = value.get("error") {
        return Err(Error::Api {
            code: err
                .get("code")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| i64::from(status.as_u16())),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned(),
        });
    }

    let result = value.get("result").cloned().ok_or_else(|| Error::Deserialization {
        message: "response missing `result` field".into(),
        body: body.clone(),
    })?;

    serde_json::from_value(result).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_server_info() {
        let json = r#"{
            "klippy_connected": true,
            "klippy_state": "ready",
            "components": ["klippy_connection", "machine", "data_store"]
        }"#;

        let info: ServerInfo = serde_json::from_str(json).unwrap();
        assert!(info.klippy_connected);
        assert_eq!(info.klippy_state, "ready");
        assert_eq!(info.components.len(), 3);
    }

    #[test]
    fn deserialize_status_snapshot() {
        let json = r#"{
            "eventtime": 578243.57824499,
            "status": {
                "extruder": { "temperature": 24.61, "target": 0.0 },
                "webhooks": { "state": "ready", "state_message": "Printer is ready" }
            }
        }"#;

        let snap: StatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.status.len(), 2);
        assert_eq!(snap.status["webhooks"]["state"], "ready");
    }

    #[test]
    fn deserialize_temp_store_entry_with_missing_series() {
        let json = r#"{ "temperatures": [21.0, 21.5] }"#;
        let entry: TempStoreEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.temperatures.len(), 2);
        assert!(entry.targets.is_empty());
    }
}
