//! Printer operational state machine and live object-status cache.
//!
//! [`Printer`] is the canonical model of the remote machine: exactly one
//! [`PrinterState`] at a time, a merge-only cache of every object field the
//! host has ever reported, the discovered [`Topology`] of dynamic objects,
//! the power-device registry, and a bounded temperature history.
//!
//! The cache is owned exclusively by the session controller; panels see
//! values only through forwarded deltas and read-only lookups.

use std::collections::{BTreeMap, VecDeque};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use moondeck_api::{HostInfo, PowerDevice, TempStoreEntry};

/// Number of temperature samples retained per sensor (20 min at ~1 Hz).
const TEMP_HISTORY_CAP: usize = 1200;

// ── PrinterState ─────────────────────────────────────────────────────

/// Operational state of the printer host.
///
/// Transitions: `startup → ready`; any state may enter `error`, `shutdown`,
/// or `disconnected`; `ready ⇄ printing ⇄ paused`; `printing`/`paused`
/// return to `ready` on completion. [`Printer::change_state`] is the only
/// mutation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrinterState {
    Startup,
    Ready,
    Printing,
    Paused,
    Error,
    Shutdown,
    Disconnected,
}

// ── Topology ─────────────────────────────────────────────────────────

/// Discovered sets of dynamically named objects, recomputed once per
/// successful initialization from the configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub tools: Vec<String>,
    pub heaters: Vec<String>,
    pub fans: Vec<String>,
    pub filament_sensors: Vec<String>,
    pub output_pins: Vec<String>,
}

impl Topology {
    /// Discover dynamic objects from the `configfile.config` section names.
    pub fn discover(config: &Map<String, Value>) -> Self {
        let mut topology = Self::default();
        for section in config.keys() {
            if section == "extruder"
                || (section.starts_with("extruder") && !section.contains(' '))
            {
                topology.tools.push(section.clone());
            } else if section == "heater_bed" || section.starts_with("heater_generic ") {
                topology.heaters.push(section.clone());
            } else if section == "fan"
                || section.starts_with("fan_generic ")
                || section.starts_with("heater_fan ")
                || section.starts_with("controller_fan ")
            {
                topology.fans.push(section.clone());
            } else if section.starts_with("filament_switch_sensor ")
                || section.starts_with("filament_motion_sensor ")
            {
                topology.filament_sensors.push(section.clone());
            } else if section.starts_with("output_pin ") {
                topology.output_pins.push(section.clone());
            }
        }
        topology
    }

    /// Every discovered object name, in registry order.
    pub fn all_objects(&self) -> impl Iterator<Item = &String> {
        self.tools
            .iter()
            .chain(&self.heaters)
            .chain(&self.fans)
            .chain(&self.filament_sensors)
            .chain(&self.output_pins)
    }
}

// ── Temperature history ──────────────────────────────────────────────

/// Bounded history of one sensor's temperature and target series.
#[derive(Debug, Clone, Default)]
pub struct TempHistory {
    pub temperatures: VecDeque<f64>,
    pub targets: VecDeque<f64>,
}

impl TempHistory {
    fn push(&mut self, temperature: f64, target: Option<f64>) {
        push_capped(&mut self.temperatures, temperature);
        if let Some(t) = target {
            push_capped(&mut self.targets, t);
        }
    }
}

fn push_capped(series: &mut VecDeque<f64>, value: f64) {
    if series.len() == TEMP_HISTORY_CAP {
        series.pop_front();
    }
    series.push_back(value);
}

// ── Printer ──────────────────────────────────────────────────────────

/// The canonical printer model: state machine plus object-status cache.
#[derive(Debug, Default)]
pub struct Printer {
    state: Option<PrinterState>,
    status: BTreeMap<String, Map<String, Value>>,
    topology: Topology,
    host: Option<HostInfo>,
    power_devices: BTreeMap<String, String>,
    temp_history: BTreeMap<String, TempHistory>,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current operational state. `Disconnected` until the first transition.
    pub fn state(&self) -> PrinterState {
        self.state.unwrap_or(PrinterState::Disconnected)
    }

    /// Host identity from the last initialization, if any.
    pub fn host(&self) -> Option<&HostInfo> {
        self.host.as_ref()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Set the operational state. Returns the new state when an actual
    /// transition occurred, `None` when the state was already `new` --
    /// the per-state callback must fire at most once per change.
    pub fn change_state(&mut self, new: PrinterState) -> Option<PrinterState> {
        if self.state == Some(new) {
            return None;
        }
        debug!(from = ?self.state, to = %new, "printer state transition");
        self.state = Some(new);
        Some(new)
    }

    /// Wipe the cache and rediscover topology from a fresh configuration
    /// snapshot. Called once per successful initialization; the bulk
    /// status fetch is merged afterwards via [`process_update`].
    ///
    /// [`process_update`]: Self::process_update
    pub fn reinit(&mut self, host: HostInfo, config: &Map<String, Value>) {
        self.status.clear();
        self.temp_history.clear();
        self.topology = Topology::discover(config);
        self.host = Some(host);

        let mut configfile = Map::new();
        configfile.insert("config".into(), Value::Object(config.clone()));
        self.status.insert("configfile".into(), configfile);

        debug!(
            tools = self.topology.tools.len(),
            heaters = self.topology.heaters.len(),
            fans = self.topology.fans.len(),
            sensors = self.topology.filament_sensors.len(),
            pins = self.topology.output_pins.len(),
            "topology discovered"
        );
    }

    /// Merge a status delta into the cache and re-derive the operational
    /// state. Returns the state transition this delta caused, if any.
    ///
    /// Deltas are dropped while the machine is `shutdown` -- rendering
    /// field updates for a host known to be down would be misleading.
    pub fn process_update(&mut self, payload: &Value) -> Option<PrinterState> {
        if self.state() == PrinterState::Shutdown {
            warn!("dropping status delta while host is shut down");
            return None;
        }

        let Some(objects) = payload.as_object() else {
            warn!("status delta is not an object, dropping");
            return None;
        };

        for (object, fields) in objects {
            let Some(fields) = fields.as_object() else {
                continue;
            };
            let entry = self.status.entry(object.clone()).or_default();
            for (field, value) in fields {
                entry.insert(field.clone(), value.clone());
            }
            self.record_temperature(object);
        }

        self.evaluate_state().and_then(|s| self.change_state(s))
    }

    /// Look up the last known value of one object field.
    pub fn get_stat(&self, object: &str, field: &str) -> Option<&Value> {
        self.status.get(object)?.get(field)
    }

    /// The `webhooks.state_message` text, used for error/shutdown hints.
    pub fn state_message(&self) -> Option<&str> {
        self.get_stat("webhooks", "state_message")?.as_str()
    }

    // ── Power devices ────────────────────────────────────────────────

    /// Replace the power-device registry from a device listing.
    pub fn configure_power_devices(&mut self, devices: Vec<PowerDevice>) {
        self.power_devices = devices
            .into_iter()
            .map(|d| (d.device, d.status))
            .collect();
    }

    /// Apply a `notify_power_changed` payload (`{device, status}`).
    pub fn process_power_update(&mut self, payload: &Value) {
        let (Some(device), Some(status)) = (
            payload.get("device").and_then(Value::as_str),
            payload.get("status").and_then(Value::as_str),
        ) else {
            warn!("malformed power update, dropping");
            return;
        };
        self.power_devices
            .insert(device.to_owned(), status.to_owned());
    }

    pub fn power_device_status(&self, device: &str) -> Option<&str> {
        self.power_devices.get(device).map(String::as_str)
    }

    pub fn power_devices(&self) -> impl Iterator<Item = (&String, &String)> {
        self.power_devices.iter()
    }

    // ── Temperature history ──────────────────────────────────────────

    /// Seed sensor histories from the host's temperature store.
    pub fn init_temp_store(&mut self, store: std::collections::HashMap<String, TempStoreEntry>) {
        for (object, entry) in store {
            let history = self.temp_history.entry(object).or_default();
            history.temperatures = entry
                .temperatures
                .into_iter()
                .rev()
                .take(TEMP_HISTORY_CAP)
                .rev()
                .collect();
            history.targets = entry
                .targets
                .into_iter()
                .rev()
                .take(TEMP_HISTORY_CAP)
                .rev()
                .collect();
        }
    }

    pub fn temp_history(&self, object: &str) -> Option<&TempHistory> {
        self.temp_history.get(object)
    }

    /// Append the object's current temperature/target to its history,
    /// if the object reports one.
    fn record_temperature(&mut self, object: &str) {
        let Some(fields) = self.status.get(object) else {
            return;
        };
        let Some(temperature) = fields.get("temperature").and_then(Value::as_f64) else {
            return;
        };
        let target = fields.get("target").and_then(Value::as_f64);
        self.temp_history
            .entry(object.to_owned())
            .or_default()
            .push(temperature, target);
    }

    // ── State derivation ─────────────────────────────────────────────

    /// Derive the operational state from the cached `webhooks` and
    /// `print_stats` fields, the way the host reports it.
    fn evaluate_state(&self) -> Option<PrinterState> {
        let webhooks = self.get_stat("webhooks", "state")?.as_str()?;
        Some(match webhooks {
            "ready" => match self
                .get_stat("print_stats", "state")
                .and_then(Value::as_str)
            {
                Some("printing") => PrinterState::Printing,
                Some("paused") => PrinterState::Paused,
                _ => PrinterState::Ready,
            },
            "startup" => PrinterState::Startup,
            "shutdown" => PrinterState::Shutdown,
            "error" => PrinterState::Error,
            _ => return None,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn host() -> HostInfo {
        serde_json::from_value(json!({
            "state": "ready",
            "hostname": "voron",
            "software_version": "v0.12.0"
        }))
        .unwrap()
    }

    fn config(sections: &[&str]) -> Map<String, Value> {
        sections
            .iter()
            .map(|s| ((*s).to_owned(), json!({})))
            .collect()
    }

    #[test]
    fn change_state_is_idempotent() {
        let mut printer = Printer::new();
        assert_eq!(
            printer.change_state(PrinterState::Ready),
            Some(PrinterState::Ready)
        );
        // Same state again: no transition, no callback.
        assert_eq!(printer.change_state(PrinterState::Ready), None);
        assert_eq!(
            printer.change_state(PrinterState::Printing),
            Some(PrinterState::Printing)
        );
    }

    #[test]
    fn merge_is_field_wise_union_with_later_values_winning() {
        let mut printer = Printer::new();
        printer.change_state(PrinterState::Ready);

        printer.process_update(&json!({
            "extruder": { "temperature": 25.0, "target": 0.0 },
            "toolhead": { "homed_axes": "" }
        }));
        printer.process_update(&json!({
            "extruder": { "temperature": 180.5 }
        }));

        // Later value wins for the named field...
        assert_eq!(
            printer.get_stat("extruder", "temperature").unwrap(),
            &json!(180.5)
        );
        // ...and fields not named in the second delta persist.
        assert_eq!(printer.get_stat("extruder", "target").unwrap(), &json!(0.0));
        assert_eq!(printer.get_stat("toolhead", "homed_axes").unwrap(), &json!(""));
    }

    #[test]
    fn deltas_are_dropped_while_shutdown() {
        let mut printer = Printer::new();
        printer.change_state(PrinterState::Shutdown);

        let transition = printer.process_update(&json!({
            "extruder": { "temperature": 25.0 }
        }));

        assert_eq!(transition, None);
        assert!(printer.get_stat("extruder", "temperature").is_none());
    }

    #[test]
    fn bulk_merge_drives_state_transitions() {
        let mut printer = Printer::new();

        let transition = printer.process_update(&json!({
            "webhooks": { "state": "ready", "state_message": "Printer is ready" },
            "print_stats": { "state": "printing", "filename": "benchy.gcode" }
        }));
        assert_eq!(transition, Some(PrinterState::Printing));

        // Pause arrives as a print_stats delta.
        let transition = printer.process_update(&json!({
            "print_stats": { "state": "paused" }
        }));
        assert_eq!(transition, Some(PrinterState::Paused));

        // Completion returns to ready.
        let transition = printer.process_update(&json!({
            "print_stats": { "state": "complete" }
        }));
        assert_eq!(transition, Some(PrinterState::Ready));
    }

    #[test]
    fn webhooks_error_wins_over_print_state() {
        let mut printer = Printer::new();
        printer.process_update(&json!({
            "webhooks": { "state": "ready" },
            "print_stats": { "state": "printing" }
        }));

        let transition = printer.process_update(&json!({
            "webhooks": { "state": "error", "state_message": "MCU shutdown" }
        }));
        assert_eq!(transition, Some(PrinterState::Error));
        assert_eq!(printer.state_message(), Some("MCU shutdown"));
    }

    #[test]
    fn topology_discovery_classifies_sections() {
        let topology = Topology::discover(&config(&[
            "printer",
            "extruder",
            "extruder1",
            "extruder_stepper belted",
            "heater_bed",
            "heater_generic chamber",
            "fan",
            "heater_fan hotend_fan",
            "controller_fan electronics",
            "filament_switch_sensor runout",
            "output_pin caselight",
            "gcode_macro START_PRINT",
        ]));

        assert_eq!(sorted(topology.tools), vec!["extruder", "extruder1"]);
        assert_eq!(
            sorted(topology.heaters),
            vec!["heater_bed", "heater_generic chamber"]
        );
        assert_eq!(
            sorted(topology.fans),
            vec!["controller_fan electronics", "fan", "heater_fan hotend_fan"]
        );
        assert_eq!(topology.filament_sensors, vec!["filament_switch_sensor runout"]);
        assert_eq!(topology.output_pins, vec!["output_pin caselight"]);
    }

    #[test]
    fn reinit_replaces_cache_wholesale() {
        let mut printer = Printer::new();
        printer.change_state(PrinterState::Ready);
        printer.process_update(&json!({ "extruder": { "temperature": 200.0 } }));

        printer.reinit(host(), &config(&["extruder", "heater_bed"]));

        // Old runtime fields are gone; the config snapshot is present.
        assert!(printer.get_stat("extruder", "temperature").is_none());
        assert!(printer.get_stat("configfile", "config").is_some());
        assert_eq!(printer.topology().tools, vec!["extruder"]);
        assert_eq!(printer.host().unwrap().hostname, "voron");
    }

    #[test]
    fn power_updates_patch_the_registry() {
        let mut printer = Printer::new();
        printer.configure_power_devices(vec![
            serde_json::from_value(json!({ "device": "printer", "status": "off" })).unwrap(),
        ]);
        assert_eq!(printer.power_device_status("printer"), Some("off"));

        printer.process_power_update(&json!({ "device": "printer", "status": "on" }));
        assert_eq!(printer.power_device_status("printer"), Some("on"));

        // Malformed updates are dropped, not panicked on.
        printer.process_power_update(&json!({ "nope": true }));
        assert_eq!(printer.power_device_status("printer"), Some("on"));
    }

    #[test]
    fn temperature_history_appends_on_deltas() {
        let mut printer = Printer::new();
        printer.change_state(PrinterState::Ready);

        let mut store = std::collections::HashMap::new();
        store.insert(
            "extruder".to_owned(),
            TempStoreEntry {
                temperatures: vec![20.0, 21.0],
                targets: vec![0.0, 0.0],
                ..Default::default()
            },
        );
        printer.init_temp_store(store);

        printer.process_update(&json!({ "extruder": { "temperature": 22.5, "target": 200.0 } }));

        let history = printer.temp_history("extruder").unwrap();
        assert_eq!(history.temperatures, VecDeque::from(vec![20.0, 21.0, 22.5]));
        assert_eq!(history.targets.back(), Some(&200.0));
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn all_objects_covers_every_kind() {
        let topology = Topology::discover(&config(&[
            "extruder",
            "heater_bed",
            "fan",
            "filament_switch_sensor runout",
            "output_pin caselight",
        ]));
        let names = sorted(topology.all_objects().cloned().collect());
        assert_eq!(
            names,
            vec![
                "extruder",
                "fan",
                "filament_switch_sensor runout",
                "heater_bed",
                "output_pin caselight"
            ]
        );
    }
}
