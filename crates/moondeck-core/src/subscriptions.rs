//! Subscription registry: computes the full (object, fields) set the
//! session subscribes to, from a fixed base set plus the discovered
//! topology. Recomputed once per successful initialization and installed
//! via a single subscribe request per reconnect -- never incremental.

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::printer::Topology;

/// Fixed subsystem objects requested in the bulk status fetch.
pub const BASE_STATUS_OBJECTS: &[&str] = &[
    "bed_mesh",
    "configfile",
    "display_status",
    "extruder",
    "fan",
    "gcode_move",
    "heater_bed",
    "idle_timeout",
    "pause_resume",
    "print_stats",
    "toolhead",
    "virtual_sdcard",
    "webhooks",
    "motion_report",
    "firmware_retraction",
    "exclude_object",
];

/// Fixed subsystem objects subscribed with explicit field lists. Heaters
/// (including `heater_bed`) and tools are covered by the topology below.
const BASE_SUBSCRIPTIONS: &[(&str, &[&str])] = &[
    ("bed_mesh", &["profile_name", "mesh_max", "mesh_min", "probed_matrix", "profiles"]),
    ("configfile", &["config"]),
    ("display_status", &["progress", "message"]),
    ("fan", &["speed"]),
    ("gcode_move", &["extrude_factor", "gcode_position", "homing_origin", "speed_factor", "speed"]),
    ("idle_timeout", &["state"]),
    ("pause_resume", &["is_paused"]),
    (
        "print_stats",
        &["print_duration", "total_duration", "filament_used", "filename", "state", "message", "info"],
    ),
    (
        "toolhead",
        &[
            "homed_axes",
            "estimated_print_time",
            "print_time",
            "position",
            "extruder",
            "max_accel",
            "max_velocity",
            "square_corner_velocity",
        ],
    ),
    ("virtual_sdcard", &["file_position", "is_active", "progress"]),
    ("webhooks", &["state", "state_message"]),
    (
        "firmware_retraction",
        &["retract_length", "retract_speed", "unretract_extra_length", "unretract_speed"],
    ),
    ("motion_report", &["live_position", "live_velocity", "live_extruder_velocity"]),
    ("exclude_object", &["current_object", "objects", "excluded_objects"]),
];

// Field lists per dynamic object kind.
const TOOL_FIELDS: &[&str] = &["target", "temperature", "pressure_advance", "smooth_time", "power"];
const HEATER_FIELDS: &[&str] = &["target", "temperature", "power"];
const FAN_FIELDS: &[&str] = &["speed"];
const FILAMENT_SENSOR_FIELDS: &[&str] = &["enabled", "filament_detected"];
const OUTPUT_PIN_FIELDS: &[&str] = &["value"];

/// The full requested-fields mapping: base set unioned with one entry per
/// discovered dynamic object. Insertion-ordered for stable wire output.
pub fn requested_objects(topology: &Topology) -> IndexMap<String, Vec<&'static str>> {
    let mut objects: IndexMap<String, Vec<&'static str>> = BASE_SUBSCRIPTIONS
        .iter()
        .map(|(name, fields)| ((*name).to_owned(), fields.to_vec()))
        .collect();

    for tool in &topology.tools {
        objects.insert(tool.clone(), TOOL_FIELDS.to_vec());
    }
    for heater in &topology.heaters {
        objects.insert(heater.clone(), HEATER_FIELDS.to_vec());
    }
    for fan in &topology.fans {
        objects.insert(fan.clone(), FAN_FIELDS.to_vec());
    }
    for sensor in &topology.filament_sensors {
        objects.insert(sensor.clone(), FILAMENT_SENSOR_FIELDS.to_vec());
    }
    for pin in &topology.output_pins {
        objects.insert(pin.clone(), OUTPUT_PIN_FIELDS.to_vec());
    }

    objects
}

/// Params for the single `printer.objects.subscribe` invocation.
pub fn subscribe_params(topology: &Topology) -> Value {
    let objects: serde_json::Map<String, Value> = requested_objects(topology)
        .into_iter()
        .map(|(name, fields)| (name, json!(fields)))
        .collect();
    json!({ "objects": objects })
}

/// Object list for the bulk status fetch: the fixed base set plus every
/// discovered dynamic object, all fields each, deduplicated.
pub fn bulk_query_objects(topology: &Topology) -> Vec<String> {
    let mut objects: Vec<String> = BASE_STATUS_OBJECTS.iter().map(|s| (*s).to_owned()).collect();
    for name in topology.all_objects() {
        if !objects.contains(name) {
            objects.push(name.clone());
        }
    }
    objects
}

// ── Tests ────────────────────────────────────────────────────────────
