//! Gcode file index -- a light mirror of the host's file listing.
//!
//! Refreshed wholesale on initialization, then patched from
//! `notify_filelist_changed` actions. Dropped on reconnect; the host is
//! the source of truth.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use moondeck_api::FileEntry;

#[derive(Debug, Default)]
pub struct FileIndex {
    files: BTreeMap<String, FileEntry>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything (on reconnect).
    pub fn reset(&mut self) {
        self.files.clear();
    }

    /// Replace the index from a fresh listing. Upsert-then-prune, so a
    /// refresh never leaves the index briefly empty.
    pub fn refresh(&mut self, listing: Vec<FileEntry>) {
        let incoming: std::collections::HashSet<String> =
            listing.iter().map(|f| f.path.clone()).collect();
        for entry in listing {
            self.files.insert(entry.path.clone(), entry);
        }
        self.files.retain(|path, _| incoming.contains(path));
    }

    /// Apply one `notify_filelist_changed` payload:
    /// `{action, item: {path, size, modified}, source_item?}`.
    pub fn process_update(&mut self, payload: &Value) {
        let Some(action) = payload.get("action").and_then(Value::as_str) else {
            return;
        };
        let item_path = payload
            .get("item")
            .and_then(|i| i.get("path"))
            .and_then(Value::as_str);

        match action {
            "create_file" | "modify_file" => {
                if let Some(entry) = payload.get("item").and_then(parse_entry) {
                    debug!(path = %entry.path, action, "file index updated");
                    self.files.insert(entry.path.clone(), entry);
                }
            }
            "delete_file" => {
                if let Some(path) = item_path {
                    debug!(path, "file removed from index");
                    self.files.remove(path);
                }
            }
            "move_file" => {
                if let Some(source) = payload
                    .get("source_item")
                    .and_then(|i| i.get("path"))
                    .and_then(Value::as_str)
                {
                    self.files.remove(source);
                }
                if let Some(entry) = payload.get("item").and_then(parse_entry) {
                    self.files.insert(entry.path.clone(), entry);
                }
            }
            // Directory operations and root changes fold into the next
            // full refresh.
            other => debug!(action = other, "unhandled filelist action"),
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn parse_entry(item: &Value) -> Option<FileEntry> {
    serde_json::from_value(item.clone()).ok()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(path: &str) -> FileEntry {
        serde_json::from_value(json!({ "path": path, "modified": 1.0, "size": 10 })).unwrap()
    }

    #[test]
    fn refresh_prunes_stale_entries() {
        let mut index = FileIndex::new();
        index.refresh(vec![entry("a.gcode"), entry("b.gcode")]);
        assert_eq!(index.len(), 2);

        index.refresh(vec![entry("b.gcode"), entry("c.gcode")]);
        assert!(index.get("a.gcode").is_none());
        assert!(index.get("c.gcode").is_some());
    }

    #[test]
    fn create_and_delete_actions_patch_the_index() {
        let mut index = FileIndex::new();

        index.process_update(&json!({
            "action": "create_file",
            "item": { "path": "benchy.gcode", "size": 1234, "modified": 2.0, "root": "gcodes" }
        }));
        assert_eq!(index.len(), 1);

        index.process_update(&json!({
            "action": "delete_file",
            "item": { "path": "benchy.gcode", "root": "gcodes" }
        }));
        assert!(index.is_empty());
    }

    #[test]
    fn move_action_renames() {
        let mut index = FileIndex::new();
        index.refresh(vec![entry("old.gcode")]);

        index.process_update(&json!({
            "action": "move_file",
            "item": { "path": "new.gcode", "size": 10, "modified": 1.0 },
            "source_item": { "path": "old.gcode" }
        }));

        assert!(index.get("old.gcode").is_none());
        assert!(index.get("new.gcode").is_some());
    }

    #[test]
    fn malformed_payloads_are_ignored() {
        let mut index = FileIndex::new();
        index.process_update(&json!({ "item": { "path": "x" } }));
        index.process_update(&json!("not an object"));
        assert!(index.is_empty());
    }
}
