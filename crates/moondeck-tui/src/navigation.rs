//! Panel navigation stack.
//!
//! Ordered stack of panel ids, top = visible. Instances are created
//! lazily and memoized; a pop-all drops every instance except the
//! designated persistent ones. The stack is never empty once the first
//! panel is shown -- backing out of the last panel reloads state instead
//! of popping.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use moondeck_core::NotifyMethod;

use crate::panel::{Panel, PanelId};

/// What to remove before pushing a new panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    /// Push on top of the current stack.
    #[default]
    None,
    /// Deactivate and pop only the current top first.
    PopCurrent,
    /// Deactivate and drop everything first (persistent instances are
    /// kept memoized but leave the stack).
    PopAll,
}

/// Outcome of a back navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOutcome {
    /// The top panel was popped; the new top is active.
    Popped,
    /// Only one panel remains: nothing popped, the caller should trigger
    /// a full state reload instead.
    Reload,
}

#[derive(Default)]
pub struct NavigationStack {
    /// Memoized panel instances, keyed by id.
    panels: HashMap<PanelId, Box<dyn Panel>>,
    /// Visible hierarchy; last element is the top.
    stack: Vec<PanelId>,
    /// Panels registered for delta delivery. Membership follows the
    /// stack: added on show, removed on pop.
    subscriptions: Vec<PanelId>,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> Option<PanelId> {
        self.stack.last().copied()
    }

    #[allow(dead_code)]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn contains(&self, id: PanelId) -> bool {
        self.stack.contains(&id)
    }

    /// Whether an instance exists for this id (visible or not).
    pub fn has_instance(&self, id: PanelId) -> bool {
        self.panels.contains_key(&id)
    }

    pub fn panel_mut(&mut self, id: PanelId) -> Option<&mut Box<dyn Panel>> {
        self.panels.get_mut(&id)
    }

    pub fn top_panel(&self) -> Option<&dyn Panel> {
        self.panels.get(&self.top()?).map(Box::as_ref)
    }

    pub fn top_panel_mut(&mut self) -> Option<&mut Box<dyn Panel>> {
        let top = self.top()?;
        self.panels.get_mut(&top)
    }

    /// Show a panel. The instance is built lazily on first show and
    /// reused afterwards. Showing the current top again is a no-op
    /// refresh -- a panel id appears at most once on the stack.
    pub fn show(
        &mut self,
        id: PanelId,
        replace: ReplacePolicy,
        build: impl FnOnce() -> Box<dyn Panel>,
    ) {
        match replace {
            ReplacePolicy::None => {}
            ReplacePolicy::PopCurrent => self.pop_top(),
            ReplacePolicy::PopAll => self.remove_all(),
        }

        if self.top() == Some(id) {
            if let Some(panel) = self.panels.get_mut(&id) {
                panel.refresh();
            }
            return;
        }

        // An id deeper in the stack is hoisted rather than duplicated.
        self.stack.retain(|p| *p != id);

        if !self.panels.contains_key(&id) {
            debug!(panel = %id, "instantiating panel");
            self.panels.insert(id, build());
        }

        if let Some(previous) = self.top() {
            if let Some(panel) = self.panels.get_mut(&previous) {
                panel.deactivate();
            }
        }

        self.stack.push(id);
        let panel = self
            .panels
            .get_mut(&id)
            .expect("panel instance just inserted");
        if panel.wants_updates() && !self.subscriptions.contains(&id) {
            self.subscriptions.push(id);
        }
        panel.activate();
        debug!(hierarchy = %self.hierarchy(), "panel shown");
    }

    /// Pop the top panel and reactivate the one below. With a single
    /// panel left this is a no-op requesting a reload instead.
    pub fn go_back(&mut self) -> BackOutcome {
        if self.stack.len() <= 1 {
            return BackOutcome::Reload;
        }
        self.pop_top();
        if let Some(&top) = self.stack.last() {
            if let Some(panel) = self.panels.get_mut(&top) {
                panel.activate();
                if panel.wants_updates() && !self.subscriptions.contains(&top) {
                    self.subscriptions.push(top);
                }
            }
        }
        debug!(hierarchy = %self.hierarchy(), "went back");
        BackOutcome::Popped
    }

    /// Pop until exactly one panel remains.
    pub fn go_home(&mut self) {
        while self.stack.len() > 1 {
            self.go_back();
        }
    }

    /// Deliver a forwarded notification to the top panel, if subscribed.
    pub fn deliver_update(&mut self, method: &NotifyMethod, payload: &Value) {
        let Some(top) = self.top() else { return };
        if !self.subscriptions.contains(&top) {
            return;
        }
        if let Some(panel) = self.panels.get_mut(&top) {
            panel.process_update(method, payload);
        }
    }

    /// In-place refresh of a panel wherever it sits on the stack.
    pub fn refresh_panel(&mut self, id: PanelId) {
        if let Some(panel) = self.panels.get_mut(&id) {
            panel.refresh();
        }
    }

    fn hierarchy(&self) -> String {
        self.stack
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// Deactivate and pop the current top; the instance stays memoized.
    fn pop_top(&mut self) {
        let Some(top) = self.stack.pop() else { return };
        self.subscriptions.retain(|p| *p != top);
        if let Some(panel) = self.panels.get_mut(&top) {
            panel.deactivate();
        }
    }

    /// Deactivate everything, clear the stack, and drop non-persistent
    /// instances.
    fn remove_all(&mut self) {
        for id in std::mem::take(&mut self.stack) {
            if let Some(panel) = self.panels.get_mut(&id) {
                panel.deactivate();
            }
        }
        self.subscriptions.clear();
        self.panels.retain(|id, _| id.persistent());
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use ratatui::{Frame, layout::Rect};

    use super::*;

    /// Stub panel recording lifecycle calls.
    struct StubPanel {
        id: PanelId,
        updates: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl StubPanel {
        fn boxed(id: PanelId, updates: bool, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Panel> {
            Box::new(Self {
                id,
                updates,
                log: Arc::clone(log),
            })
        }

        fn record(&self, what: &str) {
            self.log.lock().unwrap().push(format!("{}:{what}", self.id));
        }
    }

    impl Panel for StubPanel {
        fn id(&self) -> PanelId {
            self.id
        }
        fn activate(&mut self) {
            self.record("activate");
        }
        fn deactivate(&mut self) {
            self.record("deactivate");
        }
        fn wants_updates(&self) -> bool {
            self.updates
        }
        fn process_update(&mut self, method: &NotifyMethod, _payload: &Value) {
            self.record(&format!("update:{}", method.as_str()));
        }
        fn refresh(&mut self) {
            self.record("refresh");
        }
        fn render(&self, _frame: &mut Frame, _area: Rect) {}
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn drain(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn show_activates_and_deactivates_on_top_changes() {
        let log = log();
        let mut nav = NavigationStack::new();

        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });
        nav.show(PanelId::JobStatus, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::JobStatus, true, &log)
        });

        assert_eq!(
            drain(&log),
            vec![
                "Main Menu:activate",
                "Main Menu:deactivate",
                "Printing:activate"
            ]
        );
        assert_eq!(nav.top(), Some(PanelId::JobStatus));
        assert_eq!(nav.depth(), 2);
    }

    #[test]
    fn showing_the_current_top_again_is_idempotent() {
        let log = log();
        let mut nav = NavigationStack::new();

        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });
        drain(&log);

        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });

        // No duplicate push, no second activation -- just a refresh.
        assert_eq!(nav.depth(), 1);
        assert_eq!(drain(&log), vec!["Main Menu:refresh"]);
    }

    #[test]
    fn go_back_pops_and_reactivates() {
        let log = log();
        let mut nav = NavigationStack::new();
        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });
        nav.show(PanelId::JobStatus, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::JobStatus, true, &log)
        });
        drain(&log);

        assert_eq!(nav.go_back(), BackOutcome::Popped);
        assert_eq!(nav.top(), Some(PanelId::MainMenu));
        assert_eq!(
            drain(&log),
            vec!["Printing:deactivate", "Main Menu:activate"]
        );
    }

    #[test]
    fn go_back_on_the_last_panel_requests_a_reload() {
        let log = log();
        let mut nav = NavigationStack::new();
        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });
        drain(&log);

        assert_eq!(nav.go_back(), BackOutcome::Reload);
        // Stack unchanged, nothing deactivated.
        assert_eq!(nav.depth(), 1);
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn go_home_pops_to_a_single_panel() {
        let log = log();
        let mut nav = NavigationStack::new();
        for id in [PanelId::MainMenu, PanelId::JobStatus, PanelId::Splash] {
            nav.show(id, ReplacePolicy::None, || StubPanel::boxed(id, false, &log));
        }

        nav.go_home();
        assert_eq!(nav.depth(), 1);
        assert_eq!(nav.top(), Some(PanelId::MainMenu));
    }

    #[test]
    fn pop_all_drops_instances_except_persistent_ones() {
        let log = log();
        let mut nav = NavigationStack::new();
        nav.show(PanelId::Splash, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::Splash, false, &log)
        });
        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });

        nav.show(PanelId::JobStatus, ReplacePolicy::PopAll, || {
            StubPanel::boxed(PanelId::JobStatus, true, &log)
        });

        assert_eq!(nav.depth(), 1);
        assert_eq!(nav.top(), Some(PanelId::JobStatus));
        // Splash is persistent: instance kept though off-stack.
        assert!(nav.has_instance(PanelId::Splash));
        assert!(!nav.has_instance(PanelId::MainMenu));
        assert!(!nav.contains(PanelId::Splash));
    }

    #[test]
    fn updates_reach_only_the_subscribed_top(){
        let log = log();
        let mut nav = NavigationStack::new();
        nav.show(PanelId::JobStatus, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::JobStatus, true, &log)
        });
        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });
        drain(&log);

        // MainMenu is top and unsubscribed: nothing delivered.
        nav.deliver_update(&NotifyMethod::StatusUpdate, &serde_json::json!([{}]));
        assert!(drain(&log).is_empty());

        // Back to JobStatus: it resubscribes and receives deltas.
        nav.go_back();
        drain(&log);
        nav.deliver_update(&NotifyMethod::StatusUpdate, &serde_json::json!([{}]));
        assert_eq!(drain(&log), vec!["Printing:update:notify_status_update"]);
    }

    #[test]
    fn pop_current_replaces_the_top() {
        let log = log();
        let mut nav = NavigationStack::new();
        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });
        nav.show(PanelId::JobStatus, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::JobStatus, true, &log)
        });

        nav.show(PanelId::Splash, ReplacePolicy::PopCurrent, || {
            StubPanel::boxed(PanelId::Splash, false, &log)
        });

        assert_eq!(nav.depth(), 2);
        assert_eq!(nav.top(), Some(PanelId::Splash));
        assert!(!nav.contains(PanelId::JobStatus));
        // PopCurrent keeps the instance memoized for a later show.
        assert!(nav.has_instance(PanelId::JobStatus));
    }

    #[test]
    fn reshowing_a_stacked_panel_hoists_it() {
        let log = log();
        let mut nav = NavigationStack::new();
        for id in [PanelId::MainMenu, PanelId::JobStatus, PanelId::Splash] {
            nav.show(id, ReplacePolicy::None, || StubPanel::boxed(id, false, &log));
        }

        nav.show(PanelId::MainMenu, ReplacePolicy::None, || {
            StubPanel::boxed(PanelId::MainMenu, false, &log)
        });

        // At most one occurrence on the stack.
        assert_eq!(nav.depth(), 3);
        assert_eq!(nav.top(), Some(PanelId::MainMenu));
        assert_eq!(
            nav.stack.iter().filter(|p| **p == PanelId::MainMenu).count(),
            1
        );
    }
}
