//! The process-wide mirror of compositor state.
//!
//! [`WorldState`] has exactly one writer, the main loop, which applies
//! [`WmUpdate`]s in the order they come out of the message channel.
//! Refreshes of different collections are triggered independently and may
//! complete in any order, so foreign keys (`workspace_id`, `monitor_id`) and
//! the two active pointers can temporarily point at ids that are not in the
//! current snapshot.  Every lookup therefore returns an `Option`.

use super::{Monitor, Window, WmEvent, WmUpdate, Workspace};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct WorldState {
    monitors: HashMap<String, Monitor>,
    workspaces: HashMap<String, Workspace>,
    windows: HashMap<String, Window>,
    active_window: Option<String>,
    active_workspace: Option<String>,
}

/// Collect `items` into a map keyed by id; later duplicates overwrite.
fn index_by<T>(items: impl IntoIterator<Item = T>, id: impl Fn(&T) -> &str) -> HashMap<String, T> {
    let mut map = HashMap::new();
    for item in items {
        map.insert(id(&item).to_string(), item);
    }
    map
}

/// Order ids numerically when both are integers (Hyprland workspaces go
/// `1, 2, 10`), integers before anything else, the rest lexically.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Sort a query result by id so callers get a stable order.
fn sorted_by_id<'a, T>(mut items: Vec<&'a T>, id: impl Fn(&T) -> &str) -> Vec<&'a T> {
    items.sort_by(|a, b| compare_ids(id(a), id(b)));
    items
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    //  Snapshot views

    pub fn monitors(&self) -> &HashMap<String, Monitor> {
        &self.monitors
    }

    pub fn workspaces(&self) -> &HashMap<String, Workspace> {
        &self.workspaces
    }

    pub fn windows(&self) -> &HashMap<String, Window> {
        &self.windows
    }

    //  Lookups

    pub fn monitor(&self, id: &str) -> Option<&Monitor> {
        self.monitors.get(id)
    }

    pub fn workspace(&self, id: &str) -> Option<&Workspace> {
        self.workspaces.get(id)
    }

    pub fn window(&self, id: &str) -> Option<&Window> {
        self.windows.get(id)
    }

    /// Find a monitor by connector name.
    pub fn monitor_by_name(&self, name: &str) -> Option<&Monitor> {
        self.monitors.values().find(|m| m.name == name)
    }

    /// The workspace a window lives on, if both are known.
    pub fn window_workspace(&self, window_id: &str) -> Option<&Workspace> {
        self.window(window_id)
            .and_then(|w| self.workspace(&w.workspace_id))
    }

    pub fn monitor_workspaces(&self, monitor_id: &str) -> Vec<&Workspace> {
        let found = self
            .workspaces
            .values()
            .filter(|ws| ws.monitor_id == monitor_id)
            .collect();
        sorted_by_id(found, |ws| ws.id.as_str())
    }

    pub fn workspace_windows(&self, workspace_id: &str) -> Vec<&Window> {
        let found = self
            .windows
            .values()
            .filter(|w| w.workspace_id == workspace_id)
            .collect();
        sorted_by_id(found, |w| w.id.as_str())
    }

    pub fn monitor_windows(&self, monitor_id: &str) -> Vec<&Window> {
        let found = self
            .windows
            .values()
            .filter(|w| w.monitor_id == monitor_id)
            .collect();
        sorted_by_id(found, |w| w.id.as_str())
    }

    //  Active pointers

    pub fn active_window_id(&self) -> Option<&str> {
        self.active_window.as_deref()
    }

    pub fn active_workspace_id(&self) -> Option<&str> {
        self.active_workspace.as_deref()
    }

    /// The active window, if the pointer resolves in the current snapshot.
    pub fn active_window(&self) -> Option<&Window> {
        self.active_window.as_deref().and_then(|id| self.window(id))
    }

    pub fn active_workspace(&self) -> Option<&Workspace> {
        self.active_workspace
            .as_deref()
            .and_then(|id| self.workspace(id))
    }

    //  Mutation

    pub fn replace_monitors(&mut self, monitors: impl IntoIterator<Item = Monitor>) {
        self.monitors = index_by(monitors, |m| m.id.as_str());
    }

    pub fn replace_workspaces(&mut self, workspaces: impl IntoIterator<Item = Workspace>) {
        self.workspaces = index_by(workspaces, |ws| ws.id.as_str());
    }

    pub fn replace_windows(&mut self, windows: impl IntoIterator<Item = Window>) {
        self.windows = index_by(windows, |w| w.id.as_str());
    }

    /// Point the active window at `window`.
    ///
    /// If the window is already known, the active workspace follows it.
    /// The collections are never touched.
    pub fn set_active_window(&mut self, window: Option<String>) -> WmEvent {
        let workspace = window
            .as_deref()
            .and_then(|id| self.window(id))
            .map(|w| w.workspace_id.clone())
            .filter(|ws| !ws.is_empty());
        if let Some(ws) = &workspace {
            self.active_workspace = Some(ws.clone());
        }
        self.active_window = window.clone();
        WmEvent::ActiveWindow { window, workspace }
    }

    /// Apply one update and describe it for subscribers.
    pub fn apply(&mut self, update: WmUpdate) -> WmEvent {
        match update {
            WmUpdate::Monitors(monitors) => self.replace_monitors(monitors),
            WmUpdate::Workspaces(workspaces) => self.replace_workspaces(workspaces),
            WmUpdate::Windows(windows) => self.replace_windows(windows),
            WmUpdate::ActiveWindow(window) => return self.set_active_window(window),
        }
        WmEvent::Changed
    }
}
