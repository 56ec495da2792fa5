//! Window-manager state mirrored from the compositor.
//!
//! The compositor is the source of truth for monitors, workspaces and
//! windows.  Backends in [`crate::hyprland`] translate its IPC traffic into
//! [`WmUpdate`]s, the main loop applies them to the [`WorldState`] owned by
//! the [`WorkspaceService`], and the service tells subscribers what changed
//! through [`WmEvent`]s.
//!
//! Ids are strings.  They are opaque, compositor-assigned, and only used as
//! map keys and foreign keys between the three collections.

pub mod backend;
pub mod service;
pub mod store;

pub use service::WorkspaceService;
pub use store::WorldState;

use serde::Serialize;
use std::fmt;

/// A physical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Monitor {
    pub id: String,
    /// Connector name (`DP-1`, `eDP-1`, ...), used to match the outputs the
    /// UI layer enumerates.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub monitor_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Window {
    /// Compositor address, see [`normalize_window_id`].
    pub id: String,
    pub window_class: String,
    pub title: String,
    pub monitor_id: String,
    pub workspace_id: String,
}

/// Canonical form of a window address: lowercase hex without `0x`.
pub fn normalize_window_id(raw: &str) -> String {
    let raw = raw.trim();
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    hex.to_ascii_lowercase()
}

/// A change to apply to the [`WorldState`].
///
/// Collection updates replace the whole collection; the active-window
/// update only patches the pointers.
#[derive(Debug, Clone, PartialEq)]
pub enum WmUpdate {
    Monitors(Vec<Monitor>),
    Workspaces(Vec<Workspace>),
    Windows(Vec<Window>),
    /// `None` when the compositor reports that nothing is focused.
    ActiveWindow(Option<String>),
}

/// Notification emitted after an update has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WmEvent {
    /// One of the collections was replaced.
    Changed,
    /// The active-window pointer was patched.  `workspace` is set when the
    /// active-workspace pointer moved along with it.
    ActiveWindow {
        window: Option<String>,
        workspace: Option<String>,
    },
}

impl WmEvent {
    /// Name of the signal this event is emitted on.
    pub fn signal(&self) -> &'static str {
        match self {
            WmEvent::Changed => service::SIGNAL_CHANGED,
            WmEvent::ActiveWindow { .. } => service::SIGNAL_ACTIVE_WINDOW,
        }
    }
}

impl fmt::Display for WmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WmEvent::Changed => write!(f, "changed"),
            WmEvent::ActiveWindow { window, .. } => {
                write!(f, "activewin {}", window.as_deref().unwrap_or(""))
            }
        }
    }
}
