//! Public façade over the compositor mirror.
//!
//! [`WorkspaceService`] owns the [`CompositorBackend`] and the
//! [`WorldState`].  The main loop feeds it [`WmUpdate`]s; widgets read the
//! state and subscribe to notifications:
//!
//! | Signal      | Emitted when                                   |
//! |-------------|------------------------------------------------|
//! | `changed`   | a monitor, workspace or window list was replaced |
//! | `activewin` | the active-window pointer was patched          |
//! | `event`     | after either of the above                      |

use super::{Monitor, Window, WmEvent, WmUpdate, Workspace, WorldState};
use crate::message::Message;
use crate::signal::Signals;
use crate::traits::{BackendError, CompositorBackend};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::mpsc;

pub const SIGNAL_CHANGED: &str = "changed";
pub const SIGNAL_ACTIVE_WINDOW: &str = "activewin";
pub const SIGNAL_EVENT: &str = "event";

pub struct WorkspaceService {
    backend: Box<dyn CompositorBackend>,
    state: WorldState,
    signals: Signals<WmEvent, WorldState>,
}

impl WorkspaceService {
    pub fn new(backend: Box<dyn CompositorBackend>) -> Self {
        Self {
            backend,
            state: WorldState::new(),
            signals: Signals::new(),
        }
    }

    /// Start the backend's event subscription and initial fetch.
    pub fn start(&mut self, sink: mpsc::Sender<Message>) -> Result<(), BackendError> {
        self.backend.watch_events(sink)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn monitors(&self) -> &HashMap<String, Monitor> {
        self.state.monitors()
    }

    pub fn workspaces(&self) -> &HashMap<String, Workspace> {
        self.state.workspaces()
    }

    pub fn windows(&self) -> &HashMap<String, Window> {
        self.state.windows()
    }

    pub fn activate_workspace(&self, id: &str) {
        debug!("activate workspace {}", id);
        if let Err(e) = self.backend.activate_workspace(id) {
            warn!("cannot activate workspace {}: {}", id, e);
        }
    }

    pub fn activate_window(&self, id: &str) {
        debug!("activate window {}", id);
        if let Err(e) = self.backend.activate_window(id) {
            warn!("cannot activate window {}: {}", id, e);
        }
    }

    /// Subscribe to every notification (`changed` and `activewin`).
    pub fn watch_events<F>(&mut self, callback: F)
    where
        F: FnMut(&WmEvent, &WorldState) + 'static,
    {
        self.signals.connect(SIGNAL_EVENT, callback);
    }

    /// Subscribe to a single signal, see the module docs for names.
    pub fn connect<F>(&mut self, signal: &str, callback: F)
    where
        F: FnMut(&WmEvent, &WorldState) + 'static,
    {
        self.signals.connect(signal, callback);
    }

    /// Apply an update from the backend and notify subscribers.
    pub fn apply(&mut self, update: WmUpdate) {
        let event = self.state.apply(update);
        debug!("wm event: {}", event);
        self.signals.emit(event.signal(), &event, &self.state);
        self.signals.emit(SIGNAL_EVENT, &event, &self.state);
    }
}
