//! [`CompositorBackend`] implementation on top of [`HyprlandIpc`].
//!
//! On start the backend subscribes to the event socket, then fetches
//! monitors, workspaces and clients in that order (each fetch starts once
//! the previous one has been delivered) and asks for the focused window.
//! Afterwards every event is mapped to an [`EventAction`]: most events just
//! trigger a refetch of the collection they touch.

use super::ipc::{HyprlandIpc, IpcError, Reply};
use crate::message::Message;
use crate::traits::{BackendError, CompositorBackend};
use crate::wm::{normalize_window_id, Monitor, Window, WmUpdate, Workspace};
use log::{debug, error, warn};
use serde::Deserialize;
use std::sync::mpsc;

const NAME: &str = "hyprland";

/// Events that carry nothing the store needs; a `v2` variant or a later
/// refetch already covers them.
pub const IGNORED_EVENTS: &[&str] = &[
    "activewindow",
    "focusedmon",
    "focusedmonv2",
    "movewindow",
    "windowtitle",
    "workspace",
    "createworkspace",
    "destroyworkspace",
    "openlayer",
];

impl From<IpcError> for BackendError {
    fn from(e: IpcError) -> Self {
        BackendError::new(NAME, e)
    }
}

//  JSON replies

/// Subset of an entry of `j/monitors`.
#[derive(Deserialize)]
struct MonitorJson {
    id: i64,
    name: String,
}

/// Subset of an entry of `j/workspaces`.
#[derive(Deserialize)]
struct WorkspaceJson {
    id: i64,
    name: String,
    #[serde(rename = "monitorID")]
    monitor_id: i64,
}

#[derive(Deserialize)]
struct WorkspaceRef {
    id: i64,
}

/// Subset of an entry of `j/clients`.
#[derive(Deserialize)]
struct ClientJson {
    address: String,
    class: String,
    title: String,
    workspace: WorkspaceRef,
    monitor: i64,
}

/// `j/activewindow`; Hyprland answers `{}` when nothing is focused.
#[derive(Deserialize)]
struct ActiveWindowJson {
    #[serde(default)]
    address: Option<String>,
}

pub fn parse_monitors(value: serde_json::Value) -> Result<Vec<Monitor>, serde_json::Error> {
    let monitors: Vec<MonitorJson> = serde_json::from_value(value)?;
    Ok(monitors
        .into_iter()
        .map(|m| Monitor {
            id: m.id.to_string(),
            name: m.name,
        })
        .collect())
}

pub fn parse_workspaces(value: serde_json::Value) -> Result<Vec<Workspace>, serde_json::Error> {
    let workspaces: Vec<WorkspaceJson> = serde_json::from_value(value)?;
    Ok(workspaces
        .into_iter()
        .map(|w| Workspace {
            id: w.id.to_string(),
            name: w.name,
            monitor_id: w.monitor_id.to_string(),
        })
        .collect())
}

pub fn parse_windows(value: serde_json::Value) -> Result<Vec<Window>, serde_json::Error> {
    let clients: Vec<ClientJson> = serde_json::from_value(value)?;
    Ok(clients
        .into_iter()
        .map(|c| Window {
            id: normalize_window_id(&c.address),
            window_class: c.class,
            title: c.title,
            monitor_id: c.monitor.to_string(),
            workspace_id: c.workspace.id.to_string(),
        })
        .collect())
}

/// Serde also maps a sequence onto a struct, so non-objects are refused
/// up front.
pub fn parse_active_window(value: serde_json::Value) -> Result<Option<String>, serde_json::Error> {
    if !value.is_object() {
        return Err(serde::de::Error::custom(format!(
            "expected an object, got {}",
            value
        )));
    }
    let active: ActiveWindowJson = serde_json::from_value(value)?;
    Ok(active
        .address
        .map(|a| normalize_window_id(&a))
        .filter(|a| !a.is_empty()))
}

//  Event policy

/// A collection that can be refetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Monitors,
    Workspaces,
    Windows,
}

impl Collection {
    pub fn request(self) -> &'static str {
        match self {
            Collection::Monitors => "j/monitors",
            Collection::Workspaces => "j/workspaces",
            Collection::Windows => "j/clients",
        }
    }

    /// The collection whose foreign keys point into this one.
    pub fn cascade(self) -> Option<Collection> {
        match self {
            Collection::Monitors => Some(Collection::Workspaces),
            Collection::Workspaces => Some(Collection::Windows),
            Collection::Windows => None,
        }
    }

    fn parse(self, value: serde_json::Value) -> Result<WmUpdate, serde_json::Error> {
        Ok(match self {
            Collection::Monitors => WmUpdate::Monitors(parse_monitors(value)?),
            Collection::Workspaces => WmUpdate::Workspaces(parse_workspaces(value)?),
            Collection::Windows => WmUpdate::Windows(parse_windows(value)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Refetch the collection (and cascade to its dependents).
    Refresh(Collection),
    ActiveWindow(Option<String>),
    Ignore,
    Unknown,
}

/// Decide what to do with one `event>>data` pair.
pub fn event_action(event: &str, data: &str) -> EventAction {
    match event {
        "openwindow" | "closewindow" | "movewindowv2" => EventAction::Refresh(Collection::Windows),
        "createworkspacev2" | "destroyworkspacev2" => EventAction::Refresh(Collection::Workspaces),
        "activewindowv2" => {
            let id = normalize_window_id(data);
            if id.is_empty() || id == "," {
                EventAction::ActiveWindow(None)
            } else {
                EventAction::ActiveWindow(Some(id))
            }
        }
        _ if IGNORED_EVENTS.contains(&event) => EventAction::Ignore,
        _ => EventAction::Unknown,
    }
}

//  Fetching

/// Fetch `collection`, forward it into `sink`, then fetch its dependents.
fn refresh(ipc: &HyprlandIpc, collection: Collection, sink: &mpsc::Sender<Message>) {
    let next_ipc = ipc.clone();
    let sink = sink.clone();
    let result = ipc.request(collection.request(), move |reply| {
        let Reply::Json(value) = reply else {
            warn!("non-JSON reply to {}", collection.request());
            return;
        };
        match collection.parse(value) {
            Ok(update) => {
                if sink.send(update.into()).is_err() {
                    debug!("main loop gone, dropping {} reply", collection.request());
                    return;
                }
                if let Some(next) = collection.cascade() {
                    refresh(&next_ipc, next, &sink);
                }
            }
            Err(e) => warn!("malformed reply to {}: {}", collection.request(), e),
        }
    });
    if let Err(e) = result {
        error!("hyprland request {} failed: {}", collection.request(), e);
    }
}

fn fetch_active_window(ipc: &HyprlandIpc, sink: &mpsc::Sender<Message>) {
    let sink = sink.clone();
    let result = ipc.request("j/activewindow", move |reply| {
        let Reply::Json(value) = reply else { return };
        match parse_active_window(value) {
            Ok(id) => {
                let _ = sink.send(WmUpdate::ActiveWindow(id).into());
            }
            Err(e) => warn!("malformed reply to j/activewindow: {}", e),
        }
    });
    if let Err(e) = result {
        error!("hyprland request j/activewindow failed: {}", e);
    }
}

fn handle_event(ipc: &HyprlandIpc, event: &str, data: &str, sink: &mpsc::Sender<Message>) {
    match event_action(event, data) {
        EventAction::Refresh(collection) => refresh(ipc, collection, sink),
        EventAction::ActiveWindow(id) => {
            let _ = sink.send(WmUpdate::ActiveWindow(id).into());
        }
        EventAction::Ignore => {}
        EventAction::Unknown => debug!("unhandled hyprland event {}>>{}", event, data),
    }
}

//  Backend

pub struct HyprlandBackend {
    ipc: HyprlandIpc,
}

impl HyprlandBackend {
    /// Connect to the Hyprland instance named in the environment.
    pub fn from_env() -> Result<Self, IpcError> {
        Ok(Self::new(HyprlandIpc::from_env()?))
    }

    pub fn new(ipc: HyprlandIpc) -> Self {
        Self { ipc }
    }

    /// Send a dispatcher and log if Hyprland does not answer `ok`.
    fn dispatch(&self, args: &str) -> Result<(), BackendError> {
        let request = format!("/dispatch {}", args);
        let logged = request.clone();
        self.ipc.request(&request, move |reply| {
            if let Reply::Text(text) = reply {
                if text.trim() != "ok" {
                    warn!("{} failed: {}", logged, text.trim());
                }
            }
        })?;
        Ok(())
    }
}

impl CompositorBackend for HyprlandBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn watch_events(&mut self, sink: mpsc::Sender<Message>) -> Result<(), BackendError> {
        let ipc = self.ipc.clone();
        let event_sink = sink.clone();
        self.ipc
            .watch_events(move |event, data| handle_event(&ipc, event, data, &event_sink))?;
        refresh(&self.ipc, Collection::Monitors, &sink);
        fetch_active_window(&self.ipc, &sink);
        Ok(())
    }

    fn activate_workspace(&self, id: &str) -> Result<(), BackendError> {
        self.dispatch(&format!("workspace {}", id))
    }

    fn activate_window(&self, id: &str) -> Result<(), BackendError> {
        self.dispatch(&format!("focuswindow address:0x{}", id))
    }
}

impl Drop for HyprlandBackend {
    fn drop(&mut self) {
        self.ipc.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyprland::ipc::tests::FakeHyprland;
    use serde_json::json;
    use std::time::Duration;

    const MONITORS: &str = r#"[{"id":0,"name":"DP-1","width":2560},{"id":1,"name":"eDP-1"}]"#;
    const WORKSPACES: &str = r#"[
        {"id":1,"name":"1","monitor":"DP-1","monitorID":0,"windows":1},
        {"id":2,"name":"web","monitor":"eDP-1","monitorID":1,"windows":0}
    ]"#;
    const CLIENTS: &str = r#"[{
        "address":"0x55D0A1","mapped":true,"class":"kitty","title":"~",
        "workspace":{"id":1,"name":"1"},"monitor":0,"pid":42
    }]"#;

    fn fake() -> FakeHyprland {
        FakeHyprland::start(&[
            ("j/monitors", MONITORS),
            ("j/workspaces", WORKSPACES),
            ("j/clients", CLIENTS),
            ("j/activewindow", r#"{"address":"0x55d0a1","class":"kitty"}"#),
            ("/dispatch workspace 2", "ok"),
            ("/dispatch focuswindow address:0x55d0a1", "ok"),
        ])
    }

    fn next_update(rx: &mpsc::Receiver<Message>) -> WmUpdate {
        match rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Message::Wm(update)) => update,
            other => panic!("expected a wm update, got {:?}", other.map(|_| "command")),
        }
    }

    #[test]
    fn event_policy() {
        use Collection::*;
        assert_eq!(event_action("openwindow", "55d0,1,kitty,~"), EventAction::Refresh(Windows));
        assert_eq!(event_action("closewindow", "55d0"), EventAction::Refresh(Windows));
        assert_eq!(event_action("movewindowv2", "55d0,2,2"), EventAction::Refresh(Windows));
        assert_eq!(event_action("createworkspacev2", "3,3"), EventAction::Refresh(Workspaces));
        assert_eq!(event_action("destroyworkspacev2", "3,3"), EventAction::Refresh(Workspaces));
        assert_eq!(
            event_action("activewindowv2", "55D0A1"),
            EventAction::ActiveWindow(Some("55d0a1".into()))
        );
        assert_eq!(event_action("activewindowv2", ""), EventAction::ActiveWindow(None));
        assert_eq!(event_action("activewindowv2", ","), EventAction::ActiveWindow(None));
        assert_eq!(event_action("windowtitle", "55d0"), EventAction::Ignore);
        assert_eq!(event_action("focusedmon", "DP-1,1"), EventAction::Ignore);
        assert_eq!(event_action("fullscreen", "1"), EventAction::Unknown);
    }

    #[test]
    fn cascade_order() {
        assert_eq!(Collection::Monitors.cascade(), Some(Collection::Workspaces));
        assert_eq!(Collection::Workspaces.cascade(), Some(Collection::Windows));
        assert_eq!(Collection::Windows.cascade(), None);
    }

    #[test]
    fn json_models_map_to_store_records() {
        let monitors = parse_monitors(serde_json::from_str(MONITORS).unwrap()).unwrap();
        assert_eq!(monitors[1], Monitor { id: "1".into(), name: "eDP-1".into() });

        let workspaces = parse_workspaces(serde_json::from_str(WORKSPACES).unwrap()).unwrap();
        assert_eq!(
            workspaces[1],
            Workspace { id: "2".into(), name: "web".into(), monitor_id: "1".into() }
        );

        let windows = parse_windows(serde_json::from_str(CLIENTS).unwrap()).unwrap();
        assert_eq!(
            windows[0],
            Window {
                id: "55d0a1".into(),
                window_class: "kitty".into(),
                title: "~".into(),
                monitor_id: "0".into(),
                workspace_id: "1".into(),
            }
        );
    }

    #[test]
    fn active_window_reply() {
        assert_eq!(parse_active_window(json!({})).unwrap(), None);
        assert_eq!(
            parse_active_window(json!({"address": "0xABC"})).unwrap(),
            Some("abc".to_string())
        );
        assert!(parse_active_window(json!([])).is_err());
        assert!(parse_active_window(json!(["0xABC"])).is_err());
        assert!(parse_active_window(json!("0xABC")).is_err());
    }

    #[test]
    fn malformed_collection_is_an_error() {
        assert!(parse_monitors(json!([{"id": "zero"}])).is_err());
        assert!(parse_windows(json!({})).is_err());
    }

    #[test]
    fn start_fetches_in_cascade_order() {
        let fake = fake();
        let mut backend = HyprlandBackend::new(HyprlandIpc::open(&fake.dir()).unwrap());
        let (tx, rx) = mpsc::channel();
        backend.watch_events(tx).unwrap();

        let mut collections = Vec::new();
        let mut active = None;
        for _ in 0..4 {
            match next_update(&rx) {
                WmUpdate::Monitors(m) => collections.push(format!("monitors {}", m.len())),
                WmUpdate::Workspaces(w) => collections.push(format!("workspaces {}", w.len())),
                WmUpdate::Windows(w) => collections.push(format!("windows {}", w.len())),
                WmUpdate::ActiveWindow(id) => active = id,
            }
        }
        assert_eq!(collections, vec!["monitors 2", "workspaces 2", "windows 1"]);
        assert_eq!(active.as_deref(), Some("55d0a1"));
    }

    #[test]
    fn events_trigger_refetches() {
        let fake = fake();
        let mut backend = HyprlandBackend::new(HyprlandIpc::open(&fake.dir()).unwrap());
        let (tx, rx) = mpsc::channel();
        backend.watch_events(tx).unwrap();
        for _ in 0..4 {
            next_update(&rx);
        }

        fake.push_event("activewindowv2>>0x77");
        assert_eq!(next_update(&rx), WmUpdate::ActiveWindow(Some("77".into())));

        fake.push_event("openwindow>>77,1,foot,foot");
        assert!(matches!(next_update(&rx), WmUpdate::Windows(_)));

        fake.push_event("createworkspacev2>>2,web");
        assert!(matches!(next_update(&rx), WmUpdate::Workspaces(_)));
        assert!(matches!(next_update(&rx), WmUpdate::Windows(_)));

        fake.push_event("windowtitle>>77");
        fake.push_event("bogus line");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn activation_sends_dispatchers() {
        let fake = fake();
        let backend = HyprlandBackend::new(HyprlandIpc::open(&fake.dir()).unwrap());
        backend.activate_workspace("2").unwrap();
        backend.activate_window("55d0a1").unwrap();
        assert!(fake.wait_for_request("/dispatch workspace 2"));
        assert!(fake.wait_for_request("/dispatch focuswindow address:0x55d0a1"));
    }

    #[test]
    fn backend_error_from_ipc_error() {
        let err: BackendError = IpcError::NoSignature.into();
        assert_eq!(err.backend, "hyprland");
        assert!(err.to_string().contains("signature"));
    }
}
