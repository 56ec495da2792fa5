//! Low-level client for Hyprland's two IPC sockets.
//!
//! Hyprland keeps its sockets in
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/` (Hyprland < 0.40
//! used `/tmp/hypr/$HYPRLAND_INSTANCE_SIGNATURE/`):
//!
//! | Socket          | Role                                             |
//! |-----------------|--------------------------------------------------|
//! | `.socket.sock`  | request/response, one request per connection     |
//! | `.socket2.sock` | event stream, one `EVENT>>DATA\n` line per event |
//!
//! Requests prefixed with `j/` are answered with JSON, everything else with
//! plain text.

use crate::config::runtime_dir;
use crate::socket::{is_socket, LineSocket, ReadLoop, ReadMode, SocketError};
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Environment variable holding the running instance's signature.
pub const SIGNATURE_ENV: &str = "HYPRLAND_INSTANCE_SIGNATURE";

/// Where Hyprland kept its runtime directories before 0.40.
pub const LEGACY_ROOT: &str = "/tmp/hypr";

const COMMAND_SOCKET: &str = ".socket.sock";
const EVENT_SOCKET: &str = ".socket2.sock";

/// Errors that can occur when talking to Hyprland.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("no hyprland signature found in environment")]
    NoSignature,
    #[error("cannot find hyprland runtime directory for instance {0}")]
    NoRuntimeDir(String),
    #[error("cannot find hyprland socket {}", .0.display())]
    MissingSocket(PathBuf),
    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// Decoded answer from the command socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(serde_json::Value),
    Text(String),
}

/// Split an event line of the form `EVENT>>DATA` at the first separator.
pub fn parse_event_line(line: &str) -> Option<(&str, &str)> {
    let sep = line.find(">>")?;
    Some((&line[..sep], &line[sep + 2..]))
}

/// Decode a raw reply according to the request that produced it.
///
/// Returns `None` (after logging) when a JSON request got something that is
/// not JSON.
pub fn decode_reply(request: &str, raw: &[u8]) -> Option<Reply> {
    if request.starts_with("j/") {
        match serde_json::from_slice(raw) {
            Ok(value) => Some(Reply::Json(value)),
            Err(e) => {
                warn!("unparsable JSON reply to {:?}: {}", request, e);
                None
            }
        }
    } else {
        Some(Reply::Text(String::from_utf8_lossy(raw).into_owned()))
    }
}

/// The two Hyprland sockets.
///
/// Cloning is cheap; clones share cancellation.
#[derive(Debug, Clone)]
pub struct HyprlandIpc {
    command: LineSocket,
    events: LineSocket,
}

impl HyprlandIpc {
    /// Locate the running instance from the environment.
    pub fn from_env() -> Result<Self, IpcError> {
        let signature = std::env::var(SIGNATURE_ENV).ok();
        let roots = [runtime_dir().join("hypr"), PathBuf::from(LEGACY_ROOT)];
        Self::locate(signature, &roots)
    }

    /// Open the instance `signature` under the first of `roots` that has it.
    pub fn locate(signature: Option<String>, roots: &[PathBuf]) -> Result<Self, IpcError> {
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(IpcError::NoSignature)?;
        let dir = roots
            .iter()
            .map(|root| root.join(&signature))
            .find(|dir| dir.is_dir())
            .ok_or_else(|| IpcError::NoRuntimeDir(signature.clone()))?;
        Self::open(&dir)
    }

    /// Open both sockets in the instance directory `dir`.
    pub fn open(dir: &Path) -> Result<Self, IpcError> {
        let socket = |name: &str| -> Result<LineSocket, IpcError> {
            let path = dir.join(name);
            if !is_socket(&path) {
                return Err(IpcError::MissingSocket(path));
            }
            Ok(LineSocket::new(path)?)
        };
        let command = socket(COMMAND_SOCKET)?;
        let events = socket(EVENT_SOCKET)?;
        debug!("hyprland sockets found in {}", dir.display());
        Ok(Self { command, events })
    }

    /// Send `request` and call `on_reply` once with the decoded answer.
    ///
    /// An empty or undecodable answer is dropped without calling
    /// `on_reply`.
    pub fn request<F>(&self, request: &str, on_reply: F) -> Result<ReadLoop, IpcError>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        debug!("hyprland command: {}", request);
        let request_owned = request.to_string();
        let mut on_reply = Some(on_reply);
        let reader = self
            .command
            .send_and_recv(request, ReadMode::ToEnd, move |raw| {
                let Some(callback) = on_reply.take() else {
                    return;
                };
                if let Some(reply) = decode_reply(&request_owned, &raw) {
                    callback(reply);
                }
            })?;
        Ok(reader)
    }

    /// Send `request` without reading the answer.
    pub fn send(&self, request: &str) -> Result<(), IpcError> {
        debug!("hyprland command: {}", request);
        Ok(self.command.send(request)?)
    }

    /// Call `on_event(event, data)` for every event Hyprland emits.
    ///
    /// Lines without the `>>` separator are logged and skipped.
    pub fn watch_events<F>(&self, mut on_event: F) -> Result<ReadLoop, IpcError>
    where
        F: FnMut(&str, &str) + Send + 'static,
    {
        let reader = self.events.watch(move |raw| {
            let line = String::from_utf8_lossy(&raw);
            match parse_event_line(&line) {
                Some((event, data)) => on_event(event, data),
                None => warn!("invalid event from hyprland: {:?}", line),
            }
        })?;
        Ok(reader)
    }

    /// Stop every pending read on both sockets.
    pub fn cancel(&self) {
        self.command.cancel_token().cancel();
        self.events.cancel_token().cancel();
    }
}
