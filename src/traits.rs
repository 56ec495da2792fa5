//! Core traits that decouple the daemon from any specific compositor,
//! transport, or UI toolkit.
//!
//! Every concrete backend (Hyprland, the command socket, a test harness)
//! implements one of these traits.  The [`App`](crate::app::App) only
//! depends on these abstractions.

use crate::message::Message;
use std::fmt;
use std::sync::mpsc;

//  Compositor backend

/// Error from a compositor backend.
///
/// Backends are used as trait objects, so their specific errors are
/// flattened into a message tagged with the backend name.
#[derive(Debug, thiserror::Error)]
#[error("{backend}: {message}")]
pub struct BackendError {
    pub backend: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(backend: &'static str, message: impl fmt::Display) -> Self {
        Self {
            backend,
            message: message.to_string(),
        }
    }
}

/// Abstraction over a compositor that can report its state and activate
/// workspaces and windows.
///
/// An implementation might talk to Hyprland via IPC, or it might be a
/// recording stub used in tests.
pub trait CompositorBackend {
    /// Human readable backend name (`"hyprland"`).
    fn name(&self) -> &'static str;

    /// Subscribe to compositor events and fetch the initial state.
    ///
    /// Must not block: results are delivered later, as
    /// [`Message::Wm`] values sent into `sink`.
    fn watch_events(&mut self, sink: mpsc::Sender<Message>) -> Result<(), BackendError>;

    /// Ask the compositor to switch to workspace `id`.
    ///
    /// Fire-and-forget: the outcome shows up through later events, if at
    /// all.  An `Err` only means the request could not be sent.
    fn activate_workspace(&self, id: &str) -> Result<(), BackendError>;

    /// Ask the compositor to focus window `id`.  Same contract as
    /// [`activate_workspace`](CompositorBackend::activate_workspace).
    fn activate_window(&self, id: &str) -> Result<(), BackendError>;
}

//  Message source

/// A source of [`Message`]s.
///
/// Implementations listen on some transport (a Unix socket, an in-memory
/// channel) and forward what they receive into the provided
/// [`mpsc::Sender`].
///
/// # Contract
///
/// * [`run`](MessageSource::run) **blocks** until the source is exhausted,
///   shut down, or an unrecoverable error occurs.
/// * Implementations must be [`Send`] so they can run on a dedicated thread.
pub trait MessageSource: Send {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    /// Start listening and forward every incoming [`Message`] into `sink`.
    fn run(&mut self, sink: mpsc::Sender<Message>) -> Result<(), Self::Error>;
}

//  Shell components

/// A shell surface whose visibility can be flipped from the command socket.
pub trait Toggle {
    /// Show the component if hidden, hide it if shown.
    fn toggle(&mut self);

    fn is_visible(&self) -> bool;
}
