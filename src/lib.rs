//! **aria-shell** core: the command and control plane of a Wayland desktop
//! shell.
//!
//! The daemon mirrors the compositor's monitors, workspaces and windows and
//! exposes a line-oriented command socket so scripts and key bindings can
//! drive the shell's components.
//!
//! # Architecture
//!
//! Every blocking read happens on a background thread.  Results travel as
//! [`message::Message`]s through one channel to the main thread, where
//! [`app::App`] runs commands and applies state updates one at a time.
//!
//! * [`socket`]: threaded line/chunk reader over Unix stream sockets.
//! * [`ipc`]: the command server, its registry and the client side.
//! * [`hyprland`]: Hyprland IPC client and compositor backend.
//! * [`wm`]: world-state store and workspace service.
//!
//! The core traits in [`traits`] keep the main loop independent of any
//! specific compositor or transport.

pub mod app;
pub mod components;
pub mod config;
pub mod hyprland;
pub mod ipc;
pub mod message;
pub mod signal;
pub mod socket;
pub mod traits;
pub mod wm;
