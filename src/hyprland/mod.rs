//! Hyprland support.
//!
//! [`ipc`] speaks the socket protocol, [`backend`] turns it into a
//! [`CompositorBackend`](crate::traits::CompositorBackend).
//!
//! Nothing outside this module should reference Hyprland directly.

pub mod backend;
pub mod ipc;

pub use backend::HyprlandBackend;
pub use ipc::{HyprlandIpc, IpcError};
