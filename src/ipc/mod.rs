//! Command socket that external tools (the `aria-msg` CLI, key-bind
//! daemons, scripts) use to drive the shell.
//!
//! [`server`] owns the socket and the per-connection sessions, [`registry`]
//! turns a command line into a response and [`client`] is the other end of
//! the wire.

pub mod client;
pub mod registry;
pub mod server;

pub use client::{send_command, ClientError};
pub use registry::{CommandError, CommandRegistry, Components};
pub use server::{CommandServer, ServerHandle};
