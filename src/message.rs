//! Messages delivered to the main loop.
//!
//! Every background thread (the command server's sessions, the compositor
//! readers) talks to the rest of the daemon by sending a [`Message`] into a
//! single [`mpsc`] channel.  The main thread drains that channel, which makes
//! it the one place where shell state is mutated.

use crate::wm::WmUpdate;
use log::debug;
use std::sync::mpsc;

/// Everything the main loop reacts to.
#[derive(Debug)]
pub enum Message {
    /// A command line received on the command socket.
    Command(CommandRequest),
    /// Fresh compositor state.
    Wm(WmUpdate),
}

impl From<CommandRequest> for Message {
    fn from(request: CommandRequest) -> Self {
        Message::Command(request)
    }
}

impl From<WmUpdate> for Message {
    fn from(update: WmUpdate) -> Self {
        Message::Wm(update)
    }
}

/// One command line together with the way back to the client that sent it.
#[derive(Debug)]
pub struct CommandRequest {
    pub line: String,
    reply: mpsc::Sender<String>,
}

impl CommandRequest {
    /// Build a request and the receiver its response will arrive on.
    pub fn new(line: impl Into<String>) -> (Self, mpsc::Receiver<String>) {
        let (reply, rx) = mpsc::channel();
        (
            Self {
                line: line.into(),
                reply,
            },
            rx,
        )
    }

    /// Send the response back.  A client that already went away is not an
    /// error.
    pub fn respond(self, response: String) {
        if self.reply.send(response).is_err() {
            debug!("client gone before response to {:?}", self.line);
        }
    }
}
