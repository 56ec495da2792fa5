//! The main loop.
//!
//! [`App`] owns everything that is not thread-safe (the command registry,
//! the components behind it and the workspace service) and is driven by
//! the [`Message`]s background threads send it.

use crate::ipc::{CommandRegistry, Components};
use crate::message::Message;
use crate::wm::WorkspaceService;
use log::{debug, info};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

pub struct App {
    registry: CommandRegistry,
    components: Rc<RefCell<Components>>,
    workspaces: Option<WorkspaceService>,
}

impl App {
    pub fn new(components: Components, workspaces: Option<WorkspaceService>) -> Self {
        let components = Rc::new(RefCell::new(components));
        Self {
            registry: CommandRegistry::new(components.clone()),
            components,
            workspaces,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn components(&self) -> &Rc<RefCell<Components>> {
        &self.components
    }

    pub fn workspaces(&self) -> Option<&WorkspaceService> {
        self.workspaces.as_ref()
    }

    pub fn workspaces_mut(&mut self) -> Option<&mut WorkspaceService> {
        self.workspaces.as_mut()
    }

    /// Process a single message.
    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Command(request) => {
                let response = self.registry.run(&request.line);
                debug!("command {:?} -> {:?}", request.line, response);
                request.respond(response);
            }
            Message::Wm(update) => match self.workspaces.as_mut() {
                Some(service) => service.apply(update),
                None => debug!("no workspace service, dropping {:?}", update),
            },
        }
    }

    /// Handle messages until every sender is gone.
    pub fn run(&mut self, messages: mpsc::Receiver<Message>) {
        info!("aria-shell running");
        for message in messages {
            self.handle(message);
        }
        info!("all message sources closed, exiting");
    }
}
