//! Shell surfaces the command socket can toggle.
//!
//! The real launcher and terminal windows belong to the UI layer.  The
//! daemon only tracks whether each one is shown.

use crate::config::GeneralConfig;
use crate::ipc::Components;
use crate::traits::Toggle;
use log::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    name: &'static str,
    visible: bool,
}

impl Surface {
    /// A hidden surface.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            visible: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Toggle for Surface {
    fn toggle(&mut self) {
        self.visible = !self.visible;
        info!("{} {}", self.name, if self.visible { "shown" } else { "hidden" });
    }

    fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Create the components enabled by `general`.
pub fn build_components(general: &GeneralConfig) -> Components {
    let terminal: Option<Box<dyn Toggle>> = if general.terminal {
        Some(Box::new(Surface::new("terminal")))
    } else {
        warn!("terminal disabled in config");
        None
    };
    Components {
        launcher: Some(Box::new(Surface::new("launcher"))),
        terminal,
    }
}
