//! Choosing a compositor backend at startup.
//!
//! Backends refuse to construct when their compositor is not running, so
//! selection is simply "try each candidate in order, keep the first one
//! that succeeds".

use crate::hyprland::HyprlandBackend;
use crate::traits::{BackendError, CompositorBackend};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Backends known to the daemon, as named in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Hyprland,
}

impl BackendKind {
    /// Construct the backend from the current environment.
    pub fn connect(self) -> Result<Box<dyn CompositorBackend>, BackendError> {
        match self {
            BackendKind::Hyprland => Ok(Box::new(HyprlandBackend::from_env()?)),
        }
    }
}

/// Return the first candidate that constructs successfully.
///
/// Failures are expected (the compositor is simply not running) and only
/// logged at debug level.
pub fn select_backend<I, F>(candidates: I) -> Option<Box<dyn CompositorBackend>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Result<Box<dyn CompositorBackend>, BackendError>,
{
    for candidate in candidates {
        match candidate() {
            Ok(backend) => {
                info!("using {} backend", backend.name());
                return Some(backend);
            }
            Err(e) => debug!("backend unavailable: {}", e),
        }
    }
    warn!("no supported compositor found, workspace features disabled");
    None
}
