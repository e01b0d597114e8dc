//! Downstream observer shapes: event listeners, control-channel log
//! listeners, and status listeners.

use std::sync::Arc;

use crate::controller::Controller;
use crate::events::{Runlevel, RouterEvent};

/// The controller's lifecycle state, notified to status listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerStatus {
    Init,
    Closed,
}

/// Tagged-variant event dispatch: one method accepting the event sum type.
/// Matching on [`RouterEvent`] reads more naturally in Rust than a
/// per-kind method record.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &RouterEvent);
}

/// Callback shape for control-channel diagnostics: `(runlevel, message)`.
pub type TorCtlListener = Arc<dyn Fn(Runlevel, &str) + Send + Sync>;

/// Callback shape for controller lifecycle transitions: `(controller,
/// new_status)`.
pub type StatusListener = Arc<dyn Fn(&Arc<Controller>, ControllerStatus) + Send + Sync>;
