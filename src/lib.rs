//! Monitoring core for an anonymizing-router control-port session: a
//! resilient [`controller::Controller`] session manager, an event cache, a
//! filterable [`log_panel::LogPanel`] ring buffer, a runlevel-flag expander,
//! and best-effort log pre-population. This crate does not implement the
//! control-port wire protocol itself (see [`controller::ControlConnection`]
//! for the boundary it consumes) or any rendering surface.

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod log_panel;
pub mod process;
pub mod runlevel;

pub use cache::{Cache, CacheKey, CachedValue, Lookup};
pub use config::Config;
pub use controller::{Controller, ControlConnection, ControllerStatus, EventListener};
pub use error::{ConnectionError, ControllerError, InvalidFlags};
pub use events::{Runlevel, RouterEvent};
pub use log_panel::{prepopulate, ColourHint, LogPanel};
pub use runlevel::{expand_events, parse_runlevel_ranges};
