//! The upstream interface this crate consumes: a live control connection,
//! as provided by a lower-level control-protocol client. This crate does
//! not implement the wire codec itself — it only defines the contract it
//! needs from one.

use std::sync::Arc;

use crate::controller::EventListener;
use crate::error::ConnectionError;

/// A live control-port session, as handed to the controller by the
/// lower-level client. Implementations own the actual socket and event
/// thread; everything here is a thin synchronous facade plus a hook for
/// attaching event listeners.
pub trait ControlConnection: Send + Sync {
    /// True while the underlying socket is still usable.
    fn is_live(&self) -> bool;

    /// Closes the underlying socket. Idempotent.
    fn close(&self);

    /// `GETINFO <key>`. `Ok(None)` means the router answered with no value
    /// for this key (distinct from a protocol error).
    fn get_info(&self, key: &str) -> Result<Option<String>, ConnectionError>;

    /// `GETCONF <key>`, returning every `(key, value)` pair the router
    /// replied with (a multi-valued option returns more than one entry).
    fn get_option(&self, key: &str) -> Result<Vec<(String, String)>, ConnectionError>;

    /// `SETEVENTS <events>`. On rejection the error's `Protocol` variant
    /// carries the router's reply line verbatim so the controller can parse
    /// out `Unrecognized event "X"`.
    fn set_events(&self, events: &[String]) -> Result<(), ConnectionError>;

    /// `SIGNAL <name>`.
    fn send_signal(&self, name: &str) -> Result<(), ConnectionError>;

    /// Registers a listener to receive every subsequent typed event
    /// delivery on this connection.
    fn add_event_listener(&self, listener: Arc<dyn EventListener>);
}
