//! Error types surfaced by the controller, the runlevel expander, and the
//! relay-attribute resolver.

/// Errors the control connection itself can report back to the controller.
///
/// Kept separate from [`ControllerError`] because the lower-level client
/// (out of scope for this crate) is the one raising it; the controller only
/// reacts to it.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The control socket is gone. The controller treats this as terminal
    /// for the current connection and calls `close()`.
    #[error("control connection closed")]
    Closed,
    /// The router replied to a query with an error line.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Transport-level failure underneath the control protocol.
    #[error("socket error: {0}")]
    Socket(String),
}

/// Errors surfaced to callers of [`crate::controller::Controller`] methods.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// `init()` could not obtain a live connection.
    #[error("unable to initialize control connection")]
    InitFailed,
    /// `reload(issue_sighup = true)` could not confirm the router reloaded.
    #[error("reload not confirmed: {0}")]
    ReloadFailed(String),
}

/// Raised by [`crate::runlevel::expand_events`] when the flag string contains
/// characters outside the recognized alphabet.
///
/// Carries the offending characters in the order they appeared, not merely
/// their presence, so callers can echo a precise complaint back to whoever
/// typed the flags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized event flags: {bad_chars}")]
pub struct InvalidFlags {
    pub bad_chars: String,
}
