//! Tagged records for every event kind the control connection can deliver,
//! plus the [`Runlevel`] ladder shared by router and internal diagnostics.

use std::fmt;

/// Severity ladder used both by the router (`DEBUG`..`ERR`) and by this
/// crate's own internal diagnostics (`ARM_DEBUG`..`ARM_ERR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Runlevel {
    Debug,
    Info,
    Notice,
    Warn,
    Err,
}

impl Runlevel {
    pub const ALL: [Runlevel; 5] = [
        Runlevel::Debug,
        Runlevel::Info,
        Runlevel::Notice,
        Runlevel::Warn,
        Runlevel::Err,
    ];

    /// Name as it appears in router event names and config severities
    /// (`DEBUG`, `INFO`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Runlevel::Debug => "DEBUG",
            Runlevel::Info => "INFO",
            Runlevel::Notice => "NOTICE",
            Runlevel::Warn => "WARN",
            Runlevel::Err => "ERR",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Runlevel> {
        match s {
            "DEBUG" => Some(Runlevel::Debug),
            "INFO" => Some(Runlevel::Info),
            "NOTICE" => Some(Runlevel::Notice),
            "WARN" => Some(Runlevel::Warn),
            "ERR" => Some(Runlevel::Err),
            _ => None,
        }
    }

    /// Name carrying the internal-diagnostic prefix (`ARM_DEBUG`, ...).
    pub fn arm_event_name(self) -> String {
        format!("ARM_{}", self.as_str())
    }
}

impl fmt::Display for Runlevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry from a `CIRC` event's path/purpose/reason fields.
#[derive(Debug, Clone)]
pub struct CircuitEvent {
    pub circ_id: String,
    pub status: String,
    pub path: Vec<String>,
    pub purpose: Option<String>,
    pub reason: Option<String>,
    pub remote_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub stream_id: String,
    pub status: String,
    pub circ_id: String,
    pub target_host: String,
    pub target_port: u16,
    pub reason: Option<String>,
    pub remote_reason: Option<String>,
    pub source: Option<String>,
    pub source_addr: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrConnEvent {
    pub status: String,
    pub endpoint: String,
    pub age: Option<u32>,
    pub read_bytes: Option<u64>,
    pub wrote_bytes: Option<u64>,
    pub reason: Option<String>,
    pub ncircs: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct StreamBwEvent {
    pub stream_id: String,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone)]
pub struct BandwidthEvent {
    pub read: u64,
    pub written: u64,
}

#[derive(Debug, Clone)]
pub struct AddrMapEvent {
    pub when: String,
    pub from_addr: String,
    pub to_addr: String,
}

/// One entry of a network-status (consensus) listing, as delivered by `NS`
/// and `NEWCONSENSUS` events.
#[derive(Debug, Clone)]
pub struct NetworkStatusEntry {
    pub nickname: String,
    pub fingerprint: String,
    pub address: String,
    pub or_port: u16,
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub level: Runlevel,
    pub message: String,
}

/// Tagged dispatch payload for every router event kind this crate reacts to
/// or forwards. Matches against this enum is the one dispatch surface
/// [`crate::controller::EventListener::on_event`] implementors see.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    Circuit(CircuitEvent),
    Stream(StreamEvent),
    OrConn(OrConnEvent),
    StreamBw(StreamBwEvent),
    Bandwidth(BandwidthEvent),
    NewDesc { idlist: Vec<String> },
    AddrMap(AddrMapEvent),
    Ns { entries: Vec<NetworkStatusEntry> },
    NewConsensus { entries: Vec<NetworkStatusEntry> },
    Message(MessageEvent),
    Unknown { raw: String },
}

impl RouterEvent {
    /// The event-name string used in the subscribed-event set and in the log
    /// panel's per-event filtering (`CIRC`, `BW`, `NOTICE`, ...).
    pub fn event_name(&self) -> String {
        match self {
            RouterEvent::Circuit(_) => "CIRC".to_string(),
            RouterEvent::Stream(_) => "STREAM".to_string(),
            RouterEvent::OrConn(_) => "ORCONN".to_string(),
            RouterEvent::StreamBw(_) => "STREAM_BW".to_string(),
            RouterEvent::Bandwidth(_) => "BW".to_string(),
            RouterEvent::NewDesc { .. } => "NEWDESC".to_string(),
            RouterEvent::AddrMap(_) => "ADDRMAP".to_string(),
            RouterEvent::Ns { .. } => "NS".to_string(),
            RouterEvent::NewConsensus { .. } => "NEWCONSENSUS".to_string(),
            RouterEvent::Message(m) => m.level.as_str().to_string(),
            RouterEvent::Unknown { .. } => "UNKNOWN".to_string(),
        }
    }
}
