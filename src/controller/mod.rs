//! Resilient session manager over the control port: connection lifecycle,
//! query cache, event-set negotiation, and listener fan-out.
//!
//! Grounded directly in the original `torTools.Controller`, adapted from a
//! single coarse Python lock to a [`parking_lot::ReentrantMutex`] guarding a
//! `RefCell<Inner>`: every public method holds the mutex for its whole
//! duration (so concurrent threads see an atomic operation) but only ever
//! borrows the `RefCell` in short, non-overlapping scopes, dropping the
//! borrow before making any nested call back into `self` — nested calls
//! then re-lock the same mutex from the same thread, which
//! `ReentrantMutex` permits.

pub mod connection;
pub mod listener;
mod negotiation;

pub use connection::ControlConnection;
pub use listener::{ControllerStatus, EventListener, StatusListener, TorCtlListener};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use parking_lot::ReentrantMutex;
use std::cell::RefCell;

use crate::cache::{Cache, CacheKey, CachedValue, Lookup};
use crate::config::Config;
use crate::error::{ConnectionError, ControllerError};
use crate::events::RouterEvent;
use crate::process::{self, CommandRunner, SystemCommandRunner};

/// Sentinel substring the lower-level client's control-channel log sink uses
/// to announce that the router closed the connection out from under us.
const TOR_CTL_CLOSE_MSG: &str = "Tor closed control connection. Exiting event thread.";

/// Required events and the consequence logged if one can't be subscribed to.
const REQUIRED_EVENTS: &[(&str, &str)] = &[
    ("NOTICE", "this will be unable to detect when tor is shut down"),
    ("NEWDESC", "information related to descriptors will grow stale"),
    ("NS", "information related to the consensus will grow stale"),
    ("NEWCONSENSUS", "information related to the consensus will grow stale"),
];

struct Inner {
    conn: Option<Arc<dyn ControlConnection>>,
    status: ControllerStatus,
    status_time: Instant,
    cache: Cache,
    event_listeners: Vec<Arc<dyn EventListener>>,
    torctl_listeners: Vec<TorCtlListener>,
    status_listeners: Vec<StatusListener>,
    controller_events: HashSet<String>,
    last_heartbeat: Instant,
    is_reset: bool,
}

impl Inner {
    fn new() -> Self {
        let now = Instant::now();
        Inner {
            conn: None,
            status: ControllerStatus::Closed,
            status_time: now,
            cache: Cache::new(),
            event_listeners: Vec::new(),
            torctl_listeners: Vec::new(),
            status_listeners: Vec::new(),
            controller_events: HashSet::new(),
            last_heartbeat: now,
            is_reset: false,
        }
    }
}

pub struct Controller {
    inner: ReentrantMutex<RefCell<Inner>>,
    /// Event names the router has previously rejected; never retried. Each
    /// `Controller` owns one by default, but [`Controller::new_sharing_failed_events`]
    /// lets multiple instances in one process share the same set, matching
    /// the original source's module-level `FAILED_EVENTS` without imposing
    /// an implicit global on tests.
    failed_events: Arc<Mutex<HashSet<String>>>,
    command_runner: Arc<dyn CommandRunner>,
    config: Config,
    self_weak: Weak<Controller>,
}

impl Controller {
    pub fn new(config: Config) -> Arc<Self> {
        Self::new_sharing_failed_events(config, Arc::new(Mutex::new(HashSet::new())))
    }

    pub fn new_sharing_failed_events(
        config: Config,
        failed_events: Arc<Mutex<HashSet<String>>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Controller {
            inner: ReentrantMutex::new(RefCell::new(Inner::new())),
            failed_events,
            command_runner: Arc::new(SystemCommandRunner),
            config,
            self_weak: weak.clone(),
        })
    }

    fn self_arc(&self) -> Arc<Controller> {
        self.self_weak
            .upgrade()
            .expect("Controller always outlives its own methods")
    }

    // ---- lifecycle -----------------------------------------------------

    /// Attaches (or re-attaches) this controller to a live connection.
    /// Closes any existing connection first, registers itself as that
    /// connection's one event listener, and re-negotiates the subscribed
    /// event set. Listeners already registered on this controller need no
    /// re-registration: event delivery always flows through the
    /// controller's own fan-out, never straight from the connection.
    pub fn init(&self, conn: Arc<dyn ControlConnection>) -> Result<(), ControllerError> {
        if !conn.is_live() {
            return Err(ControllerError::InitFailed);
        }

        let guard = self.inner.lock();
        let already_this_conn = {
            let inner = guard.borrow();
            inner
                .conn
                .as_ref()
                .is_some_and(|existing| Arc::ptr_eq(existing, &conn))
        };
        if already_this_conn {
            return Ok(());
        }

        let had_existing = guard.borrow().conn.is_some();
        if had_existing {
            self.close();
        }

        let requested_events = {
            let mut inner = guard.borrow_mut();
            inner.conn = Some(conn.clone());
            inner.controller_events.clone()
        };

        // The controller is the connection's one and only event listener;
        // it fans events back out to `event_listeners` itself, after
        // applying cache invalidation and heartbeat bookkeeping.
        conn.add_event_listener(self.self_arc());

        self.set_controller_events(requested_events);

        {
            let mut inner = guard.borrow_mut();
            inner.status = ControllerStatus::Init;
            inner.status_time = Instant::now();
        }

        self.spawn_status_notification(ControllerStatus::Init);
        Ok(())
    }

    /// Closes the current connection, if any, and notifies status
    /// listeners. Idempotent.
    pub fn close(&self) {
        let guard = self.inner.lock();
        let conn = {
            let mut inner = guard.borrow_mut();
            inner.conn.take()
        };
        let Some(conn) = conn else { return };
        conn.close();
        {
            let mut inner = guard.borrow_mut();
            inner.status = ControllerStatus::Closed;
            inner.status_time = Instant::now();
        }
        self.spawn_status_notification(ControllerStatus::Closed);
    }

    /// True iff a connection exists and reports live; otherwise the
    /// connection is closed as a side effect and `false` is returned.
    pub fn is_alive(&self) -> bool {
        let guard = self.inner.lock();
        let live = guard.borrow().conn.as_ref().is_some_and(|c| c.is_live());
        if live {
            return true;
        }
        let has_dead_conn = guard.borrow().conn.is_some();
        drop(guard);
        if has_dead_conn {
            self.close();
        }
        false
    }

    pub fn status(&self) -> (ControllerStatus, Instant) {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        (inner.status, inner.status_time)
    }

    pub fn heartbeat_secs(&self) -> u64 {
        let guard = self.inner.lock();
        let secs = guard.borrow().last_heartbeat.elapsed().as_secs();
        secs
    }

    fn spawn_status_notification(&self, new_status: ControllerStatus) {
        // Cache is reset on every status transition.
        {
            let guard = self.inner.lock();
            guard.borrow_mut().cache.clear();
        }

        if new_status == ControllerStatus::Closed {
            log::log!(
                crate::config::runlevel_to_log_level(self.config.log_tor_ctl_port_closed),
                "control port closed"
            );
        }

        let controller = self.self_arc();
        std::thread::spawn(move || {
            let listeners = {
                let guard = controller.inner.lock();
                let listeners = guard.borrow().status_listeners.clone();
                listeners
            };
            for listener in listeners {
                listener(&controller, new_status);
            }
        });
    }

    // ---- listener registration ------------------------------------------

    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.lock().borrow_mut().event_listeners.push(listener);
    }

    pub fn add_torctl_listener(&self, callback: TorCtlListener) {
        self.inner.lock().borrow_mut().torctl_listeners.push(callback);
    }

    pub fn add_status_listener(&self, callback: StatusListener) {
        self.inner.lock().borrow_mut().status_listeners.push(callback);
    }

    /// Removes a previously registered status listener by pointer identity,
    /// reporting whether a match was actually found (mirroring the boolean
    /// return of the original `removeStatusListener`).
    pub fn remove_status_listener(&self, callback: &StatusListener) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let before = inner.status_listeners.len();
        inner
            .status_listeners
            .retain(|existing| !Arc::ptr_eq(existing, callback));
        inner.status_listeners.len() != before
    }

    // ---- queries ---------------------------------------------------------

    /// `GETINFO <key>`, consulting the cache first for cacheable keys.
    pub fn get_info(
        &self,
        key: &str,
        default: Option<String>,
        suppress_exc: bool,
    ) -> Result<Option<String>, ControllerError> {
        let guard = self.inner.lock();

        if let Some(cache_key) = CacheKey::from_getinfo_param(key) {
            let cached = {
                let inner = guard.borrow();
                match inner.cache.get(cache_key) {
                    Lookup::Present(v) => Some(v.as_text().map(str::to_string)),
                    _ => None,
                }
            };
            if let Some(value) = cached {
                return Ok(value);
            }
        }

        let alive = self.is_alive_locked(&guard);
        if !alive {
            return Ok(default);
        }

        let conn = guard.borrow().conn.clone().expect("just checked alive");
        let result = conn.get_info(key);

        match result {
            Ok(value) => {
                if let (Some(cache_key), Some(v)) = (CacheKey::from_getinfo_param(key), &value) {
                    if !v.is_empty() {
                        let guard = self.inner.lock();
                        guard
                            .borrow_mut()
                            .cache
                            .set_present(cache_key, CachedValue::Text(v.clone()));
                    }
                }
                Ok(value)
            }
            Err(ConnectionError::Closed) => {
                self.close();
                Self::suppress_or_raise(default, Some(ConnectionError::Closed), suppress_exc)
            }
            Err(e) => Self::suppress_or_raise(default, Some(e), suppress_exc),
        }
    }

    /// `GETCONF <key>`. Never cached: configuration may change silently.
    pub fn get_option(
        &self,
        key: &str,
        default: Option<Vec<String>>,
        multiple: bool,
        suppress_exc: bool,
    ) -> Result<Vec<String>, ControllerError> {
        if !self.is_alive() {
            return Ok(default.unwrap_or_default());
        }
        let conn = {
            let guard = self.inner.lock();
            let conn = guard.borrow().conn.clone();
            conn
        };
        let Some(conn) = conn else {
            return Ok(default.unwrap_or_default());
        };

        match conn.get_option(key) {
            Ok(pairs) => {
                let values: Vec<String> = pairs.into_iter().map(|(_, v)| v).collect();
                if multiple {
                    Ok(values)
                } else {
                    Ok(values.into_iter().take(1).collect())
                }
            }
            Err(ConnectionError::Closed) => {
                self.close();
                if suppress_exc {
                    Ok(default.unwrap_or_default())
                } else {
                    Err(ControllerError::Connection(ConnectionError::Closed))
                }
            }
            Err(e) => {
                if suppress_exc {
                    Ok(default.unwrap_or_default())
                } else {
                    Err(ControllerError::Connection(e))
                }
            }
        }
    }

    fn get_option_one(&self, key: &str, default: &str) -> String {
        self.get_option(key, Some(vec![default.to_string()]), false, true)
            .ok()
            .and_then(|v| v.into_iter().next())
            .unwrap_or_else(|| default.to_string())
    }

    fn is_alive_locked(&self, guard: &parking_lot::ReentrantMutexGuard<'_, RefCell<Inner>>) -> bool {
        guard.borrow().conn.as_ref().is_some_and(|c| c.is_live())
    }

    fn suppress_or_raise<T>(
        default: Option<T>,
        err: Option<ConnectionError>,
        suppress_exc: bool,
    ) -> Result<Option<T>, ControllerError> {
        if suppress_exc {
            Ok(default)
        } else {
            Err(ControllerError::Connection(err.unwrap_or(ConnectionError::Closed)))
        }
    }

    // ---- reload ------------------------------------------------------------

    /// Sends `SIGNAL RELOAD`, or (if `issue_sighup`) shells out to `pkill
    /// -sighup ^tor$` and polls for confirmation.
    pub fn reload(&self, issue_sighup: bool) -> Result<(), ControllerError> {
        if !self.is_alive() {
            return Ok(());
        }

        if !issue_sighup {
            let conn = {
                let guard = self.inner.lock();
                let conn = guard.borrow().conn.clone();
                conn
            };
            let Some(conn) = conn else { return Ok(()) };
            conn.send_signal("RELOAD")
                .map_err(ControllerError::Connection)?;
            let guard = self.inner.lock();
            guard.borrow_mut().cache.clear();
            return Ok(());
        }

        {
            let guard = self.inner.lock();
            guard.borrow_mut().is_reset = false;
        }

        let output = self
            .command_runner
            .run("pkill", &["-sighup", "^tor$"])
            .unwrap_or_default();

        let wait_start = Instant::now();
        let mut confirmed = false;
        while wait_start.elapsed().as_millis() < 1000 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            let guard = self.inner.lock();
            if guard.borrow().is_reset {
                confirmed = true;
                break;
            }
        }

        if !confirmed {
            let pid = self.get_my_pid();
            let error_line = pid
                .as_deref()
                .and_then(|pid| {
                    output
                        .iter()
                        .find(|line| line.starts_with(&format!("pkill: {pid} - ")))
                })
                .cloned();
            return Err(ControllerError::ReloadFailed(
                error_line.unwrap_or_else(|| "failed silently".to_string()),
            ));
        }

        let guard = self.inner.lock();
        guard.borrow_mut().cache.clear();
        Ok(())
    }

    // ---- relay-attribute resolver -----------------------------------------

    pub fn get_my_network_status(&self, default: Vec<String>) -> Vec<String> {
        self.get_relay_attr(CacheKey::NsEntry, true)
            .and_then(|v| v.as_lines().map(|l| l.to_vec()))
            .unwrap_or(default)
    }

    pub fn get_my_descriptor(&self, default: Vec<String>) -> Vec<String> {
        self.get_relay_attr(CacheKey::DescEntry, true)
            .and_then(|v| v.as_lines().map(|l| l.to_vec()))
            .unwrap_or(default)
    }

    pub fn get_my_bandwidth_rate(&self, default: i64) -> i64 {
        self.get_relay_attr(CacheKey::BwRate, true)
            .and_then(|v| v.as_number())
            .unwrap_or(default)
    }

    pub fn get_my_bandwidth_burst(&self, default: i64) -> i64 {
        self.get_relay_attr(CacheKey::BwBurst, true)
            .and_then(|v| v.as_number())
            .unwrap_or(default)
    }

    pub fn get_my_bandwidth_observed(&self, default: i64) -> i64 {
        self.get_relay_attr(CacheKey::BwObserved, true)
            .and_then(|v| v.as_number())
            .unwrap_or(default)
    }

    pub fn get_my_bandwidth_measured(&self, default: i64) -> i64 {
        self.get_relay_attr(CacheKey::BwMeasured, true)
            .and_then(|v| v.as_number())
            .unwrap_or(default)
    }

    pub fn get_my_flags(&self, default: Vec<String>) -> Vec<String> {
        self.get_relay_attr(CacheKey::Flags, true)
            .and_then(|v| v.as_list().map(|l| l.to_vec()))
            .unwrap_or(default)
    }

    pub fn get_my_pid(&self) -> Option<String> {
        self.get_relay_attr(CacheKey::Pid, true)
            .and_then(|v| v.as_text().map(str::to_string))
    }

    fn get_relay_attr(&self, key: CacheKey, cache_undefined: bool) -> Option<CachedValue> {
        let guard = self.inner.lock();

        {
            let inner = guard.borrow();
            match inner.cache.get(key) {
                Lookup::Present(v) => return Some(v.clone()),
                Lookup::Undefined => return None,
                Lookup::Absent => (),
            }
        }

        if !self.is_alive_locked(&guard) {
            return None;
        }

        let computed = self.compute_relay_attr(key);

        let guard = self.inner.lock();
        match &computed {
            Some(value) => guard.borrow_mut().cache.set_present(key, value.clone()),
            None if cache_undefined => guard.borrow_mut().cache.set_undefined(key),
            None => {}
        }
        computed
    }

    fn compute_relay_attr(&self, key: CacheKey) -> Option<CachedValue> {
        match key {
            CacheKey::NsEntry | CacheKey::DescEntry => {
                let fingerprint = self.get_info("fingerprint", None, true).ok().flatten()?;
                let query = if key == CacheKey::NsEntry {
                    format!("ns/id/{fingerprint}")
                } else {
                    format!("desc/id/{fingerprint}")
                };
                let result = self.get_info(&query, None, true).ok().flatten()?;
                Some(CachedValue::Lines(result.lines().map(str::to_string).collect()))
            }
            CacheKey::BwRate => {
                let base: i64 = self.get_option_one("BandwidthRate", "0").parse().ok()?;
                let mut rate = base;
                let relay = self.get_option_one("RelayBandwidthRate", "0");
                if relay != "0" {
                    if let Ok(relay) = relay.parse::<i64>() {
                        rate = rate.min(relay);
                    }
                }
                let max_advertised = self.get_option_one("MaxAdvertisedBandwidth", "");
                if !max_advertised.is_empty() {
                    if let Ok(max_advertised) = max_advertised.parse::<i64>() {
                        rate = rate.min(max_advertised);
                    }
                }
                Some(CachedValue::Number(rate))
            }
            CacheKey::BwBurst => {
                let base: i64 = self.get_option_one("BandwidthBurst", "0").parse().ok()?;
                let mut burst = base;
                let relay = self.get_option_one("RelayBandwidthBurst", "0");
                if relay != "0" {
                    if let Ok(relay) = relay.parse::<i64>() {
                        burst = burst.min(relay);
                    }
                }
                Some(CachedValue::Number(burst))
            }
            CacheKey::BwObserved => {
                let descriptor = self.get_my_descriptor(Vec::new());
                descriptor.iter().find_map(|line| {
                    let comp: Vec<&str> = line.split_whitespace().collect();
                    if comp.first() == Some(&"bandwidth") && comp.len() == 4 {
                        comp[3].parse::<i64>().ok().map(CachedValue::Number)
                    } else {
                        None
                    }
                })
            }
            CacheKey::BwMeasured => {
                let ns_entry = self.get_my_network_status(Vec::new());
                ns_entry.iter().find_map(|line| {
                    line.strip_prefix("w Bandwidth=")
                        .and_then(|v| v.parse::<i64>().ok())
                        .map(CachedValue::Number)
                })
            }
            CacheKey::Flags => {
                let ns_entry = self.get_my_network_status(Vec::new());
                ns_entry.iter().find_map(|line| {
                    line.strip_prefix("s ")
                        .map(|rest| CachedValue::List(rest.split_whitespace().map(str::to_string).collect()))
                })
            }
            CacheKey::Pid => {
                let control_port: u16 = self.get_option_one("ControlPort", "9051").parse().unwrap_or(9051);
                let pid_file = self.get_option_one("PidFile", "");
                let pid_file_path = if pid_file.is_empty() { None } else { Some(PathBuf::from(pid_file)) };
                process::find_pid(self.command_runner.as_ref(), control_port, pid_file_path.as_deref())
                    .map(CachedValue::Text)
            }
            _ => None,
        }
    }

    // ---- event-set negotiation ---------------------------------------------

    /// See [`negotiation::negotiate`] for the full algorithm.
    pub fn set_controller_events(&self, events: HashSet<String>) -> HashSet<String> {
        negotiation::negotiate(self, events)
    }

    pub fn get_controller_events(&self) -> HashSet<String> {
        self.inner.lock().borrow().controller_events.clone()
    }

    // ---- control-channel log sink ------------------------------------------

    /// Entry point the lower-level client uses to report its own
    /// diagnostics. These arrive as pre-formatted `LEVEL[timestamp]
    /// message` strings in the original source; this crate's
    /// external-interface layer is expected to have already parsed that
    /// into a typed `(Runlevel, &str)` pair before calling here.
    pub fn log(&self, level: crate::events::Runlevel, message: &str) {
        let listeners = self.inner.lock().borrow().torctl_listeners.clone();
        for callback in &listeners {
            callback(level, message);
        }
        if message.contains(TOR_CTL_CLOSE_MSG) {
            self.close();
        }
    }
}

impl EventListener for Controller {
    fn on_event(&self, event: &RouterEvent) {
        {
            let guard = self.inner.lock();
            guard.borrow_mut().last_heartbeat = Instant::now();
        }

        match event {
            RouterEvent::Message(m) if m.message.starts_with("Received reload signal (hup)") => {
                if m.level == crate::events::Runlevel::Notice {
                    {
                        let guard = self.inner.lock();
                        let mut inner = guard.borrow_mut();
                        inner.is_reset = true;
                        inner.status = ControllerStatus::Init;
                        inner.status_time = Instant::now();
                    }
                    self.spawn_status_notification(ControllerStatus::Init);
                }
            }
            RouterEvent::Ns { entries } => {
                let fingerprint = self.get_info("fingerprint", None, true).ok().flatten();
                let invalidate = match &fingerprint {
                    Some(fp) => entries.iter().any(|e| &e.fingerprint == fp),
                    None => true,
                };
                if invalidate {
                    self.invalidate_ns_keys();
                }
            }
            RouterEvent::NewConsensus { .. } => self.invalidate_ns_keys(),
            RouterEvent::NewDesc { idlist } => {
                let fingerprint = self.get_info("fingerprint", None, true).ok().flatten();
                let invalidate = match &fingerprint {
                    Some(fp) => idlist.contains(fp),
                    None => true,
                };
                if invalidate {
                    let guard = self.inner.lock();
                    guard
                        .borrow_mut()
                        .cache
                        .invalidate_all(&[CacheKey::DescEntry, CacheKey::BwObserved]);
                }
            }
            _ => {}
        }

        let listeners = self.inner.lock().borrow().event_listeners.clone();
        for listener in &listeners {
            listener.on_event(event);
        }
    }
}

impl Controller {
    fn invalidate_ns_keys(&self) {
        let guard = self.inner.lock();
        guard
            .borrow_mut()
            .cache
            .invalidate_all(&[CacheKey::NsEntry, CacheKey::Flags, CacheKey::BwMeasured]);
    }
}

#[cfg(test)]
mod tests;
