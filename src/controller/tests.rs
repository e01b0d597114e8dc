use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use super::*;
use crate::cache::{CacheKey, Lookup};
use crate::events::{MessageEvent, NetworkStatusEntry, Runlevel};

struct FakeConnection {
    live: AtomicBool,
    info: StdMutex<HashMap<String, String>>,
    options: StdMutex<HashMap<String, Vec<String>>>,
    set_events_calls: StdMutex<Vec<Vec<String>>>,
    reject_events: StdMutex<HashSet<String>>,
    listeners: StdMutex<Vec<Arc<dyn EventListener>>>,
}

impl FakeConnection {
    fn new() -> Arc<Self> {
        Arc::new(FakeConnection {
            live: AtomicBool::new(true),
            info: StdMutex::new(HashMap::new()),
            options: StdMutex::new(HashMap::new()),
            set_events_calls: StdMutex::new(Vec::new()),
            reject_events: StdMutex::new(HashSet::new()),
            listeners: StdMutex::new(Vec::new()),
        })
    }

    fn set_info(&self, key: &str, value: &str) {
        self.info.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    fn set_option(&self, key: &str, values: &[&str]) {
        self.options
            .lock()
            .unwrap()
            .insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
    }

    fn reject(&self, event: &str) {
        self.reject_events.lock().unwrap().insert(event.to_string());
    }

    fn broadcast(&self, event: &RouterEvent) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_event(event);
        }
    }

    fn last_set_events(&self) -> Vec<String> {
        self.set_events_calls.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl ControlConnection for FakeConnection {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn get_info(&self, key: &str) -> Result<Option<String>, ConnectionError> {
        Ok(self.info.lock().unwrap().get(key).cloned())
    }

    fn get_option(&self, key: &str) -> Result<Vec<(String, String)>, ConnectionError> {
        Ok(self
            .options
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|v| (key.to_string(), v))
            .collect())
    }

    fn set_events(&self, events: &[String]) -> Result<(), ConnectionError> {
        self.set_events_calls.lock().unwrap().push(events.to_vec());
        let rejected = self.reject_events.lock().unwrap();
        for event in events {
            if rejected.contains(event) {
                return Err(ConnectionError::Protocol(format!(
                    "552 Unrecognized event \"{event}\""
                )));
            }
        }
        Ok(())
    }

    fn send_signal(&self, _name: &str) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.lock().unwrap().push(listener);
    }
}

fn new_controller() -> Arc<Controller> {
    Controller::new(Config::default())
}

#[test]
fn init_marks_status_init_and_alive() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    controller.init(conn).unwrap();
    assert!(controller.is_alive());
    assert_eq!(controller.status().0, ControllerStatus::Init);
}

#[test]
fn close_is_idempotent_and_marks_closed() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    controller.init(conn).unwrap();
    controller.close();
    controller.close();
    assert!(!controller.is_alive());
    assert_eq!(controller.status().0, ControllerStatus::Closed);
}

#[test]
fn init_on_dead_connection_fails() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    conn.close();
    assert!(matches!(controller.init(conn), Err(ControllerError::InitFailed)));
}

#[test]
fn get_info_populates_cache_for_known_keys() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    conn.set_info("version", "0.4.8.10");
    controller.init(conn).unwrap();

    assert_eq!(
        controller.get_info("version", None, true).unwrap(),
        Some("0.4.8.10".to_string())
    );
    let guard = controller.inner.lock();
    match guard.borrow().cache.get(CacheKey::Version) {
        Lookup::Present(v) => assert_eq!(v.as_text(), Some("0.4.8.10")),
        _ => panic!("expected version to be cached"),
    };
}

#[test]
fn get_info_on_uninitialized_controller_returns_default_without_error() {
    let controller = new_controller();
    assert_eq!(
        controller.get_info("version", Some("fallback".to_string()), false).unwrap(),
        Some("fallback".to_string())
    );
}

#[test]
fn ns_event_for_own_fingerprint_invalidates_relay_cache() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    conn.set_info("fingerprint", "ABCDEF");
    conn.set_info("ns/id/ABCDEF", "r example ABCDEF ...");
    controller.init(conn.clone()).unwrap();

    controller.get_my_network_status(Vec::new());
    assert!(matches!(
        controller.inner.lock().borrow().cache.get(CacheKey::NsEntry),
        Lookup::Present(_)
    ));

    conn.broadcast(&RouterEvent::Ns {
        entries: vec![NetworkStatusEntry {
            nickname: "example".into(),
            fingerprint: "ABCDEF".into(),
            address: "127.0.0.1".into(),
            or_port: 9001,
        }],
    });

    assert!(matches!(
        controller.inner.lock().borrow().cache.get(CacheKey::NsEntry),
        Lookup::Absent
    ));
}

#[test]
fn ns_event_for_other_fingerprint_leaves_cache_untouched() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    conn.set_info("fingerprint", "ABCDEF");
    conn.set_info("ns/id/ABCDEF", "r example ABCDEF ...");
    controller.init(conn.clone()).unwrap();
    controller.get_my_network_status(Vec::new());

    conn.broadcast(&RouterEvent::Ns {
        entries: vec![NetworkStatusEntry {
            nickname: "other".into(),
            fingerprint: "999999".into(),
            address: "127.0.0.1".into(),
            or_port: 9001,
        }],
    });

    assert!(matches!(
        controller.inner.lock().borrow().cache.get(CacheKey::NsEntry),
        Lookup::Present(_)
    ));
}

#[test]
fn rejected_event_is_dropped_and_remembered() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    conn.reject("FOO");
    controller.init(conn.clone()).unwrap();

    let accepted = controller.set_controller_events(HashSet::from(["FOO".to_string()]));
    assert!(!accepted.contains("FOO"));
    assert!(conn
        .reject_events
        .lock()
        .unwrap()
        .iter()
        .all(|e| !accepted.contains(e)));

    let accepted_again = controller.set_controller_events(HashSet::from([
        "FOO".to_string(),
        "BW".to_string(),
    ]));
    assert!(!accepted_again.contains("FOO"));
    assert!(accepted_again.contains("BW"));
    assert!(!conn.last_set_events().iter().any(|e| e == "FOO"));
}

#[test]
fn reload_without_sighup_sends_signal_and_clears_cache() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    conn.set_info("version", "0.4.8.10");
    controller.init(conn).unwrap();
    controller.get_info("version", None, true).unwrap();

    controller.reload(false).unwrap();
    assert!(matches!(
        controller.inner.lock().borrow().cache.get(CacheKey::Version),
        Lookup::Absent
    ));
}

#[test]
fn control_channel_close_sentinel_closes_controller() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    controller.init(conn).unwrap();
    controller.log(Runlevel::Notice, "Tor closed control connection. Exiting event thread.");
    assert!(!controller.is_alive());
}

#[test]
fn torctl_listener_receives_log_lines() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    controller.init(conn).unwrap();

    let received: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
    let sink = received.clone();
    controller.add_torctl_listener(Arc::new(move |_level, message: &str| {
        sink.lock().unwrap().push(message.to_string());
    }));

    controller.log(Runlevel::Debug, "bootstrapped 100%");
    assert_eq!(received.lock().unwrap().as_slice(), ["bootstrapped 100%"]);
}

#[test]
fn bandwidth_rate_takes_tightest_of_the_three_bounds() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    conn.set_option("BandwidthRate", &["10000"]);
    conn.set_option("RelayBandwidthRate", &["5000"]);
    conn.set_option("MaxAdvertisedBandwidth", &["2000"]);
    controller.init(conn).unwrap();

    assert_eq!(controller.get_my_bandwidth_rate(-1), 2000);
}

#[test]
fn message_event_forwards_to_registered_event_listeners() {
    let controller = new_controller();
    let conn = FakeConnection::new();
    controller.init(conn.clone()).unwrap();

    struct Recorder(StdMutex<Vec<String>>);
    impl EventListener for Recorder {
        fn on_event(&self, event: &RouterEvent) {
            self.0.lock().unwrap().push(event.event_name());
        }
    }
    let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
    controller.add_event_listener(recorder.clone());

    conn.broadcast(&RouterEvent::Message(MessageEvent {
        level: Runlevel::Info,
        message: "hello".into(),
    }));

    assert_eq!(recorder.0.lock().unwrap().as_slice(), ["INFO"]);
}
