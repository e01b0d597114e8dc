//! Event-set negotiation: the router may reject individual event names
//! depending on its version, so the requested set is whittled down one
//! `SETEVENTS` retry at a time rather than abandoned wholesale.

use std::collections::HashSet;

use crate::error::ConnectionError;

use super::{Controller, REQUIRED_EVENTS};

pub(super) fn negotiate(controller: &Controller, events: HashSet<String>) -> HashSet<String> {
    if !controller.is_alive() {
        let guard = controller.inner.lock();
        guard.borrow_mut().controller_events = events.clone();
        return events;
    }

    let required: HashSet<String> = REQUIRED_EVENTS.iter().map(|(name, _)| name.to_string()).collect();
    let mut attempted: HashSet<String> = events.union(&required).cloned().collect();
    {
        let failed = controller.failed_events.lock().unwrap();
        attempted.retain(|e| !failed.contains(e));
    }

    let available: HashSet<String> = controller
        .get_info("events/names", None, true)
        .ok()
        .flatten()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let mut unavailable_events: HashSet<String> = HashSet::new();
    if !available.is_empty() {
        unavailable_events.extend(attempted.iter().filter(|e| !available.contains(*e)).cloned());
        attempted.retain(|e| available.contains(e));
    }

    loop {
        let conn = {
            let guard = controller.inner.lock();
            let conn = guard.borrow().conn.clone();
            conn
        };
        let Some(conn) = conn else { break };

        let mut event_list: Vec<String> = attempted.iter().cloned().collect();
        event_list.sort();

        match conn.set_events(&event_list) {
            Ok(()) => break,
            Err(ConnectionError::Protocol(msg)) => match parse_unrecognized_event(&msg) {
                Some(bad) => {
                    unavailable_events.insert(bad.clone());
                    attempted.remove(&bad);
                    continue;
                }
                None => {
                    log::warn!("SETEVENTS rejected ({msg}), abandoning negotiation");
                    return controller.get_controller_events();
                }
            },
            Err(ConnectionError::Closed) => {
                controller.close();
                return controller.get_controller_events();
            }
            Err(e) => {
                log::warn!("SETEVENTS failed: {e}");
                return controller.get_controller_events();
            }
        }
    }

    {
        let mut failed = controller.failed_events.lock().unwrap();
        failed.extend(unavailable_events.iter().cloned());
    }
    for event in &unavailable_events {
        match REQUIRED_EVENTS.iter().find(|(name, _)| name == event) {
            Some((_, consequence)) => log::error!("unable to subscribe to event {event}: {consequence}"),
            None => log::warn!("unable to subscribe to event {event}"),
        }
    }

    let guard = controller.inner.lock();
    guard.borrow_mut().controller_events = attempted.clone();
    attempted
}

/// Pulls `X` out of a `Unrecognized event "X"` control-reply line.
fn parse_unrecognized_event(reply: &str) -> Option<String> {
    let after = reply.split("Unrecognized event \"").nth(1)?;
    let name = after.split('"').next()?;
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_quoted_event_name() {
        assert_eq!(
            parse_unrecognized_event(r#"552 Unrecognized event "FOO""#),
            Some("FOO".to_string())
        );
    }

    #[test]
    fn non_matching_reply_yields_none() {
        assert_eq!(parse_unrecognized_event("552 some other error"), None);
    }
}
