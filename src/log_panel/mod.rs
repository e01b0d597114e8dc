//! Bounded ring buffer ingesting router events, internal runlevel
//! diagnostics, and control-library diagnostics, with pause/resume,
//! render-time regex filtering, and scroll-offset tracking. Grounded
//! directly in the original `logPanel.LogPanel`.

pub mod entry;
mod prepopulate;

pub use entry::{header_label, split_line, ColourHint, LogLine};
pub use prepopulate::prepopulate;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use regex::Regex;

use crate::controller::EventListener;
use crate::events::{Runlevel, RouterEvent};

/// Ring-buffer bound shared by the visible and staging buffers.
pub const MAX_LOG_ENTRIES: usize = 1000;

fn runlevel_colour(level: Runlevel) -> ColourHint {
    match level {
        Runlevel::Debug => ColourHint::Magenta,
        Runlevel::Info => ColourHint::Blue,
        Runlevel::Notice => ColourHint::Green,
        Runlevel::Warn => ColourHint::Yellow,
        Runlevel::Err => ColourHint::Red,
    }
}

struct Inner {
    visible: VecDeque<LogLine>,
    staging: VecDeque<LogLine>,
    is_paused: bool,
    filter: Option<Regex>,
    scroll: usize,
    event_time_override: Option<(u8, u8, u8)>,
    logged_events: HashSet<String>,
    last_heartbeat: Instant,
    next_seq: u64,
}

pub struct LogPanel {
    inner: Mutex<Inner>,
    redraw_hook: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl LogPanel {
    pub fn new(logged_events: HashSet<String>) -> Self {
        LogPanel {
            inner: Mutex::new(Inner {
                visible: VecDeque::new(),
                staging: VecDeque::new(),
                is_paused: false,
                filter: None,
                scroll: 0,
                event_time_override: None,
                logged_events,
                last_heartbeat: Instant::now(),
                next_seq: 0,
            }),
            redraw_hook: Mutex::new(None),
        }
    }

    /// Registers a callback invoked whenever new entries are appended to
    /// the visible buffer (a rendering layer's hook to repaint itself).
    pub fn set_redraw_hook(&self, hook: Arc<dyn Fn() + Send + Sync>) {
        *self.redraw_hook.lock().unwrap() = Some(hook);
    }

    fn request_redraw(&self) {
        if let Some(hook) = self.redraw_hook.lock().unwrap().as_ref() {
            hook();
        }
    }

    fn is_subscribed(&self, event_name: &str) -> bool {
        self.inner.lock().unwrap().logged_events.contains(event_name)
    }

    /// Overrides the effective timestamp for subsequent ingestion (used by
    /// pre-population so parsed historical timestamps win over "now").
    /// `None` restores wall-clock time.
    pub fn set_event_time_override(&self, time: Option<(u8, u8, u8)>) {
        self.inner.lock().unwrap().event_time_override = time;
    }

    /// Appends one logical event to the active buffer. `message` may
    /// contain embedded newlines, in which case each line becomes its own
    /// buffer entry sharing one header timestamp.
    pub fn register_event(&self, event_type: &str, message: &str, colour: ColourHint) {
        let mut inner = self.inner.lock().unwrap();

        if !event_type.starts_with("ARM") {
            inner.last_heartbeat = Instant::now();
        }

        let (h, m, s) = inner.event_time_override.unwrap_or_else(now_hms);
        let header_prefix = format!("{h:02}:{m:02}:{s:02} [{event_type}] ");

        let mut rendered = Vec::new();
        for (i, raw_line) in message.lines().enumerate() {
            let cleaned: String = raw_line.chars().filter(|c| !c.is_control()).collect();
            let text = if i == 0 {
                format!("{header_prefix}{cleaned}")
            } else {
                format!(" {cleaned}")
            };
            let seq = inner.next_seq;
            inner.next_seq += 1;
            rendered.push(LogLine { text, colour, seq });
        }
        if rendered.is_empty() {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            rendered.push(LogLine { text: header_prefix, colour, seq });
        }

        let paused = inner.is_paused;
        let target = if paused { &mut inner.staging } else { &mut inner.visible };
        for line in rendered.into_iter().rev() {
            target.push_front(line);
        }
        while target.len() > MAX_LOG_ENTRIES {
            target.pop_back();
        }

        drop(inner);
        if !paused {
            self.request_redraw();
        }
    }

    fn register_internal_event(&self, level: Runlevel, message: &str) {
        if self.is_subscribed(&level.arm_event_name()) {
            self.register_event(&format!("ARM-{}", level.as_str()), message, runlevel_colour(level));
        }
    }

    pub fn register_torctl_event(&self, level: Runlevel, message: &str) {
        if self.is_subscribed("TORCTL") {
            self.register_event(&format!("TORCTL-{}", level.as_str()), message, runlevel_colour(level));
        }
    }

    // ---- pause / resume ----------------------------------------------------

    pub fn set_paused(&self, paused: bool) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_paused == paused {
            return;
        }
        inner.is_paused = paused;
        if paused {
            inner.staging.clear();
        } else {
            while let Some(line) = inner.staging.pop_back() {
                inner.visible.push_front(line);
            }
            while inner.visible.len() > MAX_LOG_ENTRIES {
                inner.visible.pop_back();
            }
            drop(inner);
            self.request_redraw();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().is_paused
    }

    // ---- filtering ----------------------------------------------------------

    pub fn set_filter(&self, filter: Option<Regex>) {
        self.inner.lock().unwrap().filter = filter;
    }

    /// Number of display lines the buffer currently occupies: entries
    /// failing the filter don't count, entries that wrap count twice.
    pub fn display_length(&self, width: usize) -> usize {
        let inner = self.inner.lock().unwrap();
        Self::display_length_locked(&inner, width)
    }

    fn display_length_locked(inner: &Inner, width: usize) -> usize {
        let mut length = inner.visible.len();
        for line in &inner.visible {
            match &inner.filter {
                Some(re) if !re.is_match(&line.text) => length -= 1,
                _ => {
                    if line.text.chars().count() >= width {
                        length += 1;
                    }
                }
            }
        }
        length
    }

    // ---- scrolling ------------------------------------------------------

    pub fn scroll_by(&self, delta: i64, page_height: usize, width: usize) {
        let mut inner = self.inner.lock().unwrap();
        let max_loc = Self::display_length_locked(&inner, width).saturating_sub(page_height) as i64;
        let new_scroll = (inner.scroll as i64 + delta).clamp(0, max_loc.max(0));
        inner.scroll = new_scroll as usize;
    }

    pub fn scroll_offset(&self) -> usize {
        self.inner.lock().unwrap().scroll
    }

    /// Header label for the subscribed event set.
    pub fn header(&self, width: usize) -> String {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<String> = inner.logged_events.iter().cloned().collect();
        events.sort();
        let filter_pattern = inner.filter.as_ref().map(|r| r.as_str().to_string());
        header_label(&events, filter_pattern.as_deref(), width)
    }

    /// Renders up to `height` display lines starting at the current scroll
    /// offset, applying the filter and word-wrap. Mirrors the original
    /// `draw()` loop without any actual terminal I/O.
    pub fn render(&self, width: usize, height: usize) -> Vec<(String, ColourHint)> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        let mut line_count: i64 = 1 - inner.scroll as i64;

        for line in &inner.visible {
            if let Some(re) = &inner.filter {
                if !re.is_match(&line.text) {
                    continue;
                }
            }

            if line.text.chars().count() < width {
                if line_count >= 1 {
                    out.push((line.text.clone(), line.colour));
                }
                line_count += 1;
            } else {
                let (l1, l2) = split_line(&line.text, width);
                if line_count >= 1 {
                    out.push((l1, line.colour));
                }
                if line_count >= 0 {
                    out.push((l2, line.colour));
                }
                line_count += 2;
            }

            if line_count >= height as i64 {
                break;
            }
        }

        out
    }

    pub fn heartbeat_secs(&self) -> u64 {
        self.inner.lock().unwrap().last_heartbeat.elapsed().as_secs()
    }

    pub fn logged_events(&self) -> HashSet<String> {
        self.inner.lock().unwrap().logged_events.clone()
    }
}

fn now_hms() -> (u8, u8, u8) {
    use chrono::Timelike;
    let now = chrono::Local::now();
    (now.hour() as u8, now.minute() as u8, now.second() as u8)
}

impl EventListener for LogPanel {
    fn on_event(&self, event: &RouterEvent) {
        match event {
            RouterEvent::Circuit(e) => {
                if self.is_subscribed("CIRC") {
                    let mut msg = format!(
                        "ID: {:<3} STATUS: {:<10} PATH: {}",
                        e.circ_id,
                        e.status,
                        e.path.join(", ")
                    );
                    if let Some(purpose) = &e.purpose {
                        msg.push_str(&format!(" PURPOSE: {purpose}"));
                    }
                    if let Some(reason) = &e.reason {
                        msg.push_str(&format!(" REASON: {reason}"));
                    }
                    if let Some(remote) = &e.remote_reason {
                        msg.push_str(&format!(" REMOTE_REASON: {remote}"));
                    }
                    self.register_event("CIRC", &msg, ColourHint::Yellow);
                }
            }
            RouterEvent::Stream(e) => {
                let msg = format!(
                    "ID: {} STATUS: {} CIRC_ID: {} TARGET: {}:{} REASON: {} REMOTE_REASON: {} SOURCE: {} SOURCE_ADDR: {} PURPOSE: {}",
                    e.stream_id,
                    e.status,
                    e.circ_id,
                    e.target_host,
                    e.target_port,
                    e.reason.as_deref().unwrap_or(""),
                    e.remote_reason.as_deref().unwrap_or(""),
                    e.source.as_deref().unwrap_or(""),
                    e.source_addr.as_deref().unwrap_or(""),
                    e.purpose.as_deref().unwrap_or("")
                );
                self.register_event("STREAM", &msg, ColourHint::White);
            }
            RouterEvent::OrConn(e) => {
                let mut msg = format!("STATUS: {:<10} ENDPOINT: {:<20}", e.status, e.endpoint);
                if let Some(age) = e.age {
                    msg.push_str(&format!(" AGE: {age:<3}"));
                }
                if let Some(read) = e.read_bytes {
                    msg.push_str(&format!(" READ: {read:<4}"));
                }
                if let Some(wrote) = e.wrote_bytes {
                    msg.push_str(&format!(" WRITTEN: {wrote:<4}"));
                }
                if let Some(reason) = &e.reason {
                    msg.push_str(&format!(" REASON: {reason:<6}"));
                }
                if let Some(ncircs) = e.ncircs {
                    msg.push_str(&format!(" NCIRCS: {ncircs}"));
                }
                self.register_event("ORCONN", &msg, ColourHint::White);
            }
            RouterEvent::StreamBw(e) => {
                let msg = format!("ID: {} READ: {} WRITTEN: {}", e.stream_id, e.bytes_read, e.bytes_written);
                self.register_event("STREAM_BW", &msg, ColourHint::White);
            }
            RouterEvent::Bandwidth(e) => {
                self.inner.lock().unwrap().last_heartbeat = Instant::now();
                if self.is_subscribed("BW") {
                    self.register_event("BW", &format!("READ: {}, WRITTEN: {}", e.read, e.written), ColourHint::Cyan);
                }
            }
            RouterEvent::NewDesc { idlist } => {
                if self.is_subscribed("NEWDESC") {
                    self.register_event("NEWDESC", &idlist.join(", "), ColourHint::White);
                }
            }
            RouterEvent::AddrMap(e) => {
                let msg = format!("{}, {} -> {}", e.when, e.from_addr, e.to_addr);
                self.register_event("ADDRMAP", &msg, ColourHint::White);
            }
            RouterEvent::Ns { entries } => {
                let msg = entries
                    .iter()
                    .map(|ns| format!("{} ({}:{})", ns.nickname, ns.address, ns.or_port))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.register_event("NS", &format!("Listed ({}): {}", entries.len(), msg), ColourHint::Blue);
            }
            RouterEvent::NewConsensus { entries } => {
                if self.is_subscribed("NEWCONSENSUS") {
                    let msg = entries
                        .iter()
                        .map(|ns| format!("{} ({}:{})", ns.nickname, ns.address, ns.or_port))
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.register_event(
                        "NEWCONSENSUS",
                        &format!("Listed ({}): {}", entries.len(), msg),
                        ColourHint::Magenta,
                    );
                }
            }
            RouterEvent::Message(m) => {
                self.register_event(m.level.as_str(), &m.message, runlevel_colour(m.level));
            }
            RouterEvent::Unknown { raw } => {
                if self.is_subscribed("UNKNOWN") {
                    self.register_event("UNKNOWN", raw, ColourHint::Red);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel_with(events: &[&str]) -> LogPanel {
        LogPanel::new(events.iter().map(|e| e.to_string()).collect())
    }

    #[test]
    fn register_event_prepends_and_bounds_buffer() {
        let panel = panel_with(&[]);
        for i in 0..(MAX_LOG_ENTRIES + 10) {
            panel.register_event("NOTICE", &format!("line {i}"), ColourHint::Green);
        }
        let inner = panel.inner.lock().unwrap();
        assert_eq!(inner.visible.len(), MAX_LOG_ENTRIES);
        assert!(inner.visible.front().unwrap().text.contains(&format!("line {}", MAX_LOG_ENTRIES + 9)));
    }

    #[test]
    fn multiline_message_preserves_order_newest_batch_first() {
        let panel = panel_with(&[]);
        panel.register_event("NOTICE", "first\nsecond\nthird", ColourHint::Green);
        let inner = panel.inner.lock().unwrap();
        assert_eq!(inner.visible.len(), 3);
        assert!(inner.visible[0].text.ends_with("first"));
        assert!(inner.visible[1].text.ends_with("second"));
        assert!(inner.visible[2].text.ends_with("third"));
    }

    #[test]
    fn pause_buffers_separately_then_merges_on_resume() {
        let panel = panel_with(&[]);
        panel.register_event("NOTICE", "before pause", ColourHint::Green);
        panel.set_paused(true);
        panel.register_event("NOTICE", "during pause", ColourHint::Green);
        {
            let inner = panel.inner.lock().unwrap();
            assert_eq!(inner.visible.len(), 1);
            assert_eq!(inner.staging.len(), 1);
        }
        panel.set_paused(false);
        let inner = panel.inner.lock().unwrap();
        assert_eq!(inner.visible.len(), 2);
        assert!(inner.visible[0].text.ends_with("during pause"));
        assert!(inner.visible[1].text.ends_with("before pause"));
    }

    #[test]
    fn toggling_to_same_pause_state_is_a_no_op() {
        let panel = panel_with(&[]);
        panel.register_event("NOTICE", "entry", ColourHint::Green);
        panel.set_paused(false);
        let inner = panel.inner.lock().unwrap();
        assert_eq!(inner.visible.len(), 1);
    }

    #[test]
    fn filter_skips_non_matching_entries_without_mutating_buffer() {
        let panel = panel_with(&[]);
        panel.register_event("NOTICE", "apple", ColourHint::Green);
        panel.register_event("NOTICE", "banana", ColourHint::Green);
        panel.set_filter(Some(Regex::new("banana").unwrap()));
        assert_eq!(panel.display_length(200), 1);
        assert_eq!(panel.inner.lock().unwrap().visible.len(), 2);
    }

    #[test]
    fn wrapped_entries_count_twice_in_display_length() {
        let panel = panel_with(&[]);
        panel.register_event("NOTICE", &"x".repeat(100), ColourHint::Green);
        assert_eq!(panel.display_length(20), 2);
    }

    #[test]
    fn bandwidth_event_gated_by_subscription() {
        let panel = panel_with(&["NOTICE"]);
        panel.on_event(&RouterEvent::Bandwidth(crate::events::BandwidthEvent { read: 10, written: 20 }));
        assert!(panel.inner.lock().unwrap().visible.is_empty());

        let panel = panel_with(&["BW"]);
        panel.on_event(&RouterEvent::Bandwidth(crate::events::BandwidthEvent { read: 10, written: 20 }));
        assert_eq!(panel.inner.lock().unwrap().visible.len(), 1);
    }

    #[test]
    fn ns_event_always_logs_regardless_of_subscription() {
        let panel = panel_with(&[]);
        panel.on_event(&RouterEvent::Ns { entries: Vec::new() });
        assert_eq!(panel.inner.lock().unwrap().visible.len(), 1);
    }
}
