//! Seeds historical log entries from an on-disk log file tail, grounded
//! directly in the original `loadLog`/pre-population routine.

use std::path::{Path, PathBuf};

use super::{ColourHint, LogPanel};
use crate::controller::Controller;

/// Tails and parses the router's on-disk log file to seed historical
/// entries into `panel`, pausing it for the duration of the batch and
/// restoring its prior state afterward. Every failure mode (no `Log file`
/// config entry, unreadable path, malformed lines) is swallowed: this is
/// best-effort seeding and must never block startup.
pub fn prepopulate(controller: &Controller, panel: &LogPanel, path_prefix: &Path) {
    let _ = try_prepopulate(controller, panel, path_prefix);
}

fn try_prepopulate(controller: &Controller, panel: &LogPanel, path_prefix: &Path) -> Option<()> {
    let log_entries = controller.get_option("Log", None, true, true).ok()?;
    let raw_path = log_entries.iter().find_map(|entry| {
        let tokens: Vec<&str> = entry.split_whitespace().collect();
        if tokens.len() >= 3 && tokens[1] == "file" {
            Some(tokens[2].to_string())
        } else {
            None
        }
    })?;

    let path = if Path::new(&raw_path).is_absolute() {
        PathBuf::from(&raw_path)
    } else {
        path_prefix.join(&raw_path)
    };

    let subscribed = panel.logged_events();
    let limit = if subscribed.contains("DEBUG") || subscribed.contains("INFO") {
        1_000
    } else {
        5_000
    };

    let lines = tail_lines(&path, limit)?;
    let start = lines
        .iter()
        .rposition(|l| l.contains("opening log file"))
        .map(|i| i + 1)
        .unwrap_or(0);

    let previous_pause_state = panel.is_paused();
    panel.set_paused(true);
    for line in &lines[start..] {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            continue;
        }
        let event_name = tokens[3].trim_start_matches('[').trim_end_matches(']').to_uppercase();
        if !subscribed.contains(&event_name) {
            continue;
        }
        let Some(timestamp) = parse_hms(tokens[2]) else { continue };
        panel.set_event_time_override(Some(timestamp));
        panel.register_event(&event_name, line, ColourHint::White);
    }
    panel.set_event_time_override(None);
    panel.set_paused(previous_pause_state);
    Some(())
}

/// Parses a `HH:MM:SS.fff` timestamp field, dropping the fractional part.
fn parse_hms(field: &str) -> Option<(u8, u8, u8)> {
    let time_part = field.split('.').next()?;
    let mut parts = time_part.split(':');
    let h: u8 = parts.next()?.parse().ok()?;
    let m: u8 = parts.next()?.parse().ok()?;
    let s: u8 = parts.next()?.parse().ok()?;
    Some((h, m, s))
}

fn tail_lines(path: &Path, limit: usize) -> Option<Vec<String>> {
    let contents = std::fs::read_to_string(path).ok()?;
    let all: Vec<String> = contents.lines().map(str::to_string).collect();
    let start = all.len().saturating_sub(limit);
    Some(all[start..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::config::Config;
    use crate::controller::{ControlConnection, Controller, EventListener};
    use crate::error::ConnectionError;

    #[test]
    fn parse_hms_drops_fractional_seconds() {
        assert_eq!(parse_hms("14:22:07.412"), Some((14, 22, 7)));
    }

    #[test]
    fn parse_hms_rejects_malformed_field() {
        assert_eq!(parse_hms("not-a-time"), None);
    }

    #[test]
    fn tail_lines_truncates_to_limit() {
        let dir = std::env::temp_dir().join("torwatch-prepopulate-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tor.log");
        let contents: String = (0..10).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, contents).unwrap();

        let tail = tail_lines(&path, 3).unwrap();
        assert_eq!(tail, vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn tail_lines_missing_file_is_none() {
        assert!(tail_lines(Path::new("/nonexistent/path/tor.log"), 10).is_none());
    }

    struct FakeConnection {
        live: AtomicBool,
        log_file: String,
    }

    impl ControlConnection for FakeConnection {
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }

        fn close(&self) {
            self.live.store(false, Ordering::SeqCst);
        }

        fn get_info(&self, _key: &str) -> Result<Option<String>, ConnectionError> {
            Ok(None)
        }

        fn get_option(&self, key: &str) -> Result<Vec<(String, String)>, ConnectionError> {
            if key == "Log" {
                Ok(vec![("Log".to_string(), self.log_file.clone())])
            } else {
                Ok(Vec::new())
            }
        }

        fn set_events(&self, _events: &[String]) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn send_signal(&self, _name: &str) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn add_event_listener(&self, _listener: Arc<dyn EventListener>) {}
    }

    #[test]
    fn restores_prior_pause_state_instead_of_forcing_unpaused() {
        let dir = std::env::temp_dir().join("torwatch-prepopulate-pause-test");
        std::fs::create_dir_all(&dir).unwrap();
        let log_path = dir.join("tor.log");
        std::fs::write(
            &log_path,
            "Jan 01 00:00:00.000 [notice] opening log file\nJan 01 00:00:01.000 [notice] hello\n",
        )
        .unwrap();

        let controller = Controller::new(Config::default());
        let conn = Arc::new(FakeConnection {
            live: AtomicBool::new(true),
            log_file: format!("notice file {}", log_path.display()),
        });
        controller.init(conn).unwrap();

        let panel = LogPanel::new(HashSet::from(["NOTICE".to_string()]));
        panel.set_paused(true);

        prepopulate(&controller, &panel, Path::new(""));

        assert!(panel.is_paused());
    }
}
