//! Configuration keys recognized by the core: a small typed settings bag
//! loaded once at construction, not hot-reloaded.

use std::path::{Path, PathBuf};

use crate::events::Runlevel;

/// Typed configuration consumed by the controller and pre-populator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path prefix for reading router resources (e.g. the log file tailed
    /// by pre-population). Empty means "no prefix".
    pub path_prefix: PathBuf,
    /// Severity at which control-port closure is reported.
    pub log_tor_ctl_port_closed: Runlevel,
    /// Severity for per-`GETINFO` tracing.
    pub log_tor_get_info: Runlevel,
    /// Severity for per-`GETCONF` tracing.
    pub log_tor_get_conf: Runlevel,
    /// Severity for an invalid `features.pathPrefix`.
    pub log_tor_prefix_path_invalid: Runlevel,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path_prefix: PathBuf::new(),
            log_tor_ctl_port_closed: Runlevel::Notice,
            log_tor_get_info: Runlevel::Debug,
            log_tor_get_conf: Runlevel::Debug,
            log_tor_prefix_path_invalid: Runlevel::Notice,
        }
    }
}

impl Config {
    /// Builds a config from a raw `features.pathPrefix` value, validating it
    /// the way `loadConfig` does: strip a trailing slash, then blank it and
    /// log at [`Config::log_tor_prefix_path_invalid`] if the result doesn't
    /// exist on disk.
    pub fn with_path_prefix(raw_prefix: &str) -> Self {
        let mut config = Config::default();
        config.set_path_prefix(raw_prefix);
        config
    }

    pub fn set_path_prefix(&mut self, raw_prefix: &str) {
        let mut prefix = raw_prefix.trim();
        if let Some(stripped) = prefix.strip_suffix('/') {
            prefix = stripped;
        }

        if prefix.is_empty() {
            self.path_prefix = PathBuf::new();
            return;
        }

        if Path::new(prefix).exists() {
            self.path_prefix = PathBuf::from(prefix);
        } else {
            log::log!(
                runlevel_to_log_level(self.log_tor_prefix_path_invalid),
                "the prefix path set in your config ({prefix}) doesn't exist"
            );
            self.path_prefix = PathBuf::new();
        }
    }
}

/// Maps this crate's [`Runlevel`] onto the `log` facade's severity enum, so
/// config-driven severities can be emitted through the same logging
/// infrastructure the rest of the crate uses.
pub fn runlevel_to_log_level(level: Runlevel) -> log::Level {
    match level {
        Runlevel::Debug => log::Level::Debug,
        Runlevel::Info => log::Level::Info,
        Runlevel::Notice => log::Level::Info,
        Runlevel::Warn => log::Level::Warn,
        Runlevel::Err => log::Level::Error,
    }
}
