//! Keyed store of relay-identity facts with a sentinel for "looked up,
//! undefined" distinct from "not yet looked up".

use std::collections::HashMap;

/// Every value this crate ever caches, grouped by shape rather than stored as
/// untyped strings (the original source keeps everything as strings and uses
/// `"UNKNOWN"`/`""` as sentinels, which is fragile: a legitimate value that
/// happens to equal the sentinel string is indistinguishable from "unset").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Text(String),
    Lines(Vec<String>),
    Number(i64),
    List(Vec<String>),
}

impl CachedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CachedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_lines(&self) -> Option<&[String]> {
        match self {
            CachedValue::Lines(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            CachedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            CachedValue::List(v) => Some(v),
            _ => None,
        }
    }
}

/// The fixed set of cacheable query keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Version,
    ConfigFile,
    ExitPolicyDefault,
    Fingerprint,
    ConfigNames,
    InfoNames,
    FeaturesNames,
    EventsNames,
    NsEntry,
    DescEntry,
    BwRate,
    BwBurst,
    BwObserved,
    BwMeasured,
    Flags,
    Pid,
}

impl CacheKey {
    /// The literal `GETINFO` parameter name this key caches, where one
    /// exists (the relay-attribute keys are synthesized, not direct
    /// `GETINFO` results, so they return `None`).
    pub fn getinfo_param(self) -> Option<&'static str> {
        match self {
            CacheKey::Version => Some("version"),
            CacheKey::ConfigFile => Some("config-file"),
            CacheKey::ExitPolicyDefault => Some("exit-policy/default"),
            CacheKey::Fingerprint => Some("fingerprint"),
            CacheKey::ConfigNames => Some("config/names"),
            CacheKey::InfoNames => Some("info/names"),
            CacheKey::FeaturesNames => Some("features/names"),
            CacheKey::EventsNames => Some("events/names"),
            _ => None,
        }
    }

    pub fn from_getinfo_param(param: &str) -> Option<CacheKey> {
        match param {
            "version" => Some(CacheKey::Version),
            "config-file" => Some(CacheKey::ConfigFile),
            "exit-policy/default" => Some(CacheKey::ExitPolicyDefault),
            "fingerprint" => Some(CacheKey::Fingerprint),
            "config/names" => Some(CacheKey::ConfigNames),
            "info/names" => Some(CacheKey::InfoNames),
            "features/names" => Some(CacheKey::FeaturesNames),
            "events/names" => Some(CacheKey::EventsNames),
            _ => None,
        }
    }
}

/// A cache slot's state: absent (never looked up), undefined (looked up, no
/// answer), or present with a value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Undefined,
    Present(CachedValue),
}

/// The Controller's relay-identity fact cache. Not internally synchronized;
/// callers hold it behind the controller's own reentrant lock, matching the
/// original source's single lock guarding cache reads and writes together.
#[derive(Debug, Default)]
pub struct Cache {
    slots: HashMap<CacheKey, Slot>,
}

/// Outcome of a cache lookup: distinguishes "looked up and empty" from
/// "never looked up" rather than folding both into one `None`.
pub enum Lookup<'a> {
    Absent,
    Undefined,
    Present(&'a CachedValue),
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: CacheKey) -> Lookup<'_> {
        match self.slots.get(&key) {
            None => Lookup::Absent,
            Some(Slot::Undefined) => Lookup::Undefined,
            Some(Slot::Present(v)) => Lookup::Present(v),
        }
    }

    pub fn set_present(&mut self, key: CacheKey, value: CachedValue) {
        self.slots.insert(key, Slot::Present(value));
    }

    pub fn set_undefined(&mut self, key: CacheKey) {
        self.slots.insert(key, Slot::Undefined);
    }

    pub fn invalidate(&mut self, key: CacheKey) {
        self.slots.remove(&key);
    }

    pub fn invalidate_all(&mut self, keys: &[CacheKey]) {
        for key in keys {
            self.invalidate(*key);
        }
    }

    /// Clears the entire cache; called on every status transition.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
