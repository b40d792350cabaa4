//! QueryContext carries per-query environment down the pattern tree.
//!
//! A context is created once per top-level query and then only ever
//! extended by copy: children that need different values build a new
//! context, so the one a sibling holds is never affected.

use crate::event::Location;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Cycles per second, as `ContextValue::Number`.
pub const CPS: &str = "cps";
/// Base random seed, as `ContextValue::Int`.
pub const SEED: &str = "seed";
/// Wall-clock source, as `ContextValue::Clock`.
pub const CLOCK: &str = "clock";
/// Call-site chain, as `ContextValue::Locations`.
pub const CALL_SITE: &str = "callsite";

/// A source of wall-clock time.
pub trait WallClock: Send + Sync {
    /// Seconds since the UNIX epoch.
    fn now(&self) -> f64;
}

/// The operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub f64);

impl WallClock for FixedClock {
    fn now(&self) -> f64 {
        self.0
    }
}

/// A value stored in a context.
#[derive(Clone)]
pub enum ContextValue {
    Number(f64),
    Int(i64),
    Text(String),
    Bool(bool),
    Clock(Arc<dyn WallClock>),
    Locations(Vec<Location>),
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Number(n) => write!(f, "Number({})", n),
            ContextValue::Int(n) => write!(f, "Int({})", n),
            ContextValue::Text(s) => write!(f, "Text({:?})", s),
            ContextValue::Bool(b) => write!(f, "Bool({})", b),
            ContextValue::Clock(_) => write!(f, "Clock(..)"),
            ContextValue::Locations(locs) => write!(f, "Locations({:?})", locs),
        }
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Number(n)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Int(n)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Text(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Text(s)
    }
}

impl From<Arc<dyn WallClock>> for ContextValue {
    fn from(clock: Arc<dyn WallClock>) -> Self {
        ContextValue::Clock(clock)
    }
}

/// Immutable key/value bag threaded through every query.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    values: Arc<HashMap<String, ContextValue>>,
}

impl QueryContext {
    /// The empty context.
    pub fn empty() -> Self {
        QueryContext::default()
    }

    pub fn builder() -> QueryContextBuilder {
        QueryContextBuilder::default()
    }

    /// A new context with `key` set; `self` is unchanged.
    pub fn with(&self, key: &str, value: impl Into<ContextValue>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.to_string(), value.into());
        QueryContext {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cycles per second, if known.
    pub fn cps(&self) -> Option<f64> {
        match self.get(CPS)? {
            ContextValue::Number(n) => Some(*n),
            ContextValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Base seed for deterministic randomness; zero when unset.
    pub fn seed(&self) -> u64 {
        match self.get(SEED) {
            Some(ContextValue::Int(n)) => *n as u64,
            Some(ContextValue::Number(n)) => n.to_bits(),
            _ => 0,
        }
    }

    pub fn clock(&self) -> Option<Arc<dyn WallClock>> {
        match self.get(CLOCK)? {
            ContextValue::Clock(clock) => Some(Arc::clone(clock)),
            _ => None,
        }
    }

    /// The call-site chain, innermost last.
    pub fn call_site(&self) -> &[Location] {
        match self.get(CALL_SITE) {
            Some(ContextValue::Locations(locs)) => locs,
            _ => &[],
        }
    }

    /// A new context whose call-site chain ends with `location`.
    pub fn with_call_site(&self, location: Location) -> Self {
        let mut chain = self.call_site().to_vec();
        chain.push(location);
        self.with(CALL_SITE, ContextValue::Locations(chain))
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            ContextValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Builds a [`QueryContext`] in one go.
#[derive(Debug, Default)]
pub struct QueryContextBuilder {
    values: HashMap<String, ContextValue>,
}

impl QueryContextBuilder {
    pub fn set(mut self, key: &str, value: impl Into<ContextValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> QueryContext {
        QueryContext {
            values: Arc::new(self.values),
        }
    }
}
