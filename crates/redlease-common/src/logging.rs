//! Logger port
//!
//! Lock operations log through an injected [`Logger`] instead of a
//! process-wide default, so callers decide where lock diagnostics go:
//!
//! | Backend           | Use                                              |
//! |-------------------|--------------------------------------------------|
//! | `TracingLogger`   | forwards to `tracing` events (target `redlease`) |
//! | `NopLogger`       | discards everything, the default                 |
//! | `RecordingLogger` | keeps entries in memory for assertions           |
//!
//! `TracingLogger` emits `action`, `key`, `token` and `error` as event fields
//! and folds any other field into a single `fields` attribute.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use parking_lot::Mutex;

/// Target used for every event emitted by [`TracingLogger`]
pub const LOG_TARGET: &str = "redlease";

/// A key/value pair attached to a log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub value: String,
}

impl Field {
    pub fn new(key: &'static str, value: impl Display) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Error,
}

/// Structured, leveled logger with sub-logger derivation
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, fields: &[Field]);

    fn error(&self, message: &str, fields: &[Field]);

    /// Derive a logger that attaches `fields` to every entry
    fn with_fields(&self, fields: Vec<Field>) -> Arc<dyn Logger>;
}

/// Keys emitted as their own `tracing` fields, so subscribers can filter on
/// them; every other field is rendered into the `fields` attribute
const PROMOTED_KEYS: [&str; 4] = ["action", "key", "token", "error"];

/// Fields of one entry: the logger's attached fields, then the call's
#[derive(Clone, Copy)]
struct EntryFields<'a> {
    attached: &'a [Field],
    call: &'a [Field],
}

impl<'a> EntryFields<'a> {
    fn iter(self) -> impl DoubleEndedIterator<Item = &'a Field> {
        self.attached.iter().chain(self.call.iter())
    }

    /// Last value given for `key`
    fn get(self, key: &str) -> Option<&'a str> {
        self.iter()
            .rev()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }
}

/// Renders the non-promoted fields as `k1=v1 k2=v2`
impl Display for EntryFields<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rest = self.iter().filter(|field| !PROMOTED_KEYS.contains(&field.key));
        for (i, field) in rest.enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}={}", field.key, field.value)?;
        }
        Ok(())
    }
}

/// Logger backed by `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    fields: Vec<Field>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TracingLogger {
    fn entry<'a>(&'a self, fields: &'a [Field]) -> EntryFields<'a> {
        EntryFields {
            attached: &self.fields,
            call: fields,
        }
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str, fields: &[Field]) {
        let entry = self.entry(fields);
        tracing::debug!(
            target: LOG_TARGET,
            action = entry.get("action"),
            key = entry.get("key"),
            token = entry.get("token"),
            error = entry.get("error"),
            fields = %entry,
            "{}",
            message
        );
    }

    fn error(&self, message: &str, fields: &[Field]) {
        let entry = self.entry(fields);
        tracing::error!(
            target: LOG_TARGET,
            action = entry.get("action"),
            key = entry.get("key"),
            token = entry.get("token"),
            error = entry.get("error"),
            fields = %entry,
            "{}",
            message
        );
    }

    fn with_fields(&self, fields: Vec<Field>) -> Arc<dyn Logger> {
        let mut merged = self.fields.clone();
        merged.extend(fields);
        Arc::new(TracingLogger { fields: merged })
    }
}

/// Logger that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn debug(&self, _message: &str, _fields: &[Field]) {}

    fn error(&self, _message: &str, _fields: &[Field]) {}

    fn with_fields(&self, _fields: Vec<Field>) -> Arc<dyn Logger> {
        Arc::new(NopLogger)
    }
}

/// A captured log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Vec<Field>,
}

impl Record {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }
}

/// Logger that keeps every entry in memory.
///
/// Derived loggers share the same buffer, so entries written through a
/// sub-logger are visible from the root.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    fields: Vec<Field>,
    records: Arc<Mutex<Vec<Record>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn records_at(&self, level: Level) -> Vec<Record> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }

    /// True if some entry at `level` has a message containing `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    fn push(&self, level: Level, message: &str, fields: &[Field]) {
        let mut all = self.fields.clone();
        all.extend_from_slice(fields);
        self.records.lock().push(Record {
            level,
            message: message.to_string(),
            fields: all,
        });
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str, fields: &[Field]) {
        self.push(Level::Debug, message, fields);
    }

    fn error(&self, message: &str, fields: &[Field]) {
        self.push(Level::Error, message, fields);
    }

    fn with_fields(&self, fields: Vec<Field>) -> Arc<dyn Logger> {
        let mut merged = self.fields.clone();
        merged.extend(fields);
        Arc::new(RecordingLogger {
            fields: merged,
            records: self.records.clone(),
        })
    }
}
