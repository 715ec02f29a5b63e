//! # Cloneable error snapshots.
//!
//! Coalesced failures are handed to every subscriber, so the error type must be `Clone`.
//! Operations whose native error is not (e.g. `std::io::Error`) can map it into an
//! [`ErrorSnapshot`], a tagged copy that keeps the error's kind, message, source chain,
//! and any extra properties the caller attaches.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Tagged, cloneable copy of an error.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorSnapshot {
    kind: String,
    message: String,
    stack: Vec<String>,
    properties: BTreeMap<String, Value>,
}

impl ErrorSnapshot {
    /// Creates a snapshot from its parts.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Captures `err`: its type name as `kind`, its `Display` as `message`, and the
    /// rendered `source()` chain as `stack`.
    ///
    /// # Example
    /// ```
    /// use corral::ErrorSnapshot;
    ///
    /// let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such user");
    /// let snap = ErrorSnapshot::capture(&err).with_property("user", 7);
    ///
    /// assert!(snap.kind().starts_with("std::io"));
    /// assert_eq!(snap.message(), "no such user");
    /// assert_eq!(snap.property("user"), Some(&serde_json::json!(7)));
    /// assert_eq!(snap.clone(), snap);
    /// ```
    pub fn capture<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            stack,
            properties: BTreeMap::new(),
        }
    }

    /// Attaches an extra property. Values that fail to serialize are stored as `null`.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.properties.insert(name.into(), value);
        self
    }

    /// Type tag of the original error.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Message of the original error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages of the original error's causes, outermost first.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Extra property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// All extra properties.
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }
}

impl fmt::Display for ErrorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ErrorSnapshot {}
