use std::borrow::Cow;
use std::cmp::Ordering;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Describes the relationship between the span and its caller.
#[derive(Clone, Debug, PartialEq, Eq, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Operation internal to an application.
    Internal,
    /// Outbound request to some remote service.
    Client,
    /// Handling of an inbound request.
    Server,
    /// Message sent to a broker or queue.
    Producer,
    /// Message received from a broker or queue.
    Consumer,
}

impl SpanKind {
    /// Stable lowercase name, used in storage and wire representations.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Internal => "internal",
            SpanKind::Client => "client",
            SpanKind::Server => "server",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
        }
    }

    /// Parse a stored kind name. Unknown names map to `Internal`.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "client" => SpanKind::Client,
            "server" => SpanKind::Server,
            "producer" => SpanKind::Producer,
            "consumer" => SpanKind::Consumer,
            _ => SpanKind::Internal,
        }
    }
}

/// The outcome of the operation a span describes.
///
/// Statuses form a total order `Ok > Error > Unset`; a status can only be
/// upgraded, so an `Ok` set by the application wins over a transport-level
/// `Error` recorded earlier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "code", content = "message")]
pub enum Status {
    /// The default status.
    #[default]
    Unset,
    /// The operation failed.
    Error(String),
    /// The operation completed successfully.
    Ok,
}

impl Status {
    /// Construct an error status with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Status::Error(message.into())
    }

    /// Stable lowercase status code for storage.
    pub fn code(&self) -> &'static str {
        match self {
            Status::Unset => "unset",
            Status::Error(_) => "error",
            Status::Ok => "ok",
        }
    }

    /// The status message, non-empty only for errors.
    pub fn message(&self) -> &str {
        match self {
            Status::Error(message) => message,
            _ => "",
        }
    }

    fn priority(&self) -> u8 {
        match self {
            Status::Unset => 0,
            Status::Error(_) => 1,
            Status::Ok => 2,
        }
    }
}

impl PartialOrd for Status {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.priority().cmp(&other.priority()))
    }
}

/// A timestamped record attached to a span.
///
/// Ordering within a span is by timestamp, ties broken by insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    pub name: Cow<'static, str>,
    /// Event timestamp
    pub timestamp: SystemTime,
    /// Event attributes
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// Create a new event.
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
        }
    }

    /// Create a new event without attributes.
    pub fn with_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        Event {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_allows_only_upgrades() {
        assert!(Status::Ok > Status::error("boom"));
        assert!(Status::error("boom") > Status::Unset);
        assert!(Status::Ok > Status::Unset);
        assert!(!(Status::Unset > Status::error("boom")));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            SpanKind::Internal,
            SpanKind::Client,
            SpanKind::Server,
            SpanKind::Producer,
            SpanKind::Consumer,
        ] {
            assert_eq!(SpanKind::from_str_lossy(kind.as_str()), kind);
        }
        assert_eq!(SpanKind::from_str_lossy("mystery"), SpanKind::Internal);
    }
}
