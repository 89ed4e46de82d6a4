use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request correlation identifier.
///
/// Only the canonical 36-character hyphenated form is accepted; braced,
/// simple, and urn forms are rejected so the value can be echoed verbatim
/// into headers and log fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new random correlation id.
    pub fn generate() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }

    /// Validate and wrap an incoming header value.
    pub fn parse(value: &str) -> Result<Self, InvalidCorrelationId> {
        if !is_canonical(value) {
            return Err(InvalidCorrelationId(value.to_owned()));
        }
        Uuid::parse_str(value).map_err(|_| InvalidCorrelationId(value.to_owned()))?;
        Ok(CorrelationId(value.to_owned()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The carried id, or a freshly generated one.
    pub fn or_generate(existing: Option<CorrelationId>) -> CorrelationId {
        existing.unwrap_or_else(CorrelationId::generate)
    }

    /// The carried id's string form, or `""` when absent.
    pub fn or_empty(existing: Option<&CorrelationId>) -> &str {
        existing.map(CorrelationId::as_str).unwrap_or_default()
    }
}

fn is_canonical(value: &str) -> bool {
    if value.len() != 36 {
        return false;
    }
    value.bytes().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = InvalidCorrelationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CorrelationId::parse(s)
    }
}

/// The value did not match the canonical hyphenated UUID form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid correlation id: {0:?}")]
pub struct InvalidCorrelationId(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_uuids() {
        let id = CorrelationId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.as_str(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn rejects_non_canonical_forms() {
        for bad in [
            "",
            "not-a-uuid",
            "550e8400e29b41d4a716446655440000",
            "{550e8400-e29b-41d4-a716-446655440000}",
            "550e8400-e29b-41d4-a716-44665544000g",
            "urn:uuid:550e8400-e29b-41d4-a716-446655440000",
        ] {
            assert!(CorrelationId::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn generated_ids_validate() {
        let id = CorrelationId::generate();
        assert!(CorrelationId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn context_helpers() {
        let id = CorrelationId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(CorrelationId::or_generate(Some(id.clone())), id);
        assert!(CorrelationId::parse(CorrelationId::or_generate(None).as_str()).is_ok());
        assert_eq!(CorrelationId::or_empty(Some(&id)), id.as_str());
        assert_eq!(CorrelationId::or_empty(None), "");
    }
}
