//! Validated SQL identifiers
//!
//! Table names end up interpolated into generated statements (`DELETE FROM`,
//! `COPY`, `SELECT COUNT(*)`), so they are restricted to plain identifiers with
//! an optional schema qualifier.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A table name of the form `name` or `schema.name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Parse and validate an identifier
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() > 2 || !parts.iter().all(|p| is_plain(p)) {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a valid table identifier",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Unquoted name as written
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form, each part quoted separately (`"public"."time"`)
    ///
    /// Quoting keeps reserved words such as `time` and `users` usable as table
    /// names on every supported dialect.
    pub fn quoted(&self) -> String {
        self.0
            .split('.')
            .map(|p| format!("\"{}\"", p))
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn is_plain(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Identifier::parse(&value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Identifier::parse(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_qualified_names() {
        assert_eq!(Identifier::parse("songplays").unwrap().as_str(), "songplays");
        assert_eq!(
            Identifier::parse("public.staging_events").unwrap().quoted(),
            "\"public\".\"staging_events\""
        );
        assert_eq!(Identifier::parse("time").unwrap().quoted(), "\"time\"");
    }

    #[test]
    fn test_rejects_injection_and_malformed_names() {
        for raw in [
            "",
            "1users",
            "users; DROP TABLE songs",
            "a.b.c",
            "users.",
            "\"users\"",
            "user-name",
        ] {
            assert!(Identifier::parse(raw).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_deserializes_through_validation() {
        #[derive(Deserialize)]
        struct Row {
            table: Identifier,
        }

        let ok: Row = toml::from_str("table = \"artists\"").unwrap();
        assert_eq!(ok.table.as_str(), "artists");

        let bad = toml::from_str::<Row>("table = \"artists where 1=1\"");
        assert!(bad.is_err());
    }
}
