//! Typed key-value store for ruleset-specific game state.
//!
//! Rulesets keep counters, flags, decks, and notes in a free-form meta
//! area. Instead of an untyped dictionary, every entry is a [`MetaValue`]
//! drawn from a closed set of shapes, and a ruleset may declare a
//! [`MetaSchema`] pinning specific keys to specific shapes.
//!
//! The [`MetaValue::Blob`] variant is the escape hatch for ruleset-private
//! data that does not fit any structured shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An ordered map of meta entries.
pub type MetaMap = BTreeMap<String, MetaValue>;

/// A single meta entry.
///
/// Serialized untagged so spec files and oracle deltas read as plain JSON:
/// `3`, `true`, `"Imp"`, `["a", "b"]`, `{"P1": 2}`. Values that fit no
/// structured shape (floats, `null`, mixed arrays) land in [`Self::Blob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// A signed integer counter.
    Int(i64),
    /// A boolean flag.
    Bool(bool),
    /// A text value.
    Str(String),
    /// An ordered list of strings (decks, name lists).
    List(Vec<String>),
    /// A nested map.
    Map(BTreeMap<String, MetaValue>),
    /// Opaque data the engine never interprets.
    Blob(serde_json::Value),
}

impl MetaValue {
    /// The shape of this value.
    pub const fn kind(&self) -> MetaKind {
        match self {
            Self::Int(_) => MetaKind::Int,
            Self::Bool(_) => MetaKind::Bool,
            Self::Str(_) => MetaKind::Str,
            Self::List(_) => MetaKind::List,
            Self::Map(_) => MetaKind::Map,
            Self::Blob(_) => MetaKind::Blob,
        }
    }

    /// Integer view used by the victory counters.
    ///
    /// Booleans count as `0`/`1`; every other shape is not a scalar.
    pub const fn as_counter(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Borrow the string list, if this is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the text, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// The shape of a meta entry, used in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaKind {
    /// Signed integer.
    Int,
    /// Boolean flag.
    Bool,
    /// Text.
    Str,
    /// List of strings.
    List,
    /// Nested map.
    Map,
    /// Opaque blob; a schema entry of this kind accepts any value.
    Blob,
}

/// A declared mismatch between a meta entry and its schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("meta key `{key}` must be {expected:?}, got {found:?}")]
pub struct SchemaViolation {
    /// The offending key.
    pub key: String,
    /// The kind the schema declares.
    pub expected: MetaKind,
    /// The kind that was supplied.
    pub found: MetaKind,
}

/// Per-ruleset declaration of meta key shapes.
///
/// Keys not mentioned in the schema are free-form and accept any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSchema {
    fields: BTreeMap<String, MetaKind>,
}

impl MetaSchema {
    /// An empty schema that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `key` to hold values of `kind`.
    #[must_use]
    pub fn field(mut self, key: &str, kind: MetaKind) -> Self {
        self.fields.insert(key.to_owned(), kind);
        self
    }

    /// Declare `key` in place.
    pub fn declare(&mut self, key: &str, kind: MetaKind) {
        self.fields.insert(key.to_owned(), kind);
    }

    /// The declared kind for `key`, if any.
    pub fn kind_of(&self, key: &str) -> Option<MetaKind> {
        self.fields.get(key).copied()
    }

    /// Check one entry against the schema.
    pub fn check(&self, key: &str, value: &MetaValue) -> Result<(), SchemaViolation> {
        match self.kind_of(key) {
            None | Some(MetaKind::Blob) => Ok(()),
            Some(expected) if expected == value.kind() => Ok(()),
            Some(expected) => Err(SchemaViolation {
                key: key.to_owned(),
                expected,
                found: value.kind(),
            }),
        }
    }

    /// Check every entry of a map, collecting all violations.
    pub fn validate(&self, meta: &MetaMap) -> Vec<SchemaViolation> {
        meta.iter()
            .filter_map(|(key, value)| self.check(key, value).err())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_lands_in_expected_shapes() {
        let meta: MetaMap = serde_json::from_str(
            r#"{"n": 3, "flag": true, "who": "Imp", "deck": ["a","b"],
                "poisoned": {"P1": 2}, "ratio": 0.5, "none": null}"#,
        )
        .unwrap();

        assert_eq!(meta.get("n"), Some(&MetaValue::Int(3)));
        assert_eq!(meta.get("flag"), Some(&MetaValue::Bool(true)));
        assert_eq!(meta.get("who").and_then(MetaValue::as_str), Some("Imp"));
        assert_eq!(meta.get("deck").map(MetaValue::kind), Some(MetaKind::List));
        assert_eq!(meta.get("poisoned").map(MetaValue::kind), Some(MetaKind::Map));
        assert_eq!(meta.get("ratio").map(MetaValue::kind), Some(MetaKind::Blob));
        assert_eq!(meta.get("none").map(MetaValue::kind), Some(MetaKind::Blob));
    }

    #[test]
    fn counters_include_bools() {
        assert_eq!(MetaValue::Bool(true).as_counter(), Some(1));
        assert_eq!(MetaValue::Bool(false).as_counter(), Some(0));
        assert_eq!(MetaValue::Int(-4).as_counter(), Some(-4));
        assert_eq!(MetaValue::from("x").as_counter(), None);
    }

    #[test]
    fn schema_rejects_wrong_kind_and_accepts_undeclared() {
        let schema = MetaSchema::new()
            .field("slayer_used", MetaKind::Bool)
            .field("notes", MetaKind::Blob);

        assert!(schema.check("slayer_used", &MetaValue::Bool(true)).is_ok());
        assert!(schema.check("notes", &MetaValue::Int(1)).is_ok());
        assert!(schema.check("anything", &MetaValue::Int(1)).is_ok());

        let err = schema.check("slayer_used", &MetaValue::Int(1)).unwrap_err();
        assert_eq!(err.expected, MetaKind::Bool);
        assert_eq!(err.found, MetaKind::Int);
    }

    #[test]
    fn validate_collects_every_violation() {
        let schema = MetaSchema::new()
            .field("a", MetaKind::Int)
            .field("b", MetaKind::List);
        let mut meta = MetaMap::new();
        meta.insert("a".to_owned(), MetaValue::from("nope"));
        meta.insert("b".to_owned(), MetaValue::Int(2));
        meta.insert("c".to_owned(), MetaValue::Int(2));

        assert_eq!(schema.validate(&meta).len(), 2);
    }
}
