use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::hash::Digest;

/// Keys whose values are compared and displayed as sequences even when the
/// extractor reports a single scalar.
pub const DEFAULT_LIST_KEYS: &[&str] = &[
    "PDF:Keywords",
    "XMP:Creator",
    "XMP:Subject",
    "XMP:CrossMarkDomains",
];

/// A single metadata value as reported by the extraction tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn is_nan(&self) -> bool {
        matches!(self, Scalar::Float(f) if f.is_nan())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(_) => None,
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Text(String::new()),
            Value::Bool(b) => Scalar::Text(b.to_string()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Scalar::Integer(i)
                } else if n.is_u64() {
                    Scalar::Text(n.to_string())
                } else {
                    n.as_f64()
                        .map(Scalar::Float)
                        .unwrap_or_else(|| Scalar::Text(n.to_string()))
                }
            }
            Value::String(s) => Scalar::Text(s.clone()),
            other => Scalar::Text(other.to_string()),
        }
    }
}

// Numbers compare by value so that `2020` and `2020.0` from different
// extractors still match.
impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::Integer(i), Scalar::Float(f)) | (Scalar::Float(f), Scalar::Integer(i)) => {
                *i as f64 == *f
            }
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// Tagged metadata value: a scalar, an ordered sequence, or nothing at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum MetaValue {
    Sequence(Vec<Scalar>),
    Scalar(Scalar),
    #[default]
    Missing,
}

impl MetaValue {
    pub fn text(value: impl Into<String>) -> Self {
        MetaValue::Scalar(Scalar::Text(value.into()))
    }

    pub fn sequence<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        MetaValue::Sequence(items.into_iter().map(Into::into).collect())
    }

    /// Convert a JSON value produced by the extraction tool. Nested arrays
    /// and objects inside a sequence are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => MetaValue::Missing,
            Value::Array(items) => MetaValue::Sequence(items.iter().map(Scalar::from_json).collect()),
            other => MetaValue::Scalar(Scalar::from_json(other)),
        }
    }

    /// Missing values and empty sequences carry no information.
    pub fn is_absent(&self) -> bool {
        match self {
            MetaValue::Missing => true,
            MetaValue::Sequence(items) => items.is_empty(),
            MetaValue::Scalar(_) => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            MetaValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Text used for table cells and CSV export. Absent values render as an
    /// empty string, sequences as a JSON array.
    pub fn to_cell(&self) -> String {
        match self {
            MetaValue::Missing => String::new(),
            MetaValue::Sequence(items) if items.is_empty() => String::new(),
            MetaValue::Sequence(items) => serde_json::to_string(items).unwrap_or_default(),
            MetaValue::Scalar(s) => s.to_string(),
        }
    }
}

impl From<Scalar> for MetaValue {
    fn from(value: Scalar) -> Self {
        MetaValue::Scalar(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Scalar(Scalar::Integer(value))
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Scalar(Scalar::Float(value))
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

/// One uploaded file: its name inside the batch, content digest and
/// normalized metadata. Never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub name: String,
    pub hash: Digest,
    pub metadata: Metadata,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, hash: Digest, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            hash,
            metadata,
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    /// Compared as an ordered sequence; scalars are wrapped.
    List,
    /// Compared by scalar equality; null becomes `Missing`.
    Scalar,
}

/// Canonicalizes raw extractor output according to a per-key rule table.
#[derive(Debug, Clone)]
pub struct MetadataNormalizer {
    list_keys: BTreeSet<String>,
}

impl MetadataNormalizer {
    pub fn new<I, S>(list_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            list_keys: list_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rule_for(&self, key: &str) -> KeyRule {
        if self.list_keys.contains(key) {
            KeyRule::List
        } else {
            KeyRule::Scalar
        }
    }

    pub fn normalize_value(&self, key: &str, value: MetaValue) -> MetaValue {
        match (self.rule_for(key), value) {
            (_, MetaValue::Sequence(items)) => MetaValue::Sequence(items),
            (KeyRule::List, MetaValue::Scalar(s)) if s.is_nan() => MetaValue::Sequence(Vec::new()),
            (KeyRule::List, MetaValue::Scalar(s)) => MetaValue::Sequence(vec![s]),
            (KeyRule::List, MetaValue::Missing) => MetaValue::Sequence(Vec::new()),
            (KeyRule::Scalar, MetaValue::Scalar(s)) if s.is_nan() => MetaValue::Missing,
            (KeyRule::Scalar, value) => value,
        }
    }

    /// Normalize every entry. Keys are kept even when their value is
    /// absent so that they still show up as table columns.
    pub fn normalize(&self, raw: Metadata) -> Metadata {
        raw.into_iter()
            .map(|(key, value)| {
                let value = self.normalize_value(&key, value);
                (key, value)
            })
            .collect()
    }

    /// Whether a normalized value takes part in key intersection.
    pub fn is_present(&self, key: &str, value: &MetaValue) -> bool {
        match (self.rule_for(key), value) {
            (_, MetaValue::Missing) => false,
            (KeyRule::List, MetaValue::Sequence(items)) => !items.is_empty(),
            _ => true,
        }
    }
}

impl Default for MetadataNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_LIST_KEYS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn samples() -> Vec<(&'static str, MetaValue)> {
        vec![
            ("PDF:Keywords", MetaValue::text("rust")),
            ("PDF:Keywords", MetaValue::sequence(["a", "b"])),
            ("PDF:Keywords", MetaValue::Missing),
            ("XMP:Subject", MetaValue::from(f64::NAN)),
            ("PDF:Author", MetaValue::text("Jane")),
            ("PDF:Author", MetaValue::Missing),
            ("EXIF:ISO", MetaValue::from(f64::NAN)),
            ("EXIF:ISO", MetaValue::from(200i64)),
            ("Unknown:Thing", MetaValue::sequence([1i64, 2])),
            ("Unknown:Thing", MetaValue::Sequence(Vec::new())),
        ]
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let normalizer = MetadataNormalizer::default();
        for (key, value) in samples() {
            let once = normalizer.normalize_value(key, value);
            let twice = normalizer.normalize_value(key, once.clone());
            // NaN never survives normalization, so plain equality holds.
            assert_eq!(once, twice, "key {}", key);
        }
    }

    #[test]
    fn test_list_keys_wrap_scalars() {
        let normalizer = MetadataNormalizer::default();
        assert_eq!(
            normalizer.normalize_value("XMP:Creator", MetaValue::text("Jane")),
            MetaValue::sequence(["Jane"])
        );
        assert_eq!(
            normalizer.normalize_value("XMP:Creator", MetaValue::Missing),
            MetaValue::Sequence(Vec::new())
        );
    }

    #[test]
    fn test_scalar_keys_map_nan_to_missing() {
        let normalizer = MetadataNormalizer::default();
        assert_eq!(
            normalizer.normalize_value("EXIF:FNumber", MetaValue::from(f64::NAN)),
            MetaValue::Missing
        );
        assert_eq!(
            normalizer.normalize_value("EXIF:FNumber", MetaValue::from(2.8f64)),
            MetaValue::from(2.8f64)
        );
    }

    #[test]
    fn test_sequences_pass_through_for_any_key() {
        let normalizer = MetadataNormalizer::default();
        let seq = MetaValue::sequence(["x", "y"]);
        assert_eq!(normalizer.normalize_value("Other:Key", seq.clone()), seq);
    }

    #[test]
    fn test_presence_rules() {
        let normalizer = MetadataNormalizer::default();
        assert!(!normalizer.is_present("PDF:Author", &MetaValue::Missing));
        assert!(!normalizer.is_present("PDF:Keywords", &MetaValue::Sequence(Vec::new())));
        assert!(normalizer.is_present("PDF:Keywords", &MetaValue::sequence(["a"])));
        assert!(normalizer.is_present("PDF:Author", &MetaValue::text("")));
    }

    #[test]
    fn test_from_json_shapes() {
        assert_eq!(MetaValue::from_json(&json!(null)), MetaValue::Missing);
        assert_eq!(MetaValue::from_json(&json!(10)), MetaValue::from(10i64));
        assert_eq!(MetaValue::from_json(&json!(1.5)), MetaValue::from(1.5f64));
        assert_eq!(MetaValue::from_json(&json!("abc")), MetaValue::text("abc"));
        assert_eq!(
            MetaValue::from_json(&json!(["a", null, 3])),
            MetaValue::Sequence(vec![Scalar::from("a"), Scalar::from(""), Scalar::from(3i64)])
        );
    }

    #[test]
    fn test_integer_and_float_compare_by_value() {
        assert_eq!(Scalar::from(2020i64), Scalar::from(2020.0f64));
        assert_ne!(Scalar::from(2020i64), Scalar::from("2020"));
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(MetaValue::Missing.to_cell(), "");
        assert_eq!(MetaValue::Sequence(Vec::new()).to_cell(), "");
        assert_eq!(MetaValue::sequence(["a", "b"]).to_cell(), r#"["a","b"]"#);
        assert_eq!(MetaValue::from(10i64).to_cell(), "10");
    }
}
