//! Structured query keys.
//!
//! A key is a non-empty ordered list of JSON-like parts. Two keys are the same
//! entry when their parts compare equal element by element; map parts compare
//! independent of insertion order. Invalidation matches by prefix.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use uuid::Uuid;

use super::error::QueryError;

/// One element of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    /// Bit pattern of a finite `f64`; `-0.0` is folded into `0.0`.
    Float(u64),
    Str(String),
    List(Vec<KeyPart>),
    Map(BTreeMap<String, KeyPart>),
}

impl KeyPart {
    pub fn float(value: f64) -> Result<Self, QueryError> {
        if !value.is_finite() {
            return Err(QueryError::invalid_key(format!(
                "non-finite number `{value}` cannot be part of a key"
            )));
        }
        let normalized = if value == 0.0 { 0.0_f64 } else { value };
        Ok(Self::Float(normalized.to_bits()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::from(*value),
            Self::Float(bits) => Value::from(f64::from_bits(*bits)),
            Self::Str(value) => Value::String(value.clone()),
            Self::List(items) => Value::Array(items.iter().map(KeyPart::to_json).collect()),
            Self::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, part)| (name.clone(), part.to_json()))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<Value> for KeyPart {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Self::Int(int)
                } else {
                    let float = number.as_f64().ok_or_else(|| {
                        QueryError::invalid_key(format!("number `{number}` is not representable"))
                    })?;
                    Self::float(float)?
                }
            }
            Value::String(text) => Self::Str(text),
            Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(KeyPart::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(fields) => Self::Map(
                fields
                    .into_iter()
                    .map(|(name, value)| KeyPart::try_from(value).map(|part| (name, part)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<Uuid> for KeyPart {
    fn from(value: Uuid) -> Self {
        Self::Str(value.to_string())
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Identity of a cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    /// Single-part key naming a query family, e.g. `apps`.
    pub fn root(name: &str) -> Self {
        Self(vec![KeyPart::from(name)])
    }

    pub fn from_parts(parts: Vec<KeyPart>) -> Result<Self, QueryError> {
        if parts.is_empty() {
            return Err(QueryError::invalid_key("a key needs at least one part"));
        }
        Ok(Self(parts))
    }

    /// Extend the key by one part.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First part when it is a string; used as a low-cardinality metric label.
    pub fn family(&self) -> &str {
        self.0.first().and_then(KeyPart::as_str).unwrap_or("other")
    }

    /// `true` when `self` is no longer than `other` and agrees on every part.
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.0.iter().map(KeyPart::to_json).collect())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl TryFrom<Value> for QueryKey {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => Self::from_parts(
                items
                    .into_iter()
                    .map(KeyPart::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            other => Err(QueryError::invalid_key(format!(
                "a key must be an array, got `{other}`"
            ))),
        }
    }
}

/// Anything the cache accepts where a key is expected.
pub trait IntoQueryKey {
    fn into_query_key(self) -> Result<QueryKey, QueryError>;
}

impl IntoQueryKey for QueryKey {
    fn into_query_key(self) -> Result<QueryKey, QueryError> {
        Ok(self)
    }
}

impl IntoQueryKey for &QueryKey {
    fn into_query_key(self) -> Result<QueryKey, QueryError> {
        Ok(self.clone())
    }
}

impl IntoQueryKey for Value {
    fn into_query_key(self) -> Result<QueryKey, QueryError> {
        QueryKey::try_from(self)
    }
}

impl IntoQueryKey for Vec<KeyPart> {
    fn into_query_key(self) -> Result<QueryKey, QueryError> {
        QueryKey::from_parts(self)
    }
}

impl IntoQueryKey for &str {
    fn into_query_key(self) -> Result<QueryKey, QueryError> {
        Ok(QueryKey::root(self))
    }
}
