//! Metric keys.
//!
//! Counter stores are generic over their key type. Any type implementing
//! [`MetricKey`] can be used: the trait is blanket-implemented for every
//! `Eq + Hash + Clone + Debug + Send + Sync + 'static` type, so strings,
//! integers, tuples and small `#[derive(Hash, Eq)]` structs all qualify, and a
//! key that cannot be hashed or compared is rejected by the compiler.
//!
//! Keys that originate from dynamically typed event data arrive as a
//! [`Value`]. Converting a `Value` into a [`Key`] is the one place where
//! comparability is checked at runtime:
//!
//! ```rust
//! use finestre::key::{Key, Value};
//!
//! assert_eq!(Key::try_from(&Value::from("sql_injection")).unwrap(), Key::from("sql_injection"));
//! assert!(Key::try_from(&Value::Nil).is_err());
//! assert!(Key::try_from(&Value::List(vec![Value::Int(1)])).is_err());
//! ```

use std::fmt::{self, Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

/// Bound satisfied by every type usable as a counter key.
pub trait MetricKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> MetricKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// A hashable key built from dynamic data.
///
/// This is the default key type of the [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Key {
    /// A boolean key.
    Bool(bool),
    /// A signed integer key.
    Int(i64),
    /// An unsigned integer key.
    Uint(u64),
    /// A finite floating-point key, stored as its canonical bit pattern.
    Float(FloatKey),
    /// A string key.
    Str(Arc<str>),
    /// A composite key, compared element by element.
    Tuple(Vec<Key>),
}

/// The bit pattern of a finite `f64`, with `-0.0` folded into `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "f64", try_from = "f64"))]
pub struct FloatKey(u64);

impl FloatKey {
    /// Returns `None` for NaN, which never compares equal to itself.
    pub fn new(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        // -0.0 == 0.0
        let value = if value == 0.0 { 0.0 } else { value };
        Some(Self(value.to_bits()))
    }

    /// Returns the floating-point value.
    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<FloatKey> for f64 {
    fn from(key: FloatKey) -> Self {
        key.get()
    }
}

impl TryFrom<f64> for FloatKey {
    type Error = MetricsError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        FloatKey::new(value).ok_or_else(|| MetricsError::InvalidKey {
            reason: "NaN is not comparable".to_string(),
        })
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(v) => write!(f, "{v}"),
            Key::Int(v) => write!(f, "{v}"),
            Key::Uint(v) => write!(f, "{v}"),
            Key::Float(v) => write!(f, "{}", v.get()),
            Key::Str(v) => write!(f, "{v}"),
            Key::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(Arc::from(v))
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Str(Arc::from(v))
    }
}

impl From<bool> for Key {
    fn from(v: bool) -> Self {
        Key::Bool(v)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Key::Uint(v)
    }
}

impl From<Vec<Key>> for Key {
    fn from(v: Vec<Key>) -> Self {
        Key::Tuple(v)
    }
}

/// A dynamically typed value, as carried by event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Nil,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    Uint(u64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Str(String),
    /// A fixed-size group of values; comparable when all members are.
    Tuple(Vec<Value>),
    /// A growable sequence; never comparable.
    List(Vec<Value>),
    /// A string-keyed map; never comparable.
    Map(Vec<(String, Value)>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl TryFrom<&Value> for Key {
    type Error = MetricsError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Nil => Err(MetricsError::InvalidKey {
                reason: "nil key".to_string(),
            }),
            Value::Bool(v) => Ok(Key::Bool(*v)),
            Value::Int(v) => Ok(Key::Int(*v)),
            Value::Uint(v) => Ok(Key::Uint(*v)),
            Value::Float(v) => FloatKey::try_from(*v).map(Key::Float),
            Value::Str(v) => Ok(Key::from(v.as_str())),
            Value::Tuple(items) => items
                .iter()
                .map(Key::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Key::Tuple),
            other @ (Value::List(_) | Value::Map(_)) => Err(MetricsError::InvalidKey {
                reason: format!("key of type {} is not comparable", other.kind()),
            }),
        }
    }
}

impl TryFrom<Value> for Key {
    type Error = MetricsError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Key::try_from(&value)
    }
}
