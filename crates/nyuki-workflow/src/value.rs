//! Dynamic values carried by live reports and execution events.
//!
//! The execution engine may attach arbitrary in-process data to task state.
//! Such data is kept as [`Value::Opaque`] until it has to leave the process:
//! serialization renders it as a placeholder string, and [`Value::sanitize`]
//! replaces it permanently before durable storage.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A mapping of string keys to values.
pub type Map = BTreeMap<String, Value>;

/// A dynamically typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Integer(i64),
  Float(f64),
  Text(String),
  Timestamp(DateTime<Utc>),
  Sequence(Vec<Value>),
  Mapping(Map),
  /// In-process data that has no serializable representation.
  Opaque(Opaque),
}

/// A shared handle to a non-serializable value.
#[derive(Clone)]
pub struct Opaque {
  type_name: &'static str,
  inner: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self {
      type_name: std::any::type_name::<T>(),
      inner: Arc::new(value),
    }
  }

  /// Name of the wrapped type.
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    self.inner.downcast_ref::<T>()
  }

  /// Text that stands in for this value outside the process.
  pub fn placeholder(&self) -> String {
    format!("Internal server data: {}", self.type_name)
  }
}

impl fmt::Debug for Opaque {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Opaque")
      .field("type_name", &self.type_name)
      .finish_non_exhaustive()
  }
}

impl PartialEq for Opaque {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl Value {
  /// Wrap an arbitrary value.
  pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
    Value::Opaque(Opaque::new(value))
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&Map> {
    match self {
      Value::Mapping(map) => Some(map),
      _ => None,
    }
  }

  pub fn as_map_mut(&mut self) -> Option<&mut Map> {
    match self {
      Value::Mapping(map) => Some(map),
      _ => None,
    }
  }

  pub fn as_sequence(&self) -> Option<&[Value]> {
    match self {
      Value::Sequence(items) => Some(items),
      _ => None,
    }
  }

  /// Look up a key when this value is a mapping.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.as_map().and_then(|map| map.get(key))
  }

  /// Replace every opaque value with its placeholder text.
  ///
  /// The result only contains mappings, sequences, text, integers, floats,
  /// booleans, nulls and timestamps. Sanitizing twice is the same as once.
  pub fn sanitize(self) -> Value {
    match self {
      Value::Opaque(opaque) => Value::Text(opaque.placeholder()),
      Value::Sequence(items) => Value::Sequence(items.into_iter().map(Value::sanitize).collect()),
      Value::Mapping(map) => Value::Mapping(
        map
          .into_iter()
          .map(|(key, value)| (key, value.sanitize()))
          .collect(),
      ),
      other => other,
    }
  }

  /// True when no opaque value remains anywhere in the tree.
  pub fn is_sanitized(&self) -> bool {
    match self {
      Value::Opaque(_) => false,
      Value::Sequence(items) => items.iter().all(Value::is_sanitized),
      Value::Mapping(map) => map.values().all(Value::is_sanitized),
      _ => true,
    }
  }

  /// Convert into plain JSON. Timestamps become RFC 3339 strings and
  /// non-finite floats become null.
  pub fn into_json(self) -> serde_json::Value {
    use serde_json::Value as Json;

    match self {
      Value::Null => Json::Null,
      Value::Bool(b) => Json::Bool(b),
      Value::Integer(i) => Json::from(i),
      Value::Float(f) => serde_json::Number::from_f64(f)
        .map(Json::Number)
        .unwrap_or(Json::Null),
      Value::Text(s) => Json::String(s),
      Value::Timestamp(ts) => Json::String(ts.to_rfc3339()),
      Value::Sequence(items) => Json::Array(items.into_iter().map(Value::into_json).collect()),
      Value::Mapping(map) => Json::Object(
        map
          .into_iter()
          .map(|(key, value)| (key, value.into_json()))
          .collect(),
      ),
      Value::Opaque(opaque) => Json::String(opaque.placeholder()),
    }
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Value::Null => serializer.serialize_unit(),
      Value::Bool(b) => serializer.serialize_bool(*b),
      Value::Integer(i) => serializer.serialize_i64(*i),
      Value::Float(f) => serializer.serialize_f64(*f),
      Value::Text(s) => serializer.serialize_str(s),
      Value::Timestamp(ts) => serializer.serialize_str(&ts.to_rfc3339()),
      Value::Sequence(items) => items.serialize(serializer),
      Value::Mapping(map) => map.serialize(serializer),
      Value::Opaque(opaque) => serializer.serialize_str(&opaque.placeholder()),
    }
  }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    serde_json::Value::deserialize(deserializer).map(Value::from)
  }
}

impl From<serde_json::Value> for Value {
  fn from(value: serde_json::Value) -> Self {
    use serde_json::Value as Json;

    match value {
      Json::Null => Value::Null,
      Json::Bool(b) => Value::Bool(b),
      Json::Number(n) => match n.as_i64() {
        Some(i) => Value::Integer(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
      },
      Json::String(s) => Value::Text(s),
      Json::Array(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
      Json::Object(map) => Value::Mapping(
        map
          .into_iter()
          .map(|(key, value)| (key, Value::from(value)))
          .collect(),
      ),
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Value::Integer(i)
  }
}

impl From<f64> for Value {
  fn from(f: f64) -> Self {
    Value::Float(f)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Text(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::Text(s)
  }
}

impl From<DateTime<Utc>> for Value {
  fn from(ts: DateTime<Utc>) -> Self {
    Value::Timestamp(ts)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Value::Sequence(items)
  }
}

impl From<Map> for Value {
  fn from(map: Map) -> Self {
    Value::Mapping(map)
  }
}
