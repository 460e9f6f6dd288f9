//! Caller-supplied execution metadata.

use crate::value::{Map, Value};

/// The metadata keys a caller may attach to a running workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecKey {
  Requester,
  Track,
}

impl ExecKey {
  pub const ALL: [ExecKey; 2] = [ExecKey::Requester, ExecKey::Track];

  pub fn as_str(self) -> &'static str {
    match self {
      ExecKey::Requester => "requester",
      ExecKey::Track => "track",
    }
  }

  pub fn parse(key: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.as_str() == key)
  }
}

/// Execution metadata restricted to the [`ExecKey`] allow-list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecMeta {
  requester: Option<String>,
  track: Option<Value>,
}

impl ExecMeta {
  pub fn new() -> Self {
    Self::default()
  }

  /// Keep the recognized keys and drop everything else.
  ///
  /// A requester that is not text is ignored.
  pub fn from_entries<I, K>(entries: I) -> Self
  where
    I: IntoIterator<Item = (K, Value)>,
    K: AsRef<str>,
  {
    let mut meta = Self::default();
    for (key, value) in entries {
      match ExecKey::parse(key.as_ref()) {
        Some(ExecKey::Requester) => meta.requester = value.as_str().map(str::to_string),
        Some(ExecKey::Track) => meta.track = Some(value),
        None => {}
      }
    }
    meta
  }

  pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
    self.requester = Some(requester.into());
    self
  }

  pub fn with_track(mut self, track: impl Into<Value>) -> Self {
    self.track = Some(track.into());
    self
  }

  pub fn requester(&self) -> Option<&str> {
    self.requester.as_deref()
  }

  pub fn track(&self) -> Option<&Value> {
    self.track.as_ref()
  }

  pub fn is_empty(&self) -> bool {
    self.requester.is_none() && self.track.is_none()
  }

  /// Overlay the metadata onto a live exec block.
  pub fn apply(&self, exec: &mut Map) {
    if let Some(requester) = &self.requester {
      exec.insert(
        ExecKey::Requester.as_str().to_string(),
        Value::Text(requester.clone()),
      );
    }
    if let Some(track) = &self.track {
      exec.insert(ExecKey::Track.as_str().to_string(), track.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_keys_are_dropped() {
    let meta = ExecMeta::from_entries([
      ("requester", Value::from("nyuki://parent@holder/abc")),
      ("track", Value::from("t-1")),
      ("priority", Value::Integer(9)),
    ]);

    assert_eq!(meta.requester(), Some("nyuki://parent@holder/abc"));
    assert_eq!(meta.track(), Some(&Value::from("t-1")));

    let mut exec = Map::new();
    meta.apply(&mut exec);
    assert_eq!(exec.len(), 2);
    assert!(!exec.contains_key("priority"));
  }

  #[test]
  fn test_non_text_requester_is_ignored() {
    let meta = ExecMeta::from_entries([("requester", Value::Integer(1))]);
    assert!(meta.is_empty());
  }

  #[test]
  fn test_apply_overrides_live_values() {
    let mut exec = Map::new();
    exec.insert("requester".to_string(), Value::from("engine"));
    exec.insert("id".to_string(), Value::from("abc"));

    ExecMeta::new().with_requester("api").apply(&mut exec);

    assert_eq!(exec["requester"], Value::from("api"));
    assert_eq!(exec["id"], Value::from("abc"));
  }
}
