use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use nyuki_workflow::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::OrchestratorError;

/// An event received on an inbound topic.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
  pub topic: String,
  pub payload: Value,
}

/// The message bus the service listens on for triggers.
#[async_trait]
pub trait InboundBus: Send + Sync {
  /// Deliver every event published on `topic` to `sender`.
  async fn subscribe(
    &self,
    topic: &str,
    sender: mpsc::Sender<InboundEvent>,
  ) -> Result<(), OrchestratorError>;
}

/// In-process bus.
#[derive(Debug, Default)]
pub struct MemoryBus {
  subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<InboundEvent>>>>,
}

impl MemoryBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publish on a topic. Returns how many subscribers received the event.
  pub async fn publish(&self, topic: &str, payload: impl Into<Value>) -> usize {
    let senders = self
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(topic)
      .cloned()
      .unwrap_or_default();

    let event = InboundEvent {
      topic: topic.to_string(),
      payload: payload.into(),
    };

    let mut delivered = 0;
    for sender in senders {
      if sender.send(event.clone()).await.is_ok() {
        delivered += 1;
      }
    }
    debug!(topic = %topic, delivered, "published inbound event");
    delivered
  }

  pub fn subscriber_count(&self, topic: &str) -> usize {
    self
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(topic)
      .map_or(0, Vec::len)
  }
}

#[async_trait]
impl InboundBus for MemoryBus {
  async fn subscribe(
    &self,
    topic: &str,
    sender: mpsc::Sender<InboundEvent>,
  ) -> Result<(), OrchestratorError> {
    self
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(topic.to_string())
      .or_default()
      .push(sender);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_publish_reaches_topic_subscribers() {
    let bus = MemoryBus::new();
    let (sender, mut receiver) = mpsc::channel(4);
    bus.subscribe("alerts", sender).await.unwrap();

    assert_eq!(bus.publish("alerts", "fire").await, 1);
    assert_eq!(bus.publish("tickets", "new").await, 0);

    let event = receiver.recv().await.unwrap();
    assert_eq!(event.topic, "alerts");
    assert_eq!(event.payload, Value::from("fire"));
  }
}
