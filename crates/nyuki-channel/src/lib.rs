//! Nyuki Channel
//!
//! Live-subscriber channels. A subscriber first receives a "ready" snapshot
//! of the current state, then every payload broadcast after it subscribed.
//! Delivery to slow or disconnected subscribers is not guaranteed.

use serde_json::Value as JsonValue;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A named broadcast channel.
#[derive(Debug, Clone)]
pub struct LiveChannel {
  name: String,
  sender: broadcast::Sender<JsonValue>,
  closed: CancellationToken,
}

impl LiveChannel {
  pub fn new(name: impl Into<String>, capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self {
      name: name.into(),
      sender,
      closed: CancellationToken::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Deliver a payload to every current subscriber. Returns how many there
  /// were.
  pub fn broadcast(&self, payload: JsonValue) -> usize {
    if self.closed.is_cancelled() {
      return 0;
    }
    // No subscribers is not an error
    self.sender.send(payload).unwrap_or(0)
  }

  /// Subscribe, receiving `ready` as the first message.
  pub fn subscribe(&self, ready: JsonValue) -> Subscription {
    Subscription {
      name: self.name.clone(),
      ready: Some(ready),
      receiver: self.sender.subscribe(),
      closed: self.closed.clone(),
    }
  }

  pub fn subscriber_count(&self) -> usize {
    self.sender.receiver_count()
  }

  /// End the channel. Subscribers receive what was already sent, then `None`.
  pub fn close(&self) {
    self.closed.cancel();
  }

  pub fn is_closed(&self) -> bool {
    self.closed.is_cancelled()
  }
}

/// The receiving end of a [`LiveChannel`].
#[derive(Debug)]
pub struct Subscription {
  name: String,
  ready: Option<JsonValue>,
  receiver: broadcast::Receiver<JsonValue>,
  closed: CancellationToken,
}

impl Subscription {
  /// Next message, or `None` once the channel has ended.
  pub async fn recv(&mut self) -> Option<JsonValue> {
    if let Some(ready) = self.ready.take() {
      return Some(ready);
    }

    loop {
      tokio::select! {
        biased;
        message = self.receiver.recv() => match message {
          Ok(payload) => return Some(payload),
          Err(RecvError::Lagged(skipped)) => {
            warn!(channel = %self.name, skipped, "subscriber lagged, messages dropped");
          }
          Err(RecvError::Closed) => return None,
        },
        _ = self.closed.cancelled() => return None,
      }
    }
  }
}
