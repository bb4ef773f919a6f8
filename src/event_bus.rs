//! # Event Bus
//!
//! Topic-keyed publish/subscribe decoupling the interpreter from its
//! business-logic collaborators. The interpreter only ever emits; it never
//! calls into collaborator code directly, and collaborators report results
//! back exclusively through the state store's path API.
//!
//! ## Delivery semantics
//!
//! - Handlers are kept per topic in registration order.
//! - `emit` snapshots the handler list first, then invokes each handler
//!   synchronously in that order. A handler unsubscribed before the call is
//!   skipped; a handler subscribed during the call does not receive the
//!   in-flight pass.
//! - Asynchronous work registered through [`EventBus::on_async`] runs in its
//!   own spawned task per invocation, so a slow or failing handler cannot
//!   block or abort delivery to its siblings, and its outcome is never
//!   propagated to the emitter.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

pub type Payload = Value;

type Handler = Arc<dyn Fn(Payload) + Send + Sync>;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed payload for topic {topic}: {message}")]
    MalformedPayload { topic: String, message: String },
}

pub struct EventBus {
    topics: DashMap<String, Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// Handle returned by [`EventBus::on`]; call [`Subscription::unsubscribe`]
/// to remove the handler. Dropping the handle leaves the handler registered.
pub struct Subscription {
    bus: Weak<EventBus>,
    topic: String,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            if let Some(mut handlers) = bus.topics.get_mut(&self.topic) {
                handlers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` for `topic`, appended after all existing handlers.
    pub fn on<F>(self: &Arc<Self>, topic: &str, handler: F) -> Subscription
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(self),
            topic: topic.to_string(),
            id,
        }
    }

    /// Registers an asynchronous handler. Each invocation is spawned as an
    /// independent task; `emit` does not await it and rejections stay inside
    /// the task.
    pub fn on_async<F, Fut>(self: &Arc<Self>, topic: &str, handler: F) -> Subscription
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(topic, move |payload| {
            tokio::spawn(handler(payload));
        })
    }

    /// Publishes `payload` to every handler registered for `topic` at call
    /// time, in registration order.
    pub fn emit(&self, topic: &str, payload: Payload) {
        trace!("emit {}: {}", topic, payload);
        // Snapshot outside the shard lock so handlers may themselves
        // subscribe or emit without deadlocking.
        let handlers: Vec<Handler> = match self.topics.get(topic) {
            Some(entry) => entry.iter().map(|(_, h)| h.clone()).collect(),
            None => {
                debug!("emit on {} with no subscribers", topic);
                return;
            }
        };
        for handler in handlers {
            handler(payload.clone());
        }
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|h| h.len()).unwrap_or(0)
    }
}
