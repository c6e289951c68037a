//! Ordered publish/subscribe for lifecycle and domain events.
//!
//! Handlers are kept in one list per event type, in subscription order.
//! Mutation (`subscribe` / `unsubscribe`) is serialised behind a single
//! lock; [`EventBus::emit`] clones a snapshot of the handler list and
//! releases the lock before invoking anything, so handlers are free to
//! subscribe or emit further events themselves.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::BoxError;
use crate::guard::guarded;

/// Event type names emitted by the lifecycle controller.
pub mod lifecycle {
    /// A plugin was instantiated.
    pub const LOADED: &str = "plugin.loaded";
    /// A plugin's `init` hook completed.
    pub const INITIALIZED: &str = "plugin.initialized";
    /// A plugin's `activate` hook completed.
    pub const ACTIVATED: &str = "plugin.activated";
    /// A plugin entered the error state.
    pub const FAILED: &str = "plugin.failed";
    /// A plugin was unloaded.
    pub const UNLOADED: &str = "plugin.unloaded";
}

/// A published event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The event type the event was emitted under.
    pub event_type: Arc<str>,
    /// Arbitrary payload.
    pub payload: Value,
    /// When the event was emitted.
    pub emitted_at: SystemTime,
}

/// Identifies one subscription, for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type HandlerFn = dyn Fn(Event) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    handler: Arc<HandlerFn>,
}

type HandlerMap = HashMap<Arc<str>, Arc<Vec<Subscriber>>>;

/// Process-wide event bus.
///
/// Create one per orchestrator and share it via `Arc`.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HandlerMap>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `event_type`.
    ///
    /// ```rust,ignore
    /// bus.subscribe("plugin.activated", |event| async move {
    ///     info!(payload = %event.payload, "activated");
    ///     Ok(())
    /// });
    /// ```
    pub fn subscribe<F, Fut>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber {
            id,
            handler: Arc::new(move |event| -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(handler(event))
            }),
        };

        let mut map = self.handlers.write();
        let list = map.entry(Arc::from(event_type)).or_default();
        Arc::make_mut(list).push(subscriber);
        debug!(event_type, subscription = id.0, "Event subscription added");
        id
    }

    /// Removes a subscription.  Returns `false` if it was not found.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut map = self.handlers.write();
        for (event_type, list) in map.iter_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                Arc::make_mut(list).remove(pos);
                debug!(event_type = %event_type, subscription = id.0, "Event subscription removed");
                return true;
            }
        }
        false
    }

    /// Number of handlers currently subscribed to `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, |l| l.len())
    }

    /// Delivers an event to every handler for `event_type`, in subscription
    /// order.
    ///
    /// A failing or panicking handler is logged and skipped; it never stops
    /// later handlers and never surfaces to the emitter.
    pub async fn emit(&self, event_type: &str, payload: Value) {
        let snapshot = self.handlers.read().get(event_type).cloned();
        let Some(snapshot) = snapshot.filter(|list| !list.is_empty()) else {
            return;
        };

        let event = Event {
            event_type: Arc::from(event_type),
            payload,
            emitted_at: SystemTime::now(),
        };
        debug!(event_type, listeners = snapshot.len(), "Emitting event");

        for subscriber in snapshot.iter() {
            let fut = (subscriber.handler)(event.clone());
            if let Err(e) = guarded(None, fut).await {
                error!(
                    event_type,
                    subscription = subscriber.id.0,
                    error = %e,
                    "Event handler failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.handlers.read();
        f.debug_struct("EventBus")
            .field("event_types", &map.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[tokio::test]
    async fn test_failing_handler_does_not_block_later_handlers() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("x", |_| async { Err::<(), BoxError>("h1 failed".into()) });
        let s = Arc::clone(&seen);
        bus.subscribe("x", move |event| {
            let s = Arc::clone(&s);
            async move {
                s.lock().push(event.payload);
                Ok(())
            }
        });

        bus.emit("x", json!({"n": 1})).await;
        assert_eq!(*seen.lock(), vec![json!({"n": 1})]);
    }

    #[tokio::test]
    async fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe("tick", move |_| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push(tag);
                    Ok(())
                }
            });
        }

        bus.emit("tick", Value::Null).await;
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        bus.subscribe("x", |event| async move {
            if event.payload.is_null() {
                panic!("handler panicked");
            }
            Ok(())
        });
        let h = Arc::clone(&hits);
        bus.subscribe("x", move |_| {
            let h = Arc::clone(&h);
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        bus.emit("x", Value::Null).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe("x", |_| async { Ok(()) });
        bus.subscribe("y", |_| async { Ok(()) });
        assert_eq!(bus.subscriber_count("x"), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count("x"), 0);
        assert_eq!(bus.subscriber_count("y"), 1);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit("nobody", json!(1)).await;
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }
}
