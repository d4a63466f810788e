//! A typed event registry. Handlers are plain async closures; there is no
//! runtime type-checking of callback signatures since the compiler already
//! rejects a callback that doesn't accept this bus's event type.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler<E> = Box<dyn Fn(E) -> HandlerFuture + Send + Sync>;

/// Broadcasts one event type to every registered handler, serially, in
/// registration order, awaiting each before moving to the next.
pub struct EventBus<E> {
    handlers: RwLock<Vec<Handler<E>>>,
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: RwLock::new(Vec::new()) }
    }

    /// Registers a handler. Safe to call after the bus has started
    /// triggering events from other tasks.
    pub async fn register<F, Fut>(&self, handler: F)
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.write().await.push(Box::new(move |event| Box::pin(handler(event))));
    }

    /// Calls every handler in order, awaiting each in turn.
    pub async fn trigger(&self, event: E) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler(event.clone()).await;
        }
    }
}

impl<E> Default for EventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let bus: EventBus<u32> = EventBus::new();
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.register(move |n| {
            let o1 = o1.clone();
            async move { o1.lock().await.push(("first", n)) }
        })
        .await;
        let o2 = order.clone();
        bus.register(move |n| {
            let o2 = o2.clone();
            async move { o2.lock().await.push(("second", n)) }
        })
        .await;

        bus.trigger(42).await;
        let recorded = order.lock().await;
        assert_eq!(*recorded, vec![("first", 42), ("second", 42)]);
    }

    #[tokio::test]
    async fn trigger_with_no_handlers_is_a_no_op() {
        let bus: EventBus<()> = EventBus::new();
        bus.trigger(()).await;
    }

    #[tokio::test]
    async fn every_handler_sees_every_trigger() {
        let bus: EventBus<()> = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        bus.register(move |()| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        bus.trigger(()).await;
        bus.trigger(()).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
