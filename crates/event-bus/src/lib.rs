use std::sync::Arc;

use tokio::sync::broadcast;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// Fan-out contract: one publisher side, any number of broadcast subscribers.
///
/// Delivery is best-effort per subscriber; a receiver that falls behind the
/// channel capacity observes a lag error and skips ahead instead of blocking
/// the publisher.
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Publish an event, returning how many live subscribers it reached.
    fn publish(&self, event: E) -> usize;

    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// In-memory bus backed by a tokio broadcast channel.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> usize {
        // send fails only when no receiver is subscribed, which is not an
        // error for a lifecycle stream.
        self.sender.send(event).unwrap_or(0)
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}
