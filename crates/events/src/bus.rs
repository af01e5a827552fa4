//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is a **notification** channel: it tells subscribers that the
//! visible page may have changed. Events carry no state that cannot be
//! re-derived, so delivery is best-effort and consumers must be idempotent.
//!
//! ## Delivery
//!
//! - **Broadcast**: every subscription receives a copy of every event
//!   published after it subscribed.
//! - **Ordered per publisher**: events from one publisher arrive in publish order.
//! - **Unbounded**: publishers never wait on slow subscribers; a subscriber
//!   that stops polling only grows its own queue.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

/// A subscription to an event stream.
///
/// ```ignore
/// let bus: Arc<dyn EventBus<PageEvent, Error = _>> = ...;
/// let mut subscription = bus.subscribe();
///
/// while let Some(event) = subscription.recv().await {
///     handle(event);
/// }
/// // `None`: the bus was dropped.
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message; `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Domain-agnostic pub/sub abstraction.
///
/// `publish()` may fail (e.g. a poisoned lock); the caller decides whether
/// that matters. For page events it never does beyond a log line, since the
/// next event triggers a full re-evaluation anyway.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
