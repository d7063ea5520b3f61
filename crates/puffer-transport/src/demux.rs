//! Inbound frame demultiplexer.
//!
//! Every inbound frame is offered to two independent registries:
//!
//! - **one-shot waits**, keyed by frame `type`, queued FIFO. The oldest live
//!   wait for a type receives the next frame of that type.
//! - **durable subscriptions**, keyed by event name, invoked for every
//!   matching frame in registration order until removed.
//!
//! A frame reaching a wait is still delivered to subscribers.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    task::{Context, Poll},
};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{
    error::{ChannelError, Result},
    protocol::InboundFrame,
};

/// Durable event handler.
pub type Handler = Arc<dyn Fn(&InboundFrame) + Send + Sync>;

/// Identifies a durable subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Identifies a one-shot wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitId(Uuid);

struct Waiter {
    id: WaitId,
    tx: oneshot::Sender<Result<InboundFrame>>,
}

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    waiters: HashMap<String, VecDeque<Waiter>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    closed: bool,
}

impl Registry {
    fn remove_wait(&mut self, kind: &str, id: WaitId) -> bool {
        let Some(queue) = self.waiters.get_mut(kind) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|w| w.id != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            self.waiters.remove(kind);
        }
        removed
    }

    /// Hand `frame` to the oldest live wait for its type.
    fn offer(&mut self, frame: &InboundFrame) -> bool {
        let Some(queue) = self.waiters.get_mut(&frame.kind) else {
            return false;
        };

        let mut resolved = false;
        // Receivers dropped without deregistering are skipped.
        while let Some(waiter) = queue.pop_front() {
            if waiter.tx.send(Ok(frame.clone())).is_ok() {
                resolved = true;
                break;
            }
        }
        if queue.is_empty() {
            self.waiters.remove(&frame.kind);
        }
        resolved
    }
}

/// What happened to one dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    /// A pending wait was resolved with the frame.
    pub resolved_wait: bool,
    /// Number of subscribers invoked.
    pub handlers: usize,
}

/// Wait and subscription registry for one channel.
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct Demultiplexer {
    inner: Arc<Mutex<Registry>>,
}

impl fmt::Debug for Demultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock();
        f.debug_struct("Demultiplexer")
            .field("waiting_types", &registry.waiters.keys().collect::<Vec<_>>())
            .field("events", &registry.subscribers.keys().collect::<Vec<_>>())
            .field("closed", &registry.closed)
            .finish()
    }
}

impl Demultiplexer {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a one-shot wait for the next frame of type `kind`.
    ///
    /// Waits for the same type are resolved in registration order. Dropping
    /// the returned [`Wait`] deregisters it. On a closed registry the wait
    /// fails immediately with [`ChannelError::Closed`].
    #[must_use]
    pub fn wait_for(&self, kind: impl Into<String>) -> Wait {
        let kind = kind.into();
        let id = WaitId(Uuid::new_v4());
        let (tx, rx) = oneshot::channel();

        let mut registry = self.lock();
        if registry.closed {
            let _ = tx.send(Err(ChannelError::Closed));
            return Wait {
                id,
                kind,
                rx,
                registry: Weak::new(),
                done: false,
            };
        }
        registry
            .waiters
            .entry(kind.clone())
            .or_default()
            .push_back(Waiter { id, tx });
        drop(registry);

        tracing::trace!(%kind, "Registered wait");
        Wait {
            id,
            kind,
            rx,
            registry: Arc::downgrade(&self.inner),
            done: false,
        }
    }

    /// Remove a pending wait. Returns `false` if it already resolved.
    pub fn cancel(&self, kind: &str, id: WaitId) -> bool {
        self.lock().remove_wait(kind, id)
    }

    /// Register a durable handler for `event`.
    ///
    /// On a closed registry the handler is dropped without being stored.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&InboundFrame) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        let mut registry = self.lock();
        if !registry.closed {
            registry
                .subscribers
                .entry(event.into())
                .or_default()
                .push(Subscriber {
                    id,
                    handler: Arc::new(handler),
                });
        }
        id
    }

    /// Remove a durable handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let mut found = false;
        registry.subscribers.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            found |= subs.len() != before;
            !subs.is_empty()
        });
        found
    }

    /// Route a frame: resolve the oldest live wait for its type, then
    /// invoke every subscriber of the event named after its type.
    pub fn dispatch(&self, frame: &InboundFrame) -> Delivery {
        let resolved_wait = self.resolve_wait(frame);
        let handlers = self.publish(&frame.kind, frame);
        Delivery {
            resolved_wait,
            handlers,
        }
    }

    fn resolve_wait(&self, frame: &InboundFrame) -> bool {
        self.lock().offer(frame)
    }

    /// Invoke the subscribers of `event` with `frame`, without touching waits.
    ///
    /// Handlers run outside the registry lock, so they may subscribe or
    /// unsubscribe.
    pub fn publish(&self, event: &str, frame: &InboundFrame) -> usize {
        let handlers: Vec<Handler> = self
            .lock()
            .subscribers
            .get(event)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(frame);
        }
        handlers.len()
    }

    /// Reject every pending wait with [`ChannelError::Closed`], drop all
    /// subscribers, and refuse new registrations. Returns the number of
    /// rejected waits.
    pub fn close(&self) -> usize {
        let (waiters, subscribers) = {
            let mut registry = self.lock();
            registry.closed = true;
            (
                mem::take(&mut registry.waiters),
                mem::take(&mut registry.subscribers),
            )
        };
        // Handlers are dropped outside the lock.
        drop(subscribers);

        let mut rejected = 0;
        for waiter in waiters.into_values().flatten() {
            if waiter.tx.send(Err(ChannelError::Closed)).is_ok() {
                rejected += 1;
            }
        }
        rejected
    }

    /// Whether [`Demultiplexer::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of pending waits for `kind`.
    #[must_use]
    pub fn pending_waits(&self, kind: &str) -> usize {
        self.lock().waiters.get(kind).map_or(0, VecDeque::len)
    }

    /// Number of subscribers for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.lock().subscribers.get(event).map_or(0, Vec::len)
    }
}

/// A pending one-shot wait.
///
/// Resolves with the next frame of its type, or with
/// [`ChannelError::Closed`] when the channel closes. There is no built-in
/// timeout: wrap it in `tokio::time::timeout`; dropping it on expiry
/// deregisters it.
pub struct Wait {
    id: WaitId,
    kind: String,
    rx: oneshot::Receiver<Result<InboundFrame>>,
    registry: Weak<Mutex<Registry>>,
    done: bool,
}

impl fmt::Debug for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("kind", &self.kind)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Wait {
    /// Identifier of this wait.
    #[must_use]
    pub const fn id(&self) -> WaitId {
        self.id
    }

    /// Frame type this wait is keyed on.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Deregister without waiting for a frame.
    pub fn cancel(self) {
        drop(self);
    }

    fn deregister(&mut self) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut registry = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.remove_wait(&self.kind, self.id) {
            return;
        }
        // Resolved but never polled: the frame belongs to the next waiter.
        if let Ok(Ok(frame)) = self.rx.try_recv() {
            let forwarded = registry.offer(&frame);
            tracing::trace!(kind = %self.kind, forwarded, "Passed on frame of dropped wait");
        }
    }
}

impl Future for Wait {
    type Output = Result<InboundFrame>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                this.done = true;
                Poll::Ready(result.unwrap_or(Err(ChannelError::Closed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        if !self.done {
            self.deregister();
        }
    }
}
