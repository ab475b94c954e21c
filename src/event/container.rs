//! Event container: an addressable publish point for one message type.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::EventConfig;
use crate::error::{EventError, EventResult};
use crate::event::handler::{Handler, Sender};
use crate::internal::ForwardGuard;
use crate::key::EventKey;
use crate::lifecycle::{DisposalState, Lifecycle};
use crate::traits::Dispose;

#[cfg(feature = "async")]
use crate::config::DuplicateAsyncPolicy;
#[cfg(feature = "async")]
use crate::event::handler::AsyncHandler;
#[cfg(feature = "async")]
use dashmap::{mapref::entry::Entry, DashMap};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    fn next() -> Self {
        ContainerId(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Entry of the synchronous subscriber sequence.
enum Subscriber<T: Send + Sync + 'static> {
    Direct(Handler<T>),
    /// Outbound wiring. Weak so a producer never keeps a consumer alive.
    Wired {
        target: ContainerId,
        consumer: Weak<ContainerInner<T>>,
    },
}

impl<T: Send + Sync + 'static> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        match self {
            Subscriber::Direct(handler) => Subscriber::Direct(handler.clone()),
            Subscriber::Wired { target, consumer } => Subscriber::Wired {
                target: *target,
                consumer: consumer.clone(),
            },
        }
    }
}

/// Immutable snapshot of both subscriber sequences, swapped as a whole.
struct Subscribers<T: Send + Sync + 'static> {
    sync: Vec<Subscriber<T>>,
    #[cfg(feature = "async")]
    asyncs: Vec<AsyncHandler<T>>,
}

impl<T: Send + Sync + 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            sync: Vec::new(),
            #[cfg(feature = "async")]
            asyncs: Vec::new(),
        }
    }
}

impl<T: Send + Sync + 'static> Clone for Subscribers<T> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
            #[cfg(feature = "async")]
            asyncs: self.asyncs.clone(),
        }
    }
}

type DisposalCallback = Arc<dyn Fn(ContainerId) + Send + Sync>;

/// Registered by each inbound wiring so the producer can unwire itself.
struct DisposalObserver {
    producer: ContainerId,
    callback: DisposalCallback,
}

pub(crate) struct ContainerInner<T: Send + Sync + 'static> {
    id: ContainerId,
    lifecycle: Lifecycle,
    subscribers: ArcSwap<Subscribers<T>>,
    #[cfg(feature = "async")]
    adapters: DashMap<usize, (Handler<T>, AsyncHandler<T>), ahash::RandomState>,
    disposing: Mutex<Vec<DisposalObserver>>,
    config: EventConfig,
}

impl<T: Send + Sync + 'static> ContainerInner<T> {
    fn dispatch(&self, sender: &Sender, msg: Arc<T>) -> EventResult<bool> {
        if self.lifecycle.is_disposed() {
            return Ok(false);
        }
        let snapshot = self.subscribers.load_full();

        #[cfg(feature = "async")]
        if !snapshot.asyncs.is_empty() {
            self.fan_out(sender, &msg, &snapshot.asyncs);
        }

        for subscriber in snapshot.sync.iter() {
            match subscriber {
                Subscriber::Direct(handler) => {
                    handler.call(sender, &*msg).map_err(EventError::Handler)?;
                }
                Subscriber::Wired { target, consumer } => {
                    let Some(consumer) = consumer.upgrade() else {
                        continue;
                    };
                    match ForwardGuard::enter(self.id.as_u64(), target.as_u64()) {
                        Some(_hop) => {
                            consumer.dispatch(sender, msg.clone())?;
                        }
                        None => tracing::warn!(
                            container = %self.id,
                            target = %target,
                            "wiring cycle detected; link skipped"
                        ),
                    }
                }
            }
        }
        Ok(!snapshot.sync.is_empty())
    }

    #[cfg(feature = "async")]
    fn fan_out(&self, sender: &Sender, msg: &Arc<T>, handlers: &[AsyncHandler<T>]) {
        let diagnostics = self.lifecycle.diagnostics().clone();
        let type_name = self.lifecycle.type_name();

        if !self.config.settings.async_dispatch {
            diagnostics.exception_in_async_handler(
                "Async dispatch is disabled; async handlers skipped.",
                type_name,
            );
            return;
        }
        let runtime = self
            .config
            .runtime
            .clone()
            .or_else(|| tokio::runtime::Handle::try_current().ok());
        let Some(runtime) = runtime else {
            diagnostics.exception_in_async_handler(&EventError::NoRuntime.to_string(), type_name);
            return;
        };

        let handlers: Vec<_> = handlers.iter().map(|h| h.shared()).collect();
        let sender = sender.clone();
        let msg = msg.clone();
        runtime.spawn(async move {
            let mut tasks = tokio::task::JoinSet::new();
            for handler in handlers {
                let sender = sender.clone();
                let msg = msg.clone();
                tasks.spawn(async move { handler.handle(sender, msg).await });
            }
            let failures = super::async_dispatch::collect_failures(&mut tasks).await;
            if !failures.is_empty() {
                let message = format!(
                    "Unhandled error in {} async event handler(s) of {}.",
                    failures.len(),
                    type_name
                );
                diagnostics.exception_in_async_handler(&message, &failures.join("; "));
            }
        });
    }

    fn push(&self, subscriber: Subscriber<T>) {
        self.subscribers.rcu(|current| {
            let mut next = Subscribers::clone(current);
            next.sync.push(subscriber.clone());
            next
        });
    }

    /// Removes the first subscriber matching `predicate`.
    fn remove_first(&self, predicate: impl Fn(&Subscriber<T>) -> bool) {
        self.subscribers.rcu(|current| {
            let mut next = Subscribers::clone(current);
            if let Some(index) = next.sync.iter().position(&predicate) {
                next.sync.remove(index);
            }
            next
        });
    }

    fn unlink(&self, consumer: ContainerId) {
        self.remove_first(|s| matches!(s, Subscriber::Wired { target, .. } if *target == consumer));
    }

    /// Returns false if this container is already disposed, in which case
    /// the observer was not registered.
    fn add_disposal_observer(&self, producer: ContainerId, callback: DisposalCallback) -> bool {
        let mut observers = self.disposing.lock();
        if self.lifecycle.is_disposed() {
            return false;
        }
        observers.push(DisposalObserver { producer, callback });
        true
    }

    fn remove_disposal_observer(&self, producer: ContainerId) {
        let mut observers = self.disposing.lock();
        if let Some(index) = observers.iter().position(|o| o.producer == producer) {
            observers.remove(index);
        }
    }

    fn teardown(&self) {
        // Observers run outside the lock; each one unwires a producer.
        let observers = std::mem::take(&mut *self.disposing.lock());
        for observer in observers {
            (observer.callback)(self.id);
        }
        self.clear_subscribers();
        tracing::debug!(container = %self.id, type_name = self.lifecycle.type_name(), "event container torn down");
    }

    fn clear_subscribers(&self) {
        let previous = self.subscribers.swap(Arc::new(Subscribers::default()));
        for subscriber in previous.sync.iter() {
            if let Subscriber::Wired { consumer, .. } = subscriber {
                if let Some(consumer) = consumer.upgrade() {
                    consumer.remove_disposal_observer(self.id);
                }
            }
        }
        #[cfg(feature = "async")]
        self.adapters.clear();
    }

    /// Called after every registration: a push that raced with teardown
    /// must not stay behind in a disposed container.
    fn discard_if_disposed(&self) {
        if self.lifecycle.is_disposed() {
            self.clear_subscribers();
        }
    }
}

impl<T: Send + Sync + 'static> Drop for ContainerInner<T> {
    fn drop(&mut self) {
        self.lifecycle.finalize(|| self.teardown());
    }
}

/// Publish point for messages of type `T`.
///
/// Holds an ordered list of synchronous subscribers (direct handlers and
/// wiring to other containers), an optional set of asynchronous subscribers,
/// and disposal state. `EventContainer` is a cheap handle: clones share the
/// same container, which is torn down by [`dispose`](Self::dispose) or, as a
/// safety net, when the last handle is dropped.
///
/// # Thread Safety
///
/// `invoke` never takes a lock: it dispatches over an atomic snapshot of the
/// subscriber lists. Mutations swap in a new list (copy-on-write), so
/// concurrent dispatch sees either the whole old list or the whole new one.
///
/// # Examples
///
/// ```
/// use ferrous_events::{EventContainer, Handler, Sender};
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// let producer = EventContainer::<String>::new();
/// let consumer = EventContainer::with_handler(Handler::new(move |_, msg: &String| {
///     sink.lock().unwrap().push(msg.clone());
///     Ok(())
/// }));
///
/// producer.send_to(&consumer);
/// assert!(producer.invoke(&Sender::none(), "hello".to_string()).unwrap());
///
/// consumer.dispose(); // producer unwires itself
/// assert!(!producer.invoke(&Sender::none(), "dropped".to_string()).unwrap());
/// assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
/// ```
pub struct EventContainer<T: Send + Sync + 'static> {
    inner: Arc<ContainerInner<T>>,
}

/// Producer role: a container whose dispatch is wired to consumers.
pub type EventProducer<T> = EventContainer<T>;

/// Consumer role: a container receiving dispatch from producers.
pub type EventConsumer<T> = EventContainer<T>;

impl<T: Send + Sync + 'static> EventContainer<T> {
    /// Creates an empty container with the default configuration.
    #[track_caller]
    pub fn new() -> Self {
        Self::with_config(EventConfig::new())
    }

    /// Creates an empty container with the given configuration.
    #[track_caller]
    pub fn with_config(config: EventConfig) -> Self {
        let lifecycle = Lifecycle::new::<Self>(config.diagnostics.clone());
        Self {
            inner: Arc::new(ContainerInner {
                id: ContainerId::next(),
                lifecycle,
                subscribers: ArcSwap::from_pointee(Subscribers::default()),
                #[cfg(feature = "async")]
                adapters: DashMap::with_hasher(ahash::RandomState::new()),
                disposing: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    /// Creates a consumer with one handler already subscribed.
    #[track_caller]
    pub fn with_handler(handler: Handler<T>) -> Self {
        let container = Self::new();
        container.add_handler(&handler);
        container
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub fn key(&self) -> EventKey {
        EventKey::of::<T>()
    }

    // ----- Synchronous subscribers -----

    /// Appends a handler. The same handler may be added several times and is
    /// then invoked once per registration. No-op after dispose.
    pub fn add_handler(&self, handler: &Handler<T>) {
        if self.inner.lifecycle.is_disposed() {
            return;
        }
        self.inner.push(Subscriber::Direct(handler.clone()));
        self.inner.discard_if_disposed();
    }

    /// Removes one registration of `handler`, if present.
    pub fn remove_handler(&self, handler: &Handler<T>) {
        self.inner
            .remove_first(|s| matches!(s, Subscriber::Direct(h) if h == handler));
    }

    // ----- Dispatch -----

    /// Dispatches `msg` to every subscriber.
    ///
    /// Async subscribers are scheduled in the background first and never
    /// affect the result. Synchronous subscribers then run in registration
    /// order on the calling thread; the first failing handler stops the
    /// dispatch and its error is returned.
    ///
    /// Returns `Ok(true)` if at least one synchronous subscriber was present,
    /// and `Ok(false)` without invoking anything once disposed.
    pub fn invoke(&self, sender: &Sender, msg: T) -> EventResult<bool> {
        self.inner.dispatch(sender, Arc::new(msg))
    }

    /// [`invoke`](Self::invoke) without a sender.
    pub fn invoke_message(&self, msg: T) -> EventResult<bool> {
        self.invoke(&Sender::none(), msg)
    }

    /// [`invoke`](Self::invoke) with no sender and a default message.
    pub fn invoke_default(&self) -> EventResult<bool>
    where
        T: Default,
    {
        self.invoke(&Sender::none(), T::default())
    }

    /// Entry point used when this container is wired as a consumer.
    pub fn handle_invoke(&self, sender: &Sender, msg: Arc<T>) -> EventResult<bool> {
        self.inner.dispatch(sender, msg)
    }

    // ----- Wiring -----

    /// Wires this container's dispatch to `other`: every invoke here also
    /// invokes `other` with the same sender and message. When `other` is
    /// disposed the link is removed from this side automatically.
    ///
    /// Wiring a container to itself is ignored. Longer cycles
    /// (`a -> b -> a`) are allowed; during dispatch a link into a container
    /// that is already forwarding on the current thread is skipped, so each
    /// container in the cycle runs its handlers once per invoke.
    pub fn send_to(&self, other: &EventContainer<T>) {
        if self.id() == other.id() {
            tracing::warn!(container = %self.id(), "ignoring attempt to wire a container to itself");
            return;
        }
        if self.is_disposed() || other.is_disposed() {
            return;
        }
        self.inner.push(Subscriber::Wired {
            target: other.id(),
            consumer: Arc::downgrade(&other.inner),
        });

        let producer: Weak<ContainerInner<T>> = Arc::downgrade(&self.inner);
        let registered = other.inner.add_disposal_observer(
            self.id(),
            Arc::new(move |consumer| {
                if let Some(producer) = producer.upgrade() {
                    producer.unlink(consumer);
                }
            }),
        );
        if !registered {
            // Consumer was disposed concurrently; undo the link.
            self.inner.unlink(other.id());
        }
        self.inner.discard_if_disposed();
    }

    /// Exact inverse of [`send_to`](Self::send_to): removes one link and the
    /// matching disposal observer.
    pub fn disconnect(&self, other: &EventContainer<T>) {
        self.inner.unlink(other.id());
        other.inner.remove_disposal_observer(self.id());
    }

    // ----- Queries -----

    /// True when there are no synchronous subscribers.
    pub fn is_empty(&self) -> bool {
        self.inner.subscribers.load().sync.is_empty()
    }

    /// Number of synchronous subscribers, wiring links included.
    pub fn handler_count(&self) -> usize {
        self.inner.subscribers.load().sync.len()
    }

    /// Number of outbound wiring links.
    pub fn wired_count(&self) -> usize {
        self.inner
            .subscribers
            .load()
            .sync
            .iter()
            .filter(|s| matches!(s, Subscriber::Wired { .. }))
            .count()
    }

    /// Number of inbound wirings (disposal observers).
    pub fn inbound_count(&self) -> usize {
        self.inner.disposing.lock().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.is_disposed()
    }

    pub fn state(&self) -> DisposalState {
        self.inner.lifecycle.state()
    }

    /// True if both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(feature = "async")]
impl<T: Send + Sync + 'static> EventContainer<T> {
    /// Registers a synchronous handler on the fire-and-forget path.
    ///
    /// An adapter runs each callback of `handler` on the blocking pool and
    /// completes once all of them have finished. Registering the same
    /// handler twice is governed by [`DuplicateAsyncPolicy`].
    pub fn add_handler_async(&self, handler: &Handler<T>) -> EventResult<()> {
        if self.is_disposed() {
            return Ok(());
        }
        match self.inner.adapters.entry(handler.identity()) {
            Entry::Occupied(_) => match self.inner.config.settings.duplicate_async {
                DuplicateAsyncPolicy::Ignore => {
                    tracing::warn!(
                        container = %self.id(),
                        "duplicate async handler registration ignored"
                    );
                    Ok(())
                }
                DuplicateAsyncPolicy::Reject => Err(EventError::DuplicateAsyncHandler {
                    message_type: std::any::type_name::<T>(),
                }),
            },
            Entry::Vacant(slot) => {
                let adapter = super::async_dispatch::blocking_adapter(handler.clone());
                slot.insert((handler.clone(), adapter.clone()));
                self.push_async(adapter);
                self.inner.discard_if_disposed();
                Ok(())
            }
        }
    }

    /// Removes the adapter created for `handler` by
    /// [`add_handler_async`](Self::add_handler_async).
    pub fn remove_handler_async(&self, handler: &Handler<T>) {
        if let Some((_, (_, adapter))) = self.inner.adapters.remove(&handler.identity()) {
            self.remove_async_handler(&adapter);
        }
    }

    /// Registers a native async subscriber. Duplicates are allowed.
    pub fn add_async_handler(&self, handler: AsyncHandler<T>) {
        if self.is_disposed() {
            return;
        }
        self.push_async(handler);
        self.inner.discard_if_disposed();
    }

    /// Removes one registration of an async subscriber.
    pub fn remove_async_handler(&self, handler: &AsyncHandler<T>) {
        self.inner.subscribers.rcu(|current| {
            let mut next = Subscribers::clone(current);
            if let Some(index) = next.asyncs.iter().position(|h| h == handler) {
                next.asyncs.remove(index);
            }
            next
        });
    }

    pub fn async_handler_count(&self) -> usize {
        self.inner.subscribers.load().asyncs.len()
    }

    fn push_async(&self, handler: AsyncHandler<T>) {
        self.inner.subscribers.rcu(|current| {
            let mut next = Subscribers::clone(current);
            next.asyncs.push(handler.clone());
            next
        });
    }
}

impl<T: Send + Sync + 'static> Dispose for EventContainer<T> {
    fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    /// Raises the disposal observers, then clears all subscribers.
    fn teardown(&self) {
        self.inner.teardown();
    }
}

impl<T: Send + Sync + 'static> EventContainer<T> {
    /// Disposes the container. Only the first call has any effect.
    pub fn dispose(&self) {
        Dispose::dispose(self);
    }
}

impl<T: Send + Sync + 'static> Clone for EventContainer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Default for EventContainer<T> {
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for EventContainer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContainer")
            .field("id", &self.inner.id)
            .field("message_type", &std::any::type_name::<T>())
            .field("handlers", &self.handler_count())
            .field("state", &self.state())
            .finish()
    }
}

/// Type-erased view of a container, used by registries holding containers
/// of different message types.
pub trait EventContainerInstance: Send + Sync {
    /// Message type key of this container.
    fn key(&self) -> EventKey;

    fn is_empty(&self) -> bool;

    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    /// A fresh, empty container for the same message type.
    fn new_compatible_instance(&self) -> Box<dyn EventContainerInstance>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Send + Sync + 'static> EventContainerInstance for EventContainer<T> {
    fn key(&self) -> EventKey {
        EventKey::of::<T>()
    }

    fn is_empty(&self) -> bool {
        EventContainer::is_empty(self)
    }

    fn dispose(&self) {
        EventContainer::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        EventContainer::is_disposed(self)
    }

    fn new_compatible_instance(&self) -> Box<dyn EventContainerInstance> {
        Box::new(EventContainer::<T>::with_config(self.inner.config.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
