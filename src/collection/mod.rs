//! Registry of event containers keyed by message type.
//!
//! An [`EventCollection`] holds at most one [`EventContainer`] per message
//! type and is the usual place a component exposes the events it consumes:
//! producers elsewhere are wired into it with [`EventCollection::connect`].

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::config::EventConfig;
use crate::error::{EventError, EventResult};
use crate::event::{EventContainer, EventContainerInstance, Handler};
use crate::internal::panic_message;
use crate::key::EventKey;
use crate::lifecycle::{DisposalState, Lifecycle};
use crate::traits::Dispose;

pub mod binding;
pub use binding::{BindingSet, EventBinding, HandlerBinding};

type Entries = SmallVec<[Box<dyn EventContainerInstance>; 16]>;

/// Type-keyed registry of event containers.
///
/// Registration and removal take an exclusive lock; dispatch on the
/// registered containers never touches it.
///
/// # Examples
///
/// ```
/// use ferrous_events::{EventCollection, EventContainer, Handler};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// struct Tick(u32);
///
/// let total = Arc::new(AtomicU32::new(0));
/// let sum = total.clone();
///
/// let consumers = EventCollection::new();
/// consumers.add_handler(&Handler::new(move |_, tick: &Tick| {
///     sum.fetch_add(tick.0, Ordering::SeqCst);
///     Ok(())
/// }));
///
/// let producer = EventContainer::<Tick>::new();
/// consumers.connect(&producer);
/// producer.invoke_message(Tick(3)).unwrap();
///
/// consumers.dispose();
/// producer.invoke_message(Tick(4)).unwrap();
/// assert_eq!(total.load(Ordering::SeqCst), 3);
/// # producer.dispose();
/// ```
pub struct EventCollection {
    lifecycle: Lifecycle,
    entries: Mutex<Entries>,
    config: EventConfig,
}

impl EventCollection {
    /// Creates an empty collection with the default configuration.
    #[track_caller]
    pub fn new() -> Self {
        Self::with_config(EventConfig::new())
    }

    /// Creates an empty collection. Containers created on demand by
    /// [`add_handler`](Self::add_handler) use `config`.
    #[track_caller]
    pub fn with_config(config: EventConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new::<Self>(config.diagnostics.clone()),
            entries: Mutex::new(SmallVec::new()),
            config,
        }
    }

    // ----- Registration -----

    /// Registers `container` as this collection's container for `T`.
    ///
    /// # Errors
    ///
    /// [`EventError::DuplicateEvent`] if a container for `T` is already
    /// registered, [`EventError::UseAfterDispose`] once the collection is
    /// disposed.
    pub fn add_event<T: Send + Sync + 'static>(&self, container: EventContainer<T>) -> EventResult<()> {
        let mut entries = self.entries.lock();
        self.lifecycle.ensure_active()?;
        let key = EventKey::of::<T>();
        if entries.iter().any(|entry| entry.key() == key) {
            return Err(EventError::DuplicateEvent {
                message_type: key.display_name(),
            });
        }
        entries.push(Box::new(container));
        Ok(())
    }

    /// Returns the container registered for `T`.
    pub fn find<T: Send + Sync + 'static>(&self) -> Option<EventContainer<T>> {
        if self.lifecycle.is_disposed() {
            return None;
        }
        let entries = self.entries.lock();
        Self::find_in::<T>(&entries)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.find::<T>().is_some()
    }

    fn find_in<T: Send + Sync + 'static>(entries: &Entries) -> Option<EventContainer<T>> {
        let key = EventKey::of::<T>();
        entries
            .iter()
            .find(|entry| entry.key() == key)
            .and_then(|entry| entry.as_any().downcast_ref::<EventContainer<T>>())
            .cloned()
    }

    /// Removes the container for `T` without disposing it.
    pub fn remove<T: Send + Sync + 'static>(&self) -> Option<EventContainer<T>> {
        let mut entries = self.entries.lock();
        let found = Self::find_in::<T>(&entries)?;
        let key = EventKey::of::<T>();
        entries.retain(|entry| entry.key() != key);
        Some(found)
    }

    // ----- Wiring -----

    /// Wires `producer` into this collection's container for `T`.
    /// Does nothing when no such container is registered.
    ///
    /// The registry lock is held across the wiring so a concurrent
    /// [`remove`](Self::remove) cannot detach the consumer mid-call.
    pub fn connect<T: Send + Sync + 'static>(&self, producer: &EventContainer<T>) {
        let entries = self.entries.lock();
        if self.lifecycle.is_disposed() {
            return;
        }
        if let Some(consumer) = Self::find_in::<T>(&entries) {
            producer.send_to(&consumer);
        }
    }

    /// Inverse of [`connect`](Self::connect).
    pub fn disconnect<T: Send + Sync + 'static>(&self, producer: &EventContainer<T>) {
        let entries = self.entries.lock();
        if let Some(consumer) = Self::find_in::<T>(&entries) {
            producer.disconnect(&consumer);
        }
    }

    /// Subscribes `handler` to this collection's container for `T`, creating
    /// the container on first use. No-op once disposed.
    pub fn add_handler<T: Send + Sync + 'static>(&self, handler: &Handler<T>) {
        let mut entries = self.entries.lock();
        if self.lifecycle.is_disposed() {
            return;
        }
        let consumer = match Self::find_in::<T>(&entries) {
            Some(consumer) => consumer,
            None => {
                let consumer = EventContainer::<T>::with_config(self.config.clone());
                entries.push(Box::new(consumer.clone()));
                consumer
            }
        };
        consumer.add_handler(handler);
    }

    /// Removes one registration of `handler` from the container for `T`.
    pub fn remove_handler<T: Send + Sync + 'static>(&self, handler: &Handler<T>) {
        let entries = self.entries.lock();
        if let Some(consumer) = Self::find_in::<T>(&entries) {
            consumer.remove_handler(handler);
        }
    }

    // ----- Maintenance -----

    /// Removes every container, disposing each one if `dispose_items`.
    ///
    /// A container whose disposal panics is logged and skipped; the rest are
    /// still disposed.
    pub fn clear(&self, dispose_items: bool) {
        let mut entries = self.entries.lock();
        if dispose_items {
            for entry in entries.iter() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| entry.dispose()));
                if let Err(payload) = result {
                    tracing::error!(
                        message_type = entry.key().display_name(),
                        error = %panic_message(payload.as_ref()),
                        "failed to dispose event container"
                    );
                }
            }
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Keys of the registered containers, in registration order.
    pub fn keys(&self) -> Vec<EventKey> {
        self.entries.lock().iter().map(|entry| entry.key()).collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle.is_disposed()
    }

    pub fn state(&self) -> DisposalState {
        self.lifecycle.state()
    }

    /// Disposes the collection and every container in it.
    pub fn dispose(&self) {
        Dispose::dispose(self);
    }
}

impl Dispose for EventCollection {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn teardown(&self) {
        self.clear(true);
    }
}

impl Default for EventCollection {
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventCollection {
    fn drop(&mut self) {
        self.lifecycle.finalize(|| self.clear(true));
    }
}

impl std::fmt::Debug for EventCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCollection")
            .field("keys", &self.keys())
            .field("state", &self.state())
            .finish()
    }
}
