//! Detachable handlers that can be attached to any collection.

use crate::collection::EventCollection;
use crate::event::Handler;

/// A handler subscription that can be attached to and detached from
/// collections, independent of its message type.
pub trait EventBinding: Send + Sync {
    fn connect_to(&self, collection: &EventCollection);

    fn disconnect_from(&self, collection: &EventCollection);
}

/// Binding of one typed [`Handler`].
///
/// # Examples
///
/// ```
/// use ferrous_events::{EventCollection, EventBinding, Handler, HandlerBinding};
///
/// let binding = HandlerBinding::new(Handler::<u64>::new(|_, _| Ok(())));
/// let collection = EventCollection::new();
///
/// binding.connect_to(&collection);
/// assert_eq!(collection.find::<u64>().unwrap().handler_count(), 1);
///
/// binding.disconnect_from(&collection);
/// assert!(collection.find::<u64>().unwrap().is_empty());
/// # collection.dispose();
/// ```
#[derive(Debug, Clone)]
pub struct HandlerBinding<T> {
    handler: Handler<T>,
}

impl<T: Send + Sync + 'static> HandlerBinding<T> {
    pub fn new(handler: Handler<T>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Handler<T> {
        &self.handler
    }
}

impl<T: Send + Sync + 'static> EventBinding for HandlerBinding<T> {
    fn connect_to(&self, collection: &EventCollection) {
        collection.add_handler(&self.handler);
    }

    fn disconnect_from(&self, collection: &EventCollection) {
        collection.remove_handler(&self.handler);
    }
}

/// Heterogeneous set of bindings attached and detached as a group.
#[derive(Default)]
pub struct BindingSet {
    bindings: Vec<Box<dyn EventBinding>>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a typed handler to the set.
    pub fn bind<T: Send + Sync + 'static>(&mut self, handler: Handler<T>) -> &mut Self {
        self.push(HandlerBinding::new(handler))
    }

    pub fn push(&mut self, binding: impl EventBinding + 'static) -> &mut Self {
        self.bindings.push(Box::new(binding));
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn connect_to(&self, collection: &EventCollection) {
        for binding in &self.bindings {
            binding.connect_to(collection);
        }
    }

    pub fn disconnect_from(&self, collection: &EventCollection) {
        for binding in &self.bindings {
            binding.disconnect_from(collection);
        }
    }
}

impl std::fmt::Debug for BindingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingSet")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
