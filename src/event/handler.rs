//! Handler and sender types.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerResult;

/// Identifies the publisher of a message.
///
/// A sender is an optional, type-erased shared reference. Handlers that care
/// about the publisher downcast it; most ignore it.
///
/// # Examples
///
/// ```
/// use ferrous_events::Sender;
/// use std::sync::Arc;
///
/// struct Motor { id: u32 }
///
/// let sender = Sender::new(Arc::new(Motor { id: 7 }));
/// assert_eq!(sender.downcast_ref::<Motor>().map(|m| m.id), Some(7));
/// assert!(sender.downcast_ref::<String>().is_none());
/// assert!(Sender::none().is_none());
/// ```
#[derive(Clone, Default)]
pub struct Sender(Option<Arc<dyn Any + Send + Sync>>);

impl Sender {
    /// A sender carrying no publisher.
    pub fn none() -> Self {
        Sender(None)
    }

    pub fn new<S: Any + Send + Sync>(sender: Arc<S>) -> Self {
        Sender(Some(sender))
    }

    pub fn from_value<S: Any + Send + Sync>(sender: S) -> Self {
        Sender(Some(Arc::new(sender)))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
        self.0.as_deref().and_then(|s| s.downcast_ref::<S>())
    }

    pub fn downcast<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.0.clone().and_then(|s| s.downcast::<S>().ok())
    }

    /// True if both senders refer to the same publisher (or both are empty).
    pub fn ptr_eq(&self, other: &Sender) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(s) => write!(f, "Sender({:p})", Arc::as_ptr(s)),
            None => f.write_str("Sender(None)"),
        }
    }
}

pub(crate) type HandlerFn<T> = dyn Fn(&Sender, &T) -> HandlerResult + Send + Sync;

/// A synchronous subscriber with identity.
///
/// Cloning a `Handler` keeps its identity, so the clone can later be passed
/// to `remove_handler`. Two handlers built from the same closure separately
/// are different subscribers.
///
/// A handler may consist of several callbacks (see [`Handler::combine`]);
/// they run in order as one subscription.
///
/// # Examples
///
/// ```
/// use ferrous_events::{EventContainer, Handler};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let hits = Arc::new(AtomicU32::new(0));
/// let counter = hits.clone();
/// let handler = Handler::new(move |_, n: &u32| {
///     counter.fetch_add(*n, Ordering::SeqCst);
///     Ok(())
/// });
///
/// let container = EventContainer::<u32>::new();
/// container.add_handler(&handler);
/// container.invoke_message(5).unwrap();
/// container.remove_handler(&handler);
/// container.invoke_message(5).unwrap();
/// assert_eq!(hits.load(Ordering::SeqCst), 5);
/// ```
pub struct Handler<T> {
    callbacks: Arc<[Arc<HandlerFn<T>>]>,
}

impl<T> Handler<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Sender, &T) -> HandlerResult + Send + Sync + 'static,
    {
        let callback: Arc<HandlerFn<T>> = Arc::new(f);
        Self {
            callbacks: Arc::from(vec![callback]),
        }
    }

    /// Builds one subscription out of the callbacks of `handlers`, in order.
    /// The result has a new identity.
    pub fn combine(handlers: &[Handler<T>]) -> Self {
        let callbacks: Vec<Arc<HandlerFn<T>>> = handlers
            .iter()
            .flat_map(|h| h.callbacks.iter().cloned())
            .collect();
        Self {
            callbacks: Arc::from(callbacks),
        }
    }

    /// Runs every callback in order, stopping at the first error.
    pub fn call(&self, sender: &Sender, msg: &T) -> HandlerResult {
        for callback in self.callbacks.iter() {
            callback(sender, msg)?;
        }
        Ok(())
    }

    /// Number of callbacks in this subscription.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    #[cfg_attr(not(feature = "async"), allow(dead_code))]
    pub(crate) fn callbacks(&self) -> &[Arc<HandlerFn<T>>] {
        &self.callbacks
    }

    /// Identity of this subscription.
    #[cfg_attr(not(feature = "async"), allow(dead_code))]
    #[inline]
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.callbacks) as *const () as usize
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<T> PartialEq for Handler<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callbacks, &other.callbacks)
    }
}

impl<T> Eq for Handler<T> {}

impl<T> std::fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("identity", &format_args!("{:#x}", self.identity()))
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Trait for asynchronous subscribers.
///
/// Errors returned here, and panics, never reach the publisher; they are
/// reported to the container's diagnostics.
#[async_trait]
pub trait AsyncEventHandler<T: Send + Sync + 'static>: Send + Sync {
    async fn handle(&self, sender: Sender, msg: Arc<T>) -> HandlerResult;
}

struct FnAsyncHandler<F>(F);

#[async_trait]
impl<T, F, Fut> AsyncEventHandler<T> for FnAsyncHandler<F>
where
    T: Send + Sync + 'static,
    F: Fn(Sender, Arc<T>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, sender: Sender, msg: Arc<T>) -> HandlerResult {
        (self.0)(sender, msg).await
    }
}

/// An asynchronous subscriber with identity.
pub struct AsyncHandler<T: Send + Sync + 'static> {
    inner: Arc<dyn AsyncEventHandler<T>>,
}

impl<T: Send + Sync + 'static> AsyncHandler<T> {
    pub fn new<H: AsyncEventHandler<T> + 'static>(handler: H) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    /// Wraps an async closure.
    ///
    /// ```
    /// use ferrous_events::AsyncHandler;
    ///
    /// let handler = AsyncHandler::<String>::from_fn(|_sender, msg| async move {
    ///     println!("got {}", msg);
    ///     Ok(())
    /// });
    /// # let _ = handler;
    /// ```
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Sender, Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::new(FnAsyncHandler(f))
    }

    #[cfg_attr(not(feature = "async"), allow(dead_code))]
    pub(crate) fn shared(&self) -> Arc<dyn AsyncEventHandler<T>> {
        self.inner.clone()
    }
}

impl<T: Send + Sync + 'static> Clone for AsyncHandler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> PartialEq for AsyncHandler<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
