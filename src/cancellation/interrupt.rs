//! External interrupt sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Decision reported back to an interrupt source by its handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Let the default termination proceed.
    Terminate,
    /// Suppress termination; the process keeps running.
    Suppress,
}

/// Handler invoked synchronously on the interrupt delivery thread.
pub type InterruptHandler = Arc<dyn Fn() -> InterruptAction + Send + Sync>;

/// Identifies one subscription on an [`InterruptSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates an id; custom sources choose their own numbering.
    pub const fn new(id: u64) -> Self {
        SubscriptionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A process-level notification that handlers can subscribe to.
pub trait InterruptSource: Send + Sync {
    fn subscribe(&self, handler: InterruptHandler) -> SubscriptionId;

    /// Removes a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Subscriber list shared by the built-in sources.
#[derive(Default)]
struct InterruptHandlers {
    next: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, InterruptHandler)>>,
}

impl InterruptHandlers {
    fn subscribe(&self, handler: InterruptHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.lock().retain(|(existing, _)| *existing != id);
    }

    fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Runs every handler; termination is suppressed if any handler asks.
    fn raise(&self) -> InterruptAction {
        let handlers: Vec<InterruptHandler> =
            self.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
        let mut action = InterruptAction::Terminate;
        for handler in handlers {
            if handler() == InterruptAction::Suppress {
                action = InterruptAction::Suppress;
            }
        }
        action
    }
}

/// Interrupt source raised programmatically. Useful for tests and for hosts
/// that receive interrupts through their own channel.
///
/// # Examples
///
/// ```
/// use ferrous_events::{InterruptAction, InterruptSource, ManualInterruptSource};
/// use std::sync::Arc;
///
/// let source = ManualInterruptSource::new();
/// let id = source.subscribe(Arc::new(|| InterruptAction::Suppress));
/// assert_eq!(source.raise(), InterruptAction::Suppress);
///
/// source.unsubscribe(id);
/// assert_eq!(source.raise(), InterruptAction::Terminate);
/// ```
#[derive(Default)]
pub struct ManualInterruptSource {
    handlers: InterruptHandlers,
}

impl ManualInterruptSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an interrupt to all subscribers on the calling thread.
    pub fn raise(&self) -> InterruptAction {
        tracing::info!("interrupt raised");
        self.handlers.raise()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl InterruptSource for ManualInterruptSource {
    fn subscribe(&self, handler: InterruptHandler) -> SubscriptionId {
        self.handlers.subscribe(handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.unsubscribe(id)
    }
}

impl std::fmt::Debug for ManualInterruptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualInterruptSource")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(feature = "signal")]
pub use ctrl_c::CtrlCInterruptSource;

#[cfg(feature = "signal")]
mod ctrl_c {
    use super::*;
    use crate::error::{EventError, EventResult};

    /// Exit status used when a Ctrl-C is allowed to terminate the process.
    pub const INTERRUPTED_EXIT_CODE: i32 = 130;

    /// Interrupt source fed by Ctrl-C (`SIGINT`).
    ///
    /// A listener task on the current tokio runtime delivers each Ctrl-C to
    /// the subscribers. When none of them suppresses termination the process
    /// exits with status 130. The listener stops when the source is dropped.
    pub struct CtrlCInterruptSource {
        handlers: Arc<InterruptHandlers>,
        listener: tokio::task::JoinHandle<()>,
    }

    impl CtrlCInterruptSource {
        /// Starts listening on the current runtime.
        ///
        /// # Errors
        ///
        /// [`EventError::NoRuntime`] when called outside a tokio runtime.
        pub fn install() -> EventResult<Arc<Self>> {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| EventError::NoRuntime)?;
            let handlers = Arc::new(InterruptHandlers::default());
            let delivered = handlers.clone();
            let listener = runtime.spawn(async move {
                loop {
                    if let Err(error) = tokio::signal::ctrl_c().await {
                        tracing::error!(%error, "failed to listen for Ctrl-C");
                        return;
                    }
                    tracing::info!("interrupt received (Ctrl-C)");
                    if delivered.raise() == InterruptAction::Terminate {
                        std::process::exit(INTERRUPTED_EXIT_CODE);
                    }
                }
            });
            Ok(Arc::new(Self { handlers, listener }))
        }
    }

    impl InterruptSource for CtrlCInterruptSource {
        fn subscribe(&self, handler: InterruptHandler) -> SubscriptionId {
            self.handlers.subscribe(handler)
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.handlers.unsubscribe(id)
        }
    }

    impl Drop for CtrlCInterruptSource {
        fn drop(&mut self) {
            self.listener.abort();
        }
    }
}
