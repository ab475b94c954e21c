//! One-shot cancellation bridged from an external interrupt source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, ReentrantMutex};

use super::interrupt::{InterruptAction, InterruptSource, SubscriptionId};
use super::CancellationToken;
use crate::config::{CancellationConfig, InterruptPolicy};
use crate::error::EventResult;
use crate::event::{EventProducer, Sender};
use crate::lifecycle::{DisposalState, Lifecycle, TransitionGuard};
use crate::traits::Dispose;

/// Message raised on a guard's cancellation event.
#[derive(Debug, Clone)]
pub struct CancellationEvent {
    /// The token that was cancelled.
    pub token: CancellationToken,
    /// True when the cancellation came from the interrupt source.
    pub interrupted: bool,
}

struct GuardInner {
    lifecycle: Lifecycle,
    flag: TransitionGuard,
    token: ArcSwap<CancellationToken>,
    // Serializes interrupt delivery against dispose and reset. Reentrant so
    // an observer may reset or dispose the guard from its handler.
    lock: ReentrantMutex<()>,
    continue_exec: AtomicBool,
    event: EventProducer<CancellationEvent>,
    source: Option<Arc<dyn InterruptSource>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl GuardInner {
    /// Exactly one caller per arm cycle wins; always false once disposed.
    fn try_begin_cancel(&self) -> bool {
        !self.lifecycle.is_disposed() && self.flag.try_begin()
    }

    fn raise(&self, token: CancellationToken, interrupted: bool) {
        let message = CancellationEvent { token, interrupted };
        if let Err(error) = self.event.invoke(&Sender::none(), message) {
            tracing::warn!(%error, "cancellation observer failed");
        }
    }

    fn cancel(&self, interrupted: bool) -> bool {
        if !self.try_begin_cancel() {
            return false;
        }
        let token = self.token.load_full();
        token.cancel();
        self.raise(token.as_ref().clone(), interrupted);
        true
    }

    fn handle_interrupt(&self) -> InterruptAction {
        let _lock = self.lock.lock();
        if self.cancel(true) {
            tracing::info!("cancellation requested by interrupt");
        }
        if self.continue_exec.load(Ordering::Acquire) {
            InterruptAction::Suppress
        } else {
            InterruptAction::Terminate
        }
    }

    fn unregister(&self) {
        if let Some(id) = self.subscription.lock().take() {
            if let Some(source) = &self.source {
                source.unsubscribe(id);
            }
        }
    }

    fn teardown(&self) {
        let _lock = self.lock.lock();
        self.unregister();
        self.event.dispose();
    }
}

impl Drop for GuardInner {
    fn drop(&mut self) {
        self.lifecycle.finalize(|| self.teardown());
    }
}

/// Bridges an external interrupt to a one-shot [`CancellationToken`] and an
/// observer event.
///
/// Across concurrent [`cancel`](Self::cancel) calls and interrupts, exactly
/// one succeeds per arm cycle: it cancels the token and raises
/// [`cancellation_event`](Self::cancellation_event) once. [`reset`](Self::reset)
/// starts a new cycle with a fresh token. After dispose the guard is inert.
///
/// # Examples
///
/// ```
/// use ferrous_events::{
///     CancellationConfig, CancellationGuard, Handler, InterruptAction, InterruptPolicy,
///     ManualInterruptSource,
/// };
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let source = Arc::new(ManualInterruptSource::new());
/// let config = CancellationConfig::new().with_interrupt_policy(InterruptPolicy::Continue);
/// let guard = CancellationGuard::new(source.clone(), config);
///
/// let fired = Arc::new(AtomicU32::new(0));
/// let counter = fired.clone();
/// guard.cancellation_event().add_handler(&Handler::new(move |_, _| {
///     counter.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// }));
///
/// assert_eq!(source.raise(), InterruptAction::Suppress);
/// assert_eq!(source.raise(), InterruptAction::Suppress);
/// assert!(guard.is_cancellation_requested());
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
///
/// guard.reset(true);
/// assert!(guard.cancel());
/// assert_eq!(fired.load(Ordering::SeqCst), 2);
/// guard.dispose();
/// ```
#[derive(Clone)]
pub struct CancellationGuard {
    inner: Arc<GuardInner>,
}

impl CancellationGuard {
    /// Creates a guard subscribed to `source`.
    #[track_caller]
    pub fn new(source: Arc<dyn InterruptSource>, config: CancellationConfig) -> Self {
        let guard = Self::build(Some(source.clone()), config);
        let weak: Weak<GuardInner> = Arc::downgrade(&guard.inner);
        let id = source.subscribe(Arc::new(move || match weak.upgrade() {
            Some(inner) => inner.handle_interrupt(),
            None => InterruptAction::Terminate,
        }));
        *guard.inner.subscription.lock() = Some(id);
        guard
    }

    /// Creates a guard with no interrupt source; only [`cancel`](Self::cancel)
    /// triggers it.
    #[track_caller]
    pub fn detached(config: CancellationConfig) -> Self {
        Self::build(None, config)
    }

    #[track_caller]
    fn build(source: Option<Arc<dyn InterruptSource>>, config: CancellationConfig) -> Self {
        let lifecycle = Lifecycle::new::<Self>(config.event.diagnostics.clone());
        let event = EventProducer::with_config(config.event);
        Self {
            inner: Arc::new(GuardInner {
                lifecycle,
                flag: TransitionGuard::new(),
                token: ArcSwap::from_pointee(CancellationToken::new()),
                lock: ReentrantMutex::new(()),
                continue_exec: AtomicBool::new(config.interrupt_policy.continue_exec()),
                event,
                source,
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Claims this arm cycle's cancellation without signalling anything.
    pub fn try_begin_cancel(&self) -> bool {
        self.inner.try_begin_cancel()
    }

    /// Cancels the current token and raises the cancellation event. Returns
    /// false if this cycle was already cancelled or the guard is disposed.
    pub fn cancel(&self) -> bool {
        self.inner.cancel(false)
    }

    /// Like [`cancel`](Self::cancel), awaiting the token's callbacks on the
    /// blocking pool.
    #[cfg(feature = "async")]
    pub async fn cancel_async(&self) -> bool {
        if !self.inner.try_begin_cancel() {
            return false;
        }
        let token = self.inner.token.load_full();
        token.cancel_async().await;
        self.inner.raise(token.as_ref().clone(), false);
        true
    }

    /// Re-arms the guard with a fresh token and sets the interrupt policy.
    /// No-op once disposed.
    pub fn reset(&self, continue_exec: bool) {
        let _lock = self.inner.lock.lock();
        if self.inner.lifecycle.is_disposed() {
            return;
        }
        // New token first, so a cancel racing the re-arm hits the new one.
        self.inner.token.store(Arc::new(CancellationToken::new()));
        self.inner.continue_exec.store(continue_exec, Ordering::Release);
        self.inner.flag.reset();
    }

    /// Detaches from the interrupt source. Idempotent.
    pub fn unregister(&self) {
        self.inner.unregister();
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.token.load().is_cancelled()
    }

    /// The current arm cycle's token.
    ///
    /// # Errors
    ///
    /// [`EventError::UseAfterDispose`](crate::EventError::UseAfterDispose)
    /// once the guard is disposed.
    pub fn token(&self) -> EventResult<CancellationToken> {
        self.inner.lifecycle.ensure_active()?;
        Ok(self.inner.token.load().as_ref().clone())
    }

    /// Event raised once per successful cancellation.
    pub fn cancellation_event(&self) -> EventProducer<CancellationEvent> {
        self.inner.event.clone()
    }

    pub fn continue_exec(&self) -> bool {
        self.inner.continue_exec.load(Ordering::Acquire)
    }

    pub fn set_continue_exec(&self, continue_exec: bool) {
        self.inner.continue_exec.store(continue_exec, Ordering::Release);
    }

    pub fn interrupt_policy(&self) -> InterruptPolicy {
        InterruptPolicy::from_continue_exec(self.continue_exec())
    }

    pub fn is_registered(&self) -> bool {
        self.inner.subscription.lock().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.is_disposed()
    }

    pub fn state(&self) -> DisposalState {
        self.inner.lifecycle.state()
    }

    /// Unregisters from the interrupt source and disposes the cancellation
    /// event. The guard is inert afterwards.
    pub fn dispose(&self) {
        Dispose::dispose(self);
    }
}

impl Dispose for CancellationGuard {
    fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    fn teardown(&self) {
        self.inner.teardown();
    }
}

impl std::fmt::Debug for CancellationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationGuard")
            .field("cancelled", &self.is_cancellation_requested())
            .field("continue_exec", &self.continue_exec())
            .field("registered", &self.is_registered())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::ManualInterruptSource;
    use crate::error::EventError;
    use crate::event::Handler;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(fired: &Arc<AtomicUsize>) -> Handler<CancellationEvent> {
        let fired = fired.clone();
        Handler::new(move |_, _| {
            fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_cancel_is_one_shot_until_reset() {
        let guard = CancellationGuard::detached(CancellationConfig::new());
        let fired = Arc::new(AtomicUsize::new(0));
        guard.cancellation_event().add_handler(&counting_handler(&fired));

        let first = guard.token().unwrap();
        assert!(guard.cancel());
        assert!(!guard.cancel());
        assert!(first.is_cancelled());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        guard.reset(false);
        let second = guard.token().unwrap();
        assert!(!second.is_cancelled());
        assert!(!guard.is_cancellation_requested());
        assert!(guard.cancel());
        assert!(second.is_cancelled());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        guard.dispose();
    }

    #[test]
    fn test_interrupt_honours_policy() {
        let source = Arc::new(ManualInterruptSource::new());
        let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
        assert!(guard.is_registered());
        assert_eq!(guard.interrupt_policy(), InterruptPolicy::Terminate);

        assert_eq!(source.raise(), InterruptAction::Terminate);
        assert!(guard.is_cancellation_requested());

        guard.reset(true);
        assert_eq!(source.raise(), InterruptAction::Suppress);
        guard.set_continue_exec(false);
        assert_eq!(source.raise(), InterruptAction::Terminate);
        guard.dispose();
    }

    #[test]
    fn test_interrupt_event_is_marked() {
        let source = Arc::new(ManualInterruptSource::new());
        let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
        let interrupted = Arc::new(AtomicBool::new(false));
        let seen = interrupted.clone();
        guard.cancellation_event().add_handler(&Handler::new(move |_, ev: &CancellationEvent| {
            seen.store(ev.interrupted && ev.token.is_cancelled(), Ordering::SeqCst);
            Ok(())
        }));

        source.raise();
        assert!(interrupted.load(Ordering::SeqCst));
        guard.dispose();
    }

    #[test]
    fn test_dispose_unregisters_and_goes_inert() {
        let source = Arc::new(ManualInterruptSource::new());
        let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
        assert_eq!(source.subscriber_count(), 1);

        guard.dispose();
        guard.dispose();
        assert_eq!(source.subscriber_count(), 0);
        assert!(!guard.is_registered());
        assert!(guard.cancellation_event().is_disposed());
        assert!(!guard.cancel());
        assert!(matches!(guard.token(), Err(EventError::UseAfterDispose { .. })));

        guard.reset(true);
        assert!(!guard.continue_exec());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let source = Arc::new(ManualInterruptSource::new());
        let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
        guard.unregister();
        guard.unregister();
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(source.raise(), InterruptAction::Terminate);
        assert!(!guard.is_cancellation_requested());
        guard.dispose();
    }

    #[test]
    fn test_observer_may_dispose_guard_from_handler() {
        let source = Arc::new(ManualInterruptSource::new());
        let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
        let inner = guard.clone();
        guard.cancellation_event().add_handler(&Handler::new(move |_, _| {
            inner.dispose();
            Ok(())
        }));

        source.raise();
        assert!(guard.is_disposed());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn test_failing_observer_is_swallowed() {
        let guard = CancellationGuard::detached(CancellationConfig::new());
        guard
            .cancellation_event()
            .add_handler(&Handler::new(|_, _| Err("observer failed".into())));
        assert!(guard.cancel());
        assert!(guard.is_cancellation_requested());
        guard.dispose();
    }
}
