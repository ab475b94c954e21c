//! Cooperative cancellation.
//!
//! [`CancellationToken`] is the one-shot signal work polls or awaits.
//! [`CancellationGuard`] bridges an [`InterruptSource`] to a token plus an
//! observer event, re-armable with [`CancellationGuard::reset`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::internal::panic_message;
use crate::lifecycle::TransitionGuard;

pub mod guard;
pub mod interrupt;

pub use guard::{CancellationEvent, CancellationGuard};
pub use interrupt::{InterruptAction, InterruptHandler, InterruptSource, ManualInterruptSource, SubscriptionId};
#[cfg(feature = "signal")]
pub use interrupt::CtrlCInterruptSource;

type CancelCallback = Box<dyn FnOnce() + Send>;

/// A one-shot signal that cooperative work can poll, await or register
/// callbacks on. Once cancelled it stays cancelled; re-arming means creating
/// a new token.
///
/// # Examples
///
/// ```
/// use ferrous_events::CancellationToken;
///
/// let token = CancellationToken::new();
/// let child = token.child_token();
///
/// assert!(token.cancel());
/// assert!(!token.cancel()); // already cancelled
/// assert!(child.is_cancelled());
/// assert!(child.throw_if_cancelled().is_err());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

struct CancellationTokenInner {
    guard: TransitionGuard,
    parent: Option<CancellationToken>,
    created_at: Instant,
    callbacks: Mutex<Vec<(u64, CancelCallback)>>,
    next_callback: AtomicU64,
    #[cfg(feature = "async")]
    notify: tokio::sync::Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<CancellationToken>) -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                guard: TransitionGuard::new(),
                parent,
                created_at: Instant::now(),
                callbacks: Mutex::new(Vec::new()),
                next_callback: AtomicU64::new(0),
                #[cfg(feature = "async")]
                notify: tokio::sync::Notify::new(),
            }),
        }
    }

    /// Creates a child token, cancelled when this token is cancelled.
    /// Cancelling the child does not affect the parent.
    pub fn child_token(&self) -> Self {
        let child = Self::with_parent(Some(self.clone()));
        let weak: Weak<CancellationTokenInner> = Arc::downgrade(&child.inner);
        self.on_cancel(move || {
            if let Some(inner) = weak.upgrade() {
                CancellationToken { inner }.cancel();
            }
        });
        child
    }

    /// Cancels the token and runs its callbacks. Returns true for the call
    /// that performed the cancellation.
    pub fn cancel(&self) -> bool {
        if !self.inner.guard.try_begin() {
            return false;
        }
        run_callbacks(self.take_callbacks());
        self.wake();
        true
    }

    /// Like [`cancel`](Self::cancel), but runs the callbacks on the blocking
    /// pool and waits for them.
    #[cfg(feature = "async")]
    pub async fn cancel_async(&self) -> bool {
        if !self.inner.guard.try_begin() {
            return false;
        }
        let callbacks = self.take_callbacks();
        if !callbacks.is_empty() {
            if let Err(error) = tokio::task::spawn_blocking(move || run_callbacks(callbacks)).await {
                tracing::error!(%error, "cancellation callbacks did not complete");
            }
        }
        self.wake();
        true
    }

    fn take_callbacks(&self) -> Vec<(u64, CancelCallback)> {
        std::mem::take(&mut *self.inner.callbacks.lock())
    }

    fn wake(&self) {
        #[cfg(feature = "async")]
        self.inner.notify.notify_waiters();
    }

    /// Returns true if cancellation has been requested on this token or any
    /// ancestor.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.guard.is_set() {
            return true;
        }
        match self.inner.parent {
            Some(ref parent) => parent.is_cancelled(),
            None => false,
        }
    }

    /// Registers `callback` to run once on cancellation. If the token is
    /// already cancelled the callback runs immediately on this thread.
    pub fn on_cancel<F>(&self, callback: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.inner.next_callback.fetch_add(1, Ordering::Relaxed);
        {
            let mut callbacks = self.inner.callbacks.lock();
            if !self.inner.guard.is_set() {
                callbacks.push((id, Box::new(callback)));
                return CancelRegistration {
                    token: Arc::downgrade(&self.inner),
                    id,
                };
            }
        }
        callback();
        CancelRegistration {
            token: Weak::new(),
            id,
        }
    }

    /// # Errors
    ///
    /// Returns [`CancellationError`] if the token is cancelled.
    pub fn throw_if_cancelled(&self) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::new("Operation was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Completes when cancellation is requested.
    ///
    /// ```
    /// use ferrous_events::CancellationToken;
    ///
    /// # async fn example() {
    /// let token = CancellationToken::new();
    /// tokio::select! {
    ///     _ = some_operation() => {}
    ///     _ = token.cancelled() => {}
    /// }
    /// # }
    /// # async fn some_operation() {}
    /// ```
    #[cfg(feature = "async")]
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Creates a token that cancels itself after `timeout`. Must be called
    /// within a tokio runtime.
    #[cfg(feature = "async")]
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            token_clone.cancel();
        });
        token
    }

    /// Time since this token was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }
}

fn run_callbacks(callbacks: Vec<(u64, CancelCallback)>) {
    for (_, callback) in callbacks {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            tracing::error!(
                error = %panic_message(payload.as_ref()),
                "cancellation callback panicked"
            );
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

/// Handle to a callback registered with [`CancellationToken::on_cancel`].
#[derive(Debug)]
pub struct CancelRegistration {
    token: Weak<CancellationTokenInner>,
    id: u64,
}

impl CancelRegistration {
    /// Removes the callback if it has not run yet. Returns true if removed.
    pub fn unregister(&self) -> bool {
        let Some(inner) = self.token.upgrade() else {
            return false;
        };
        let mut callbacks = inner.callbacks.lock();
        match callbacks.iter().position(|(id, _)| *id == self.id) {
            Some(index) => {
                drop(callbacks.remove(index));
                true
            }
            None => false,
        }
    }
}

/// Error returned when an operation observes cancellation.
#[derive(Debug, Clone, Error)]
#[error("Cancellation error: {message}")]
pub struct CancellationError {
    message: String,
}

impl CancellationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
