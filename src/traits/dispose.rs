//! Disposal trait for objects with exactly-once teardown.

use crate::lifecycle::{DisposalState, Lifecycle};

/// Trait for objects with structured, exactly-once teardown.
///
/// Implementors expose their [`Lifecycle`] and a [`teardown`](Self::teardown)
/// hook; the provided [`dispose`](Self::dispose) is the idempotent public
/// entry point. Types composed of other disposables chain by calling the
/// parts' `teardown` (or `dispose`) from their own hook.
///
/// To get the drop-time safety net, forward `Drop` to
/// [`Lifecycle::finalize`] with the same teardown.
///
/// # Examples
///
/// ```
/// use ferrous_events::{Dispose, Lifecycle, Diagnostics, DisposalState};
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// struct Connection {
///     lifecycle: Lifecycle,
///     closed: AtomicU32,
/// }
///
/// impl Dispose for Connection {
///     fn lifecycle(&self) -> &Lifecycle {
///         &self.lifecycle
///     }
///
///     fn teardown(&self) {
///         self.closed.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// impl Drop for Connection {
///     fn drop(&mut self) {
///         self.lifecycle.finalize(|| self.teardown());
///     }
/// }
///
/// let conn = Connection {
///     lifecycle: Lifecycle::new::<Connection>(Diagnostics::none()),
///     closed: AtomicU32::new(0),
/// };
/// conn.dispose();
/// conn.dispose();
/// assert_eq!(conn.closed.load(Ordering::SeqCst), 1);
/// assert_eq!(conn.disposal_state(), DisposalState::Disposed);
/// ```
pub trait Dispose {
    /// Lifecycle bookkeeping backing this object.
    fn lifecycle(&self) -> &Lifecycle;

    /// Releases resources. Runs at most once, from either `dispose` or the
    /// drop safety net.
    fn teardown(&self);

    /// Disposes the object. Only the first call has any effect.
    fn dispose(&self) {
        self.lifecycle().dispose(|| self.teardown());
    }

    fn is_disposed(&self) -> bool {
        self.lifecycle().is_disposed()
    }

    fn disposal_state(&self) -> DisposalState {
        self.lifecycle().state()
    }
}
