//! Exactly-once state transitions and the drop-time safety net.
//!
//! [`TransitionGuard`] is the single atomic primitive behind both disposal
//! and cancellation. [`Lifecycle`] layers disposal state, diagnostics and
//! the safety net on top of it for any object that needs teardown.

use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::diagnostics::Diagnostics;
use crate::error::{EventError, EventResult};
use crate::internal::panic_message;

const CLEAR: u32 = 0;
const SET: u32 = 1;

/// One-shot atomic flag: exactly one caller wins the `0 → 1` transition.
///
/// # Examples
///
/// ```
/// use ferrous_events::TransitionGuard;
///
/// let guard = TransitionGuard::new();
/// assert!(guard.try_begin());
/// assert!(!guard.try_begin());
///
/// guard.reset();
/// assert!(guard.try_begin());
/// ```
#[derive(Debug, Default)]
pub struct TransitionGuard {
    flag: AtomicU32,
}

impl TransitionGuard {
    /// Creates a guard in the clear state.
    pub const fn new() -> Self {
        Self {
            flag: AtomicU32::new(CLEAR),
        }
    }

    /// Attempts the transition. Returns true for exactly one caller across
    /// all concurrent and later callers until [`reset`](Self::reset).
    #[inline]
    pub fn try_begin(&self) -> bool {
        self.flag
            .compare_exchange(CLEAR, SET, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true once the transition has happened.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire) == SET
    }

    /// Re-arms the guard. Only meaningful for rearmable state such as a
    /// cancellation arm cycle; disposal never resets.
    #[inline]
    pub fn reset(&self) {
        self.flag.store(CLEAR, Ordering::Release);
    }
}

/// Disposal state of a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub enum DisposalState {
    /// Not yet disposed.
    Active,
    /// Disposed explicitly.
    Disposed,
    /// Released without explicit disposal; teardown ran from `Drop`.
    Finalized,
}

impl DisposalState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => DisposalState::Active,
            1 => DisposalState::Disposed,
            _ => DisposalState::Finalized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DisposalState::Active => 0,
            DisposalState::Disposed => 1,
            DisposalState::Finalized => 2,
        }
    }
}

/// Disposal bookkeeping for one object.
///
/// Explicit [`dispose`](Self::dispose) and the drop-time
/// [`finalize`](Self::finalize) compete on the same [`TransitionGuard`]; the
/// loser is a pure no-op, so an explicit dispose always wins over a later
/// drop.
///
/// `is_disposed` flips as soon as a transition begins, which is what
/// dispatch checks. `state` only leaves `Active` once teardown has finished.
pub struct Lifecycle {
    guard: TransitionGuard,
    state: AtomicU8,
    type_name: &'static str,
    site: &'static Location<'static>,
    diagnostics: Diagnostics,
}

impl Lifecycle {
    /// Creates lifecycle tracking for an object of type `T` and reports its
    /// creation. The caller's location is recorded for leak reports.
    #[track_caller]
    pub fn new<T: ?Sized>(diagnostics: Diagnostics) -> Self {
        Self::named(std::any::type_name::<T>(), diagnostics)
    }

    /// Like [`new`](Self::new) with an explicit type name.
    #[track_caller]
    pub fn named(type_name: &'static str, diagnostics: Diagnostics) -> Self {
        diagnostics.object_created(type_name);
        Self {
            guard: TransitionGuard::new(),
            state: AtomicU8::new(DisposalState::Active.as_u8()),
            type_name,
            site: Location::caller(),
            diagnostics,
        }
    }

    /// Claims the disposal transition without running anything.
    #[inline]
    pub fn try_begin_dispose(&self) -> bool {
        self.guard.try_begin()
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.guard.is_set()
    }

    pub fn state(&self) -> DisposalState {
        DisposalState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Fails with [`EventError::UseAfterDispose`] once disposal has begun.
    pub fn ensure_active(&self) -> EventResult<()> {
        if self.is_disposed() {
            Err(EventError::UseAfterDispose {
                type_name: self.type_name,
            })
        } else {
            Ok(())
        }
    }

    /// Runs `teardown` if this is the first disposal. Returns true if it ran.
    ///
    /// A panic in `teardown` propagates to the caller; the object is still
    /// marked [`DisposalState::Disposed`] and reported as disposed.
    pub fn dispose(&self, teardown: impl FnOnce()) -> bool {
        if !self.try_begin_dispose() {
            return false;
        }
        let _complete = CompleteDispose(self);
        teardown();
        true
    }

    /// Drop-time safety net. Runs `teardown` only if nobody disposed the
    /// object explicitly, reports the leak, and contains any panic.
    pub fn finalize(&self, teardown: impl FnOnce()) -> bool {
        if !self.try_begin_dispose() {
            return false;
        }
        let site = self.site.to_string();
        self.diagnostics
            .finalized_without_dispose(self.type_name, &site);

        // Never unwind out of Drop.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(teardown)) {
            let message = panic_message(payload.as_ref());
            self.diagnostics.finalizer_threw(self.type_name, &message);
        }
        self.state
            .store(DisposalState::Finalized.as_u8(), Ordering::Release);
        true
    }
}

/// Publishes the disposed state when dropped, including during unwinding.
struct CompleteDispose<'a>(&'a Lifecycle);

impl Drop for CompleteDispose<'_> {
    fn drop(&mut self) {
        let lifecycle = self.0;
        lifecycle
            .state
            .store(DisposalState::Disposed.as_u8(), Ordering::Release);
        lifecycle.diagnostics.object_disposed(lifecycle.type_name);
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("type_name", &self.type_name)
            .field("state", &self.state())
            .field("site", &format_args!("{}", self.site))
            .finish()
    }
}
