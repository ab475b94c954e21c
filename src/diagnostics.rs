//! Diagnostic sinks for lifecycle and dispatch observability.
//!
//! The core never blocks on, and never fails because of, a diagnostics sink.
//! Every notification is fire-and-forget: a panicking sink is contained and
//! the remaining sinks still receive the event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;

/// Receiver of structured lifecycle and dispatch notifications.
///
/// All methods have empty default implementations so a sink only overrides
/// what it cares about. Calls are made synchronously from the thread that
/// produced the event (for drop-time notifications that may be any thread),
/// so implementations should be cheap.
///
/// # Examples
///
/// ```
/// use ferrous_events::{DiagnosticsSink, Diagnostics, EventConfig, EventContainer};
/// use std::sync::Arc;
///
/// struct LeakReporter;
///
/// impl DiagnosticsSink for LeakReporter {
///     fn finalized_without_dispose(&self, type_name: &str, site: &str) {
///         eprintln!("leaked {} created at {}", type_name, site);
///     }
/// }
///
/// let config = EventConfig::new()
///     .with_diagnostics(Diagnostics::from_sink(Arc::new(LeakReporter)));
/// let container = EventContainer::<u32>::with_config(config);
/// drop(container); // reported as a leak
/// ```
pub trait DiagnosticsSink: Send + Sync {
    /// An object participating in lifecycle tracking was created.
    fn object_created(&self, _type_name: &str) {}

    /// An object was disposed explicitly.
    fn object_disposed(&self, _type_name: &str) {}

    /// An object was released without explicit disposal; the drop safety net
    /// ran its teardown. `site` is the creation location.
    fn finalized_without_dispose(&self, _type_name: &str, _site: &str) {}

    /// Teardown run by the drop safety net panicked.
    fn finalizer_threw(&self, _type_name: &str, _message: &str) {}

    /// One or more asynchronous handlers failed during fan-out.
    fn exception_in_async_handler(&self, _message: &str, _detail: &str) {}
}

/// Cloneable handle fanning notifications out to a set of sinks.
///
/// An empty handle is valid and discards everything.
#[derive(Clone, Default)]
pub struct Diagnostics {
    sinks: Arc<Vec<Arc<dyn DiagnosticsSink>>>,
}

static DEFAULT_SINK: Lazy<ArcSwap<Diagnostics>> =
    Lazy::new(|| ArcSwap::from_pointee(Diagnostics::from_sink(Arc::new(TracingSink::new()))));

/// Replaces the process-wide default diagnostics used by objects created
/// without an explicit configuration.
pub fn set_default_sink(diagnostics: Diagnostics) {
    DEFAULT_SINK.store(Arc::new(diagnostics));
}

/// Returns the process-wide default diagnostics (a [`TracingSink`] unless
/// replaced with [`set_default_sink`]).
pub fn default_diagnostics() -> Diagnostics {
    DEFAULT_SINK.load().as_ref().clone()
}

impl Diagnostics {
    /// Creates a handle with no sinks.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a handle with a single sink.
    pub fn from_sink(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            sinks: Arc::new(vec![sink]),
        }
    }

    /// Returns a new handle with `sink` appended.
    pub fn with_sink(&self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        let mut sinks = self.sinks.as_ref().clone();
        sinks.push(sink);
        Self {
            sinks: Arc::new(sinks),
        }
    }

    /// Returns true if any sink is attached.
    #[inline]
    pub fn has_sinks(&self) -> bool {
        !self.sinks.is_empty()
    }

    #[inline]
    fn each(&self, f: impl Fn(&dyn DiagnosticsSink)) {
        for sink in self.sinks.iter() {
            // Sink failures never propagate into the core.
            let _ = panic::catch_unwind(AssertUnwindSafe(|| f(sink.as_ref())));
        }
    }

    pub(crate) fn object_created(&self, type_name: &str) {
        self.each(|s| s.object_created(type_name));
    }

    pub(crate) fn object_disposed(&self, type_name: &str) {
        self.each(|s| s.object_disposed(type_name));
    }

    pub(crate) fn finalized_without_dispose(&self, type_name: &str, site: &str) {
        self.each(|s| s.finalized_without_dispose(type_name, site));
    }

    pub(crate) fn finalizer_threw(&self, type_name: &str, message: &str) {
        self.each(|s| s.finalizer_threw(type_name, message));
    }

    pub(crate) fn exception_in_async_handler(&self, message: &str, detail: &str) {
        self.each(|s| s.exception_in_async_handler(message, detail));
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Built-in sink that forwards notifications to `tracing`.
///
/// Creation and disposal are emitted at `TRACE`, leaks and finalizer panics
/// at `WARN`, async handler failures at `ERROR`.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    /// Creates a tracing sink.
    pub fn new() -> Self {
        TracingSink
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsSink for TracingSink {
    fn object_created(&self, type_name: &str) {
        tracing::trace!(target: "ferrous_events", type_name, "created");
    }

    fn object_disposed(&self, type_name: &str) {
        tracing::trace!(target: "ferrous_events", type_name, "disposed");
    }

    fn finalized_without_dispose(&self, type_name: &str, site: &str) {
        tracing::warn!(
            target: "ferrous_events",
            type_name,
            site,
            "dropped without dispose"
        );
    }

    fn finalizer_threw(&self, type_name: &str, message: &str) {
        tracing::warn!(target: "ferrous_events", type_name, message, "teardown panicked during drop");
    }

    fn exception_in_async_handler(&self, message: &str, detail: &str) {
        tracing::error!(target: "ferrous_events", detail, "{}", message);
    }
}

/// Sink that counts notifications, useful for leak checks and tests.
#[derive(Default)]
pub struct CountingSink {
    created: AtomicU64,
    disposed: AtomicU64,
    finalized: AtomicU64,
    finalizer_panics: AtomicU64,
    async_faults: AtomicU64,
    last_async_detail: parking_lot::Mutex<Option<String>>,
}

impl CountingSink {
    /// Creates a new counting sink.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> u64 {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn finalized(&self) -> u64 {
        self.finalized.load(Ordering::SeqCst)
    }

    pub fn finalizer_panics(&self) -> u64 {
        self.finalizer_panics.load(Ordering::SeqCst)
    }

    pub fn async_faults(&self) -> u64 {
        self.async_faults.load(Ordering::SeqCst)
    }

    /// Objects created but neither disposed nor finalized yet.
    pub fn live(&self) -> u64 {
        self.created()
            .saturating_sub(self.disposed() + self.finalized())
    }

    /// Detail text of the most recent async handler failure.
    pub fn last_async_detail(&self) -> Option<String> {
        self.last_async_detail.lock().clone()
    }

    /// Resets all counters.
    pub fn reset(&self) {
        self.created.store(0, Ordering::SeqCst);
        self.disposed.store(0, Ordering::SeqCst);
        self.finalized.store(0, Ordering::SeqCst);
        self.finalizer_panics.store(0, Ordering::SeqCst);
        self.async_faults.store(0, Ordering::SeqCst);
        *self.last_async_detail.lock() = None;
    }
}

impl DiagnosticsSink for CountingSink {
    fn object_created(&self, _type_name: &str) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn object_disposed(&self, _type_name: &str) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }

    fn finalized_without_dispose(&self, _type_name: &str, _site: &str) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
    }

    fn finalizer_threw(&self, _type_name: &str, _message: &str) {
        self.finalizer_panics.fetch_add(1, Ordering::SeqCst);
    }

    fn exception_in_async_handler(&self, _message: &str, detail: &str) {
        *self.last_async_detail.lock() = Some(detail.to_string());
        self.async_faults.fetch_add(1, Ordering::SeqCst);
    }
}
