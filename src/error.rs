//! Error types for event dispatch and lifecycle management.

use thiserror::Error;

/// Error produced by a synchronous or asynchronous event handler.
///
/// Handlers are free to return any error type; it is boxed so that the
/// original error reaches the `invoke` caller unmodified.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Event framework errors
///
/// Represents the conditions that are surfaced to callers. Faults inside
/// async handlers and inside drop-time teardown never appear here; they are
/// reported to the diagnostics sink instead.
///
/// # Examples
///
/// ```rust
/// use ferrous_events::{EventCollection, EventContainer, EventError};
///
/// struct Ping;
///
/// let collection = EventCollection::new();
/// collection.add_event(EventContainer::<Ping>::new()).unwrap();
///
/// match collection.add_event(EventContainer::<Ping>::new()) {
///     Err(EventError::DuplicateEvent { message_type }) => {
///         assert!(message_type.ends_with("Ping"));
///     }
///     _ => unreachable!(),
/// }
/// ```
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
    /// A container for this message type is already registered
    #[error("Duplicate event container for message type: {message_type}")]
    DuplicateEvent { message_type: &'static str },
    /// The same synchronous handler was registered twice on the async path
    #[error("Duplicate async handler for message type: {message_type}")]
    DuplicateAsyncHandler { message_type: &'static str },
    /// Operation is defined to fail once the target has been disposed
    #[error("Use after dispose: {type_name}")]
    UseAfterDispose { type_name: &'static str },
    /// A synchronous handler failed; dispatch stopped at that handler
    #[error("Handler failed: {0}")]
    Handler(#[source] HandlerError),
    /// No tokio runtime was reachable for asynchronous fan-out
    #[error("No async runtime available for fan-out dispatch")]
    NoRuntime,
}

impl EventError {
    /// Returns true for configuration errors (duplicate registrations).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EventError::DuplicateEvent { .. } | EventError::DuplicateAsyncHandler { .. }
        )
    }
}

/// Aggregate failure of several concurrently awaited handlers.
///
/// Produced by async fan-out; each entry describes one failed handler
/// (its error message or panic message).
#[derive(Debug, Error)]
#[error("{} handler(s) failed: {}", .failures.len(), .failures.join("; "))]
pub struct AggregateHandlerError {
    pub failures: Vec<String>,
}

/// Result type for event operations
///
/// A convenience alias for `Result<T, EventError>` used throughout the crate.
pub type EventResult<T> = Result<T, EventError>;
