//! # ferrous-events
//!
//! Concurrency-safe, in-process publish/subscribe dispatch with exactly-once
//! disposal and one-shot cancellation.
//!
//! ## Features
//!
//! - **Typed events**: one [`EventContainer<T>`] per message type, with
//!   ordered synchronous subscribers and fire-and-forget async subscribers
//! - **Lock-free dispatch**: `invoke` works on an atomic snapshot of the
//!   subscriber lists; registration is copy-on-write
//! - **Self-healing wiring**: a producer wired to a consumer unwires itself
//!   when the consumer is disposed, and never keeps it alive
//! - **Exactly-once teardown**: [`Dispose`] runs teardown once no matter how
//!   many threads race, with a drop-time safety net that reports leaks
//! - **Cancellation**: [`CancellationGuard`] turns an external interrupt into
//!   a one-shot [`CancellationToken`] plus an observer event
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_events::{EventCollection, EventContainer, Handler, Sender};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct TemperatureChanged(f32);
//!
//! // A component exposes the events it consumes through a collection.
//! let readings = Arc::new(Mutex::new(Vec::new()));
//! let sink = readings.clone();
//! let consumers = EventCollection::new();
//! consumers.add_handler(&Handler::new(move |_, ev: &TemperatureChanged| {
//!     sink.lock().unwrap().push(ev.0);
//!     Ok(())
//! }));
//!
//! // A producer elsewhere is wired into it.
//! let producer = EventContainer::<TemperatureChanged>::new();
//! consumers.connect(&producer);
//!
//! assert!(producer.invoke(&Sender::none(), TemperatureChanged(21.5)).unwrap());
//! assert_eq!(*readings.lock().unwrap(), vec![21.5]);
//!
//! // Disposing the consumer side removes the wiring automatically.
//! consumers.dispose();
//! assert!(!producer.invoke_message(TemperatureChanged(22.0)).unwrap());
//! producer.dispose();
//! ```
//!
//! ## Disposal
//!
//! Every container, collection and guard carries a [`Lifecycle`]. Explicit
//! `dispose()` runs teardown once; dropping the last handle without
//! disposing runs the same teardown from `Drop` and reports the leak,
//! including the creation site, to the configured [`DiagnosticsSink`].
//!
//! ## Cargo features
//!
//! - `async` (default): async subscribers and fan-out on tokio
//! - `signal`: [`CtrlCInterruptSource`]
//! - `config`: serde support for settings

// Module declarations
pub mod cancellation;
pub mod collection;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod key;
pub mod lifecycle;
pub mod traits;

// Internal modules
mod internal;

// Re-exports
pub use cancellation::{
    CancelRegistration, CancellationError, CancellationEvent, CancellationGuard, CancellationToken,
    InterruptAction, InterruptHandler, InterruptSource, ManualInterruptSource, SubscriptionId,
};
#[cfg(feature = "signal")]
pub use cancellation::CtrlCInterruptSource;
pub use collection::{BindingSet, EventBinding, EventCollection, HandlerBinding};
pub use config::{
    CancellationConfig, DispatchSettings, DuplicateAsyncPolicy, EventConfig, InterruptPolicy,
};
pub use diagnostics::{CountingSink, Diagnostics, DiagnosticsSink, TracingSink};
pub use error::{AggregateHandlerError, EventError, EventResult, HandlerError, HandlerResult};
pub use event::{
    AsyncEventHandler, AsyncHandler, ContainerId, EventConsumer, EventContainer,
    EventContainerInstance, EventProducer, Handler, Sender,
};
pub use key::{key_of_message, EventKey};
pub use lifecycle::{DisposalState, Lifecycle, TransitionGuard};
pub use traits::Dispose;
