//! Event containers and their subscribers.

#[cfg(feature = "async")]
mod async_dispatch;
mod container;
mod handler;

pub use container::{
    ContainerId, EventConsumer, EventContainer, EventContainerInstance, EventProducer,
};
pub use handler::{AsyncEventHandler, AsyncHandler, Handler, Sender};
