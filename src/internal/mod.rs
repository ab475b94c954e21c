//! Internal implementation details.

pub(crate) mod forwarding;
pub(crate) mod panic;

pub(crate) use forwarding::ForwardGuard;
pub(crate) use panic::panic_message;
