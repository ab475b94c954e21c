//! Core traits shared by containers, registries and guards.

mod dispose;

pub use dispose::Dispose;
