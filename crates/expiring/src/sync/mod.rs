//! Async synchronization primitives used by the caches.

pub mod gate;

pub use gate::AsyncGate;
