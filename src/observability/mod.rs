//! Logging setup for services that validate their responses.
//!
//! The validation core never logs. The router adapter emits `tracing` events
//! (`debug` on route setup, `warn` on rejected responses, `error` when a body
//! cannot be buffered); [`init_tracing`] installs a subscriber for them.

mod tracing_init;

pub use tracing_init::*;
