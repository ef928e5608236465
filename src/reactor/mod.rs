//! The native loop underneath [`Loop`](crate::Loop).
//!
//! - [`core`]: the reactor itself, with the run phases, timers and requests
//! - [`event`]: the wake pipe and the `poll(2)` wait
//! - [`handle`]: registry entries for timers, hooks, async and signal handles
//! - [`signal`]: process-wide signal routing into loop wake pipes

pub(crate) mod core;
pub(crate) mod event;
pub(crate) mod handle;
pub(crate) mod signal;
