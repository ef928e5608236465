//! Single-threaded event loop with timers, per-iteration hooks, cross-thread
//! wake-ups, signal handling, a worker pool and asynchronous filesystem
//! requests.
//!
//! Everything attached to a [`Loop`] runs its callbacks on the thread that
//! calls [`Loop::run`]. Blocking work (filesystem calls and [`Work`]) runs on
//! a per-loop thread pool and reports back through the loop.
//!
//! # Architecture
//!
//! - **Loop**: owns the native loop; runs, stops and closes it
//! - **Handle**: `Timer`, `Prepare`, `Idle`, `Check`, `Async` and `Signal`,
//!   all sharing activity, referencing and close semantics
//! - **Work**: a closure offloaded to the pool with an after callback
//! - **fs**: stat, read, write, one-shot and directory requests
//! - **Thread**: OS threads with explicit join/detach
//! - **time**: frame pacing helpers
//!
//! # Example
//! ```no_run
//! use runa_io::{Loop, RunMode, Timer};
//!
//! let event_loop = Loop::new()?;
//! let timer = Timer::new(&event_loop)?;
//! timer.start(|| println!("50ms later"), 50, 0)?;
//!
//! event_loop.run(RunMode::Default)?;
//! # Ok::<(), runa_io::Error>(())
//! ```

#[cfg(not(unix))]
compile_error!("runa-io supports unix targets only");

pub mod error;
pub mod fs;
pub mod time;

mod builder;
mod handle;
mod reactor;
mod runtime;
mod thread;
mod utils;
mod work;

pub use builder::{LoopBuilder, LoopConfig, THREADPOOL_SIZE_ENV};
pub use error::{Error, Result};
pub use handle::{
    Async, AsyncKind, AsyncSender, Check, CheckKind, Handle, HandleKind, Idle, IdleKind, Prepare,
    PrepareKind, Signal, SignalKind, Timer, TimerKind,
};
pub use reactor::core::RunMode;
pub use reactor::handle::{HandleInfo, HandleType};
pub use runtime::{Loop, RawLoop};
pub use thread::{Thread, ThreadOptions};
pub use work::Work;
