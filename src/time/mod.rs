//! Frame pacing for loops that drive a render or simulation step.
//!
//! - [`Tick`] measures the time between the start and end of a frame
//! - [`FrameLimit`] turns a framerate cap into a per-frame time budget
//!
//! # Example
//!
//! ```no_run
//! use runa_io::time::{FrameLimit, Tick};
//! use runa_io::{Loop, RunMode, Timer};
//!
//! let event_loop = Loop::new()?;
//! let limit = FrameLimit::new(60);
//! let mut tick = Tick::new();
//!
//! tick.begin();
//! event_loop.run(RunMode::NoWait)?;
//! tick.end();
//!
//! if let Some(rest) = limit.remaining(&tick) {
//!     let pause = Timer::new(&event_loop)?;
//!     pause.start(|| {}, rest.as_millis() as u64, 0)?;
//!     event_loop.run(RunMode::Default)?;
//! }
//! println!("frame took {:.3}s", tick.delta_secs());
//! # Ok::<(), runa_io::Error>(())
//! ```

mod limit;
mod tick;

pub use limit::FrameLimit;
pub use tick::Tick;
