//! Loop ownership and the machinery behind asynchronous requests.

mod core;
pub(crate) mod pool;
pub(crate) mod queue;

pub use core::{Loop, RawLoop};
