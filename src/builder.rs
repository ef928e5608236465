//! Fluent builder and configuration for [`Loop`] construction.

use crate::error::Result;
use crate::runtime::Loop;

/// Environment variable overriding the worker pool size.
pub const THREADPOOL_SIZE_ENV: &str = "RUNA_THREADPOOL_SIZE";

const DEFAULT_THREADPOOL_SIZE: usize = 4;
const MAX_THREADPOOL_SIZE: usize = 1024;
const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_READDIR_ENTRIES: usize = 32;

/// Tunables of one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Worker threads backing `Work` and filesystem requests.
    pub threadpool_size: usize,
    /// Chunk size for streaming reads when `fstat` reports no block size.
    pub read_chunk_size: usize,
    /// Entries returned per `FsDir::readdir` call unless the handle says
    /// otherwise.
    pub readdir_entries: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            threadpool_size: DEFAULT_THREADPOOL_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            readdir_entries: DEFAULT_READDIR_ENTRIES,
        }
    }
}

impl LoopConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_threadpool_size(std::env::var(THREADPOOL_SIZE_ENV).ok().as_deref());
        config
    }

    fn apply_threadpool_size(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            return;
        };

        match value.trim().parse::<usize>() {
            Ok(size) => self.threadpool_size = clamp_pool_size(size),
            Err(_) => {
                log::warn!("ignoring {THREADPOOL_SIZE_ENV}={value:?}: not a positive integer");
            }
        }
    }
}

fn clamp_pool_size(size: usize) -> usize {
    size.clamp(1, MAX_THREADPOOL_SIZE)
}

/// Builder for constructing [`Loop`] instances.
///
/// # Example
/// ```no_run
/// use runa_io::{LoopBuilder, RunMode};
///
/// let event_loop = LoopBuilder::new().threadpool_size(2).build()?;
/// event_loop.run(RunMode::NoWait)?;
/// # Ok::<(), runa_io::Error>(())
/// ```
pub struct LoopBuilder {
    config: LoopConfig,
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopBuilder {
    /// Starts from [`LoopConfig::from_env`].
    pub fn new() -> Self {
        Self {
            config: LoopConfig::from_env(),
        }
    }

    /// Starts from an explicit configuration, ignoring the environment.
    pub fn with_config(config: LoopConfig) -> Self {
        Self { config }
    }

    /// Sets the worker pool size (clamped to `1..=1024`).
    pub fn threadpool_size(mut self, size: usize) -> Self {
        self.config.threadpool_size = clamp_pool_size(size);
        self
    }

    /// Sets the fallback chunk size of streaming reads.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    /// Sets the default number of entries per `readdir` call.
    pub fn readdir_entries(mut self, entries: usize) -> Self {
        self.config.readdir_entries = entries.max(1);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Creates the loop. Fails if the native loop cannot be initialised.
    pub fn build(self) -> Result<Loop> {
        Loop::with_config(self.config)
    }
}
