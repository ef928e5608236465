use crate::error::Result;
use crate::fs::{Busy, FsRequest, sys};
use crate::reactor::core::Reactor;
use crate::runtime::Loop;

use std::ffi::CStr;
use std::os::unix::io::RawFd;
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

type ChunkCallback = Box<dyn FnMut(isize, &[u8])>;

/// File reads.
///
/// # Example
/// ```no_run
/// use runa_io::fs::FsRead;
/// use runa_io::{Loop, RunMode};
///
/// let event_loop = Loop::new()?;
/// let request = FsRead::new(&event_loop);
/// let mut contents = Vec::new();
/// request.read_path("/etc/hosts", move |result, chunk| {
///     if result > 0 {
///         contents.extend_from_slice(chunk);
///     } else {
///         println!("done ({result}): {} bytes", contents.len());
///     }
/// })?;
///
/// event_loop.run(RunMode::Default)?;
/// # Ok::<(), runa_io::Error>(())
/// ```
pub struct FsRead {
    req: FsRequest,
}

impl FsRead {
    pub fn new(event_loop: &Loop) -> Self {
        Self {
            req: FsRequest::new(event_loop),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.req.is_busy()
    }

    /// Streams a whole file through `cb`.
    ///
    /// Every chunk arrives as `cb(n, chunk)` with `n > 0`. The stream ends
    /// with exactly one terminal `cb(0, &[])` at end of file or
    /// `cb(negative, &[])` on failure. Chunks are sized by the file's block
    /// size. The file is opened and closed by the request; it is already
    /// closed when the terminal callback runs.
    pub fn read_path(
        &self,
        path: impl AsRef<Path>,
        cb: impl FnMut(isize, &[u8]) + 'static,
    ) -> Result<()> {
        let path = sys::cpath(path.as_ref())?;
        let busy = self.req.acquire()?;

        let chain = ReadChain {
            reactor: self.req.reactor().clone(),
            cb: Box::new(cb),
            busy,
        };
        let fallback = chain.reactor.config().read_chunk_size;

        self.req.reactor().submit(
            move || open_for_read(&path, fallback),
            move |outcome: std::result::Result<sys::SysResult<(RawFd, usize)>, i32>| {
                match outcome {
                    Ok(Ok((fd, chunk))) => {
                        log::trace!("streaming fd {fd} in {chunk} byte chunks");
                        chain.read_next(fd, vec![0; chunk]);
                    }
                    Ok(Err(code)) => chain.fail(code),
                    Err(code) => chain.fail(code as isize),
                }
            },
        )?;
        Ok(())
    }

    /// Reads up to `size` bytes from `fd` at `offset`, or from the current
    /// position if `offset` is negative. `cb` receives the byte count (`0` at
    /// end of file) and the bytes read.
    pub fn read(
        &self,
        fd: RawFd,
        size: usize,
        offset: i64,
        cb: impl FnOnce(isize, &[u8]) + 'static,
    ) -> Result<()> {
        self.req.submit(
            move || {
                let mut buffer = vec![0; size];
                let n = sys::read(fd, &mut buffer, offset);
                (buffer, n)
            },
            move |outcome| match outcome {
                Ok((buffer, n)) if n >= 0 => cb(n, &buffer[..n as usize]),
                Ok((_, code)) | Err(code) => cb(code, &[]),
            },
        )
    }
}

fn open_for_read(path: &CStr, fallback: usize) -> sys::SysResult<(RawFd, usize)> {
    let fd = sys::open(path, libc::O_RDONLY, 0);
    if fd < 0 {
        return Err(fd);
    }
    let fd = fd as RawFd;

    match sys::fstat(fd) {
        Ok(stat) if stat.blksize > 0 => Ok((fd, stat.blksize as usize)),
        Ok(_) => Ok((fd, fallback)),
        Err(code) => {
            sys::close(fd);
            Err(code)
        }
    }
}

/// A streaming read in progress. The buffer travels to the pool and back
/// with every chunk.
struct ReadChain {
    reactor: Rc<Reactor>,
    cb: ChunkCallback,
    busy: Busy,
}

impl ReadChain {
    fn read_next(self, fd: RawFd, mut buffer: Vec<u8>) {
        let reactor = self.reactor.clone();
        // Held outside the completion too, so a rejected submission can still
        // end the stream.
        let pending = Rc::new(Cell::new(Some(self)));
        let chain = pending.clone();

        let submitted = reactor.submit(
            move || {
                let n = sys::read(fd, &mut buffer, -1);
                (buffer, n)
            },
            move |outcome| {
                let Some(mut chain) = chain.take() else {
                    return;
                };
                match outcome {
                    Ok((buffer, n)) if n > 0 => {
                        (chain.cb)(n, &buffer[..n as usize]);
                        chain.read_next(fd, buffer);
                    }
                    Ok((_, n)) => chain.finish(fd, n),
                    Err(code) => chain.finish(fd, code as isize),
                }
            },
        );

        if let Err(err) = submitted {
            log::error!("streaming read of fd {fd} aborted: {err}");
            if let Some(chain) = pending.take() {
                chain.finish(fd, err.code() as isize);
            }
        }
    }

    fn finish(self, fd: RawFd, result: isize) {
        let closed = sys::close(fd);
        if closed < 0 {
            log::warn!("closing fd {fd} after streaming read failed: {closed}");
        }
        self.fail(result);
    }

    fn fail(self, result: isize) {
        let ReadChain { mut cb, busy, .. } = self;
        drop(busy);
        cb(result, &[]);
    }
}
