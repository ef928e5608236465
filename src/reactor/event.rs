use libc::{F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, O_NONBLOCK, POLLIN, fcntl, pollfd};
use std::io;
use std::os::unix::io::RawFd;

/// Byte written to the wake pipe for plain wake-ups. Signal deliveries write
/// the signal number instead, which is never zero.
pub(crate) const WAKE_BYTE: u8 = 0;

/// Self-pipe used to interrupt a blocking poll from another thread or from a
/// signal handler.
///
/// The read end is the loop's backend descriptor: it becomes readable
/// whenever an async notification, a pool completion or a signal is waiting.
pub(crate) struct WakePipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl WakePipe {
    pub(crate) fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let pipe = Self {
            read_fd: fds[0],
            write_fd: fds[1],
        };

        for fd in fds {
            set_nonblocking(fd)?;
            set_cloexec(fd)?;
        }

        Ok(pipe)
    }

    pub(crate) fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    pub(crate) fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    /// Wakes the loop. A full pipe already guarantees a wake-up, so a failed
    /// write is not an error.
    pub(crate) fn wake(&self) {
        let byte = WAKE_BYTE;
        unsafe {
            libc::write(self.write_fd, &byte as *const u8 as *const _, 1);
        }
    }

    /// Empties the pipe, collecting the signal numbers found in it.
    ///
    /// Returns whether anything was read.
    pub(crate) fn drain(&self, signals: &mut Vec<u8>) -> bool {
        let mut buf = [0u8; 256];
        let mut any = false;

        loop {
            let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n <= 0 {
                break;
            }

            any = true;
            signals.extend(buf[..n as usize].iter().copied().filter(|&b| b != WAKE_BYTE));

            if (n as usize) < buf.len() {
                break;
            }
        }

        any
    }
}

impl Drop for WakePipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

/// Waits until `fd` is readable or `timeout_ms` elapses (`-1` waits forever).
///
/// Returns `true` when the descriptor is readable. An interrupted wait counts
/// as a timeout so the caller simply runs another iteration.
pub(crate) fn wait_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut event = pollfd {
        fd,
        events: POLLIN,
        revents: 0,
    };

    let n = unsafe { libc::poll(&mut event, 1, timeout_ms) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            return Ok(false);
        }
        return Err(err);
    }

    Ok(n > 0 && event.revents & POLLIN != 0)
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 || unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 || unsafe { fcntl(fd, F_SETFD, flags | FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
