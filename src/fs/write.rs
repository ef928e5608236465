use crate::error::Result;
use crate::fs::{FsRequest, status, sys};
use crate::runtime::Loop;

use std::ffi::CStr;
use std::os::unix::io::RawFd;
use std::path::Path;

const FILE_MODE: u32 = 0o644;

/// File writes.
///
/// The data is copied on submission, so the caller's buffer is free as soon
/// as the call returns.
pub struct FsWrite {
    req: FsRequest,
}

impl FsWrite {
    pub fn new(event_loop: &Loop) -> Self {
        Self {
            req: FsRequest::new(event_loop),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.req.is_busy()
    }

    /// Opens `path` with `flags`, writes all of `data` and closes the file.
    ///
    /// `O_WRONLY` is added when `flags` carries no access mode, and created
    /// files get mode `0o644`. `cb` receives the number of bytes written or
    /// the first error.
    pub fn write_path(
        &self,
        path: impl AsRef<Path>,
        data: &[u8],
        flags: i32,
        cb: impl FnOnce(isize) + 'static,
    ) -> Result<()> {
        let path = sys::cpath(path.as_ref())?;
        let data = data.to_vec();
        let flags = with_write_access(flags);

        self.req
            .submit(move || write_file(&path, &data, flags), move |outcome| {
                cb(status(outcome))
            })
    }

    /// Appends `data` to `path`, creating the file if needed.
    pub fn append(
        &self,
        path: impl AsRef<Path>,
        data: &[u8],
        cb: impl FnOnce(isize) + 'static,
    ) -> Result<()> {
        self.write_path(
            path,
            data,
            libc::O_CREAT | libc::O_WRONLY | libc::O_APPEND,
            cb,
        )
    }

    /// Writes `data` to an open descriptor at `offset`, or at the current
    /// position if `offset` is negative.
    pub fn write(
        &self,
        fd: RawFd,
        data: &[u8],
        offset: i64,
        cb: impl FnOnce(isize) + 'static,
    ) -> Result<()> {
        let data = data.to_vec();

        self.req
            .submit(move || sys::write_all(fd, &data, offset), move |outcome| {
                cb(status(outcome))
            })
    }
}

fn with_write_access(flags: i32) -> i32 {
    if flags & libc::O_ACCMODE == libc::O_RDONLY {
        flags | libc::O_WRONLY
    } else {
        flags
    }
}

fn write_file(path: &CStr, data: &[u8], flags: i32) -> isize {
    let fd = sys::open(path, flags, FILE_MODE);
    if fd < 0 {
        return fd;
    }
    let fd = fd as RawFd;

    let written = sys::write_all(fd, data, -1);
    let closed = sys::close(fd);

    if written >= 0 && closed < 0 {
        closed
    } else {
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_access_is_added_only_when_missing() {
        assert_eq!(with_write_access(libc::O_CREAT), libc::O_CREAT | libc::O_WRONLY);
        assert_eq!(with_write_access(libc::O_RDWR), libc::O_RDWR);
        assert_eq!(
            with_write_access(libc::O_WRONLY | libc::O_TRUNC),
            libc::O_WRONLY | libc::O_TRUNC
        );
    }
}
