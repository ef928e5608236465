//! One-shot filesystem operations.
//!
//! An [`FsOp`] is consumed by the operation it runs and released once its
//! callback returns, so it cannot be reused or forgotten mid-flight.

use crate::error::Result;
use crate::fs::{FsRequest, sys};
use crate::runtime::Loop;

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

/// `copyfile` flag: fail with `EEXIST` if the destination exists.
pub const COPYFILE_EXCL: i32 = 1;

/// The operation an [`FsCompletion`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Open,
    Close,
    Unlink,
    Rename,
    Chmod,
    Fchmod,
    Fsync,
    Fdatasync,
    Ftruncate,
    Copyfile,
    Utime,
    Access,
    Symlink,
    Readlink,
}

/// Outcome of an [`FsOp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCompletion {
    pub kind: FsKind,
    /// Non-negative on success (the descriptor for `Open`), negative errno
    /// on failure.
    pub result: isize,
    /// The path the operation was given, if any.
    pub path: Option<PathBuf>,
    /// The second path of `Rename`, `Copyfile` and `Symlink`, or the link
    /// target read by `Readlink`.
    pub payload: Option<PathBuf>,
}

pub struct FsOp {
    req: FsRequest,
}

impl FsOp {
    pub fn new(event_loop: &Loop) -> Self {
        Self {
            req: FsRequest::new(event_loop),
        }
    }

    fn run<W>(
        self,
        kind: FsKind,
        path: Option<PathBuf>,
        payload: Option<PathBuf>,
        work: W,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()>
    where
        W: FnOnce() -> (isize, Option<PathBuf>) + Send + 'static,
    {
        self.req.submit(work, move |outcome| {
            let (result, target) = outcome.unwrap_or_else(|code| (code, None));
            cb(&FsCompletion {
                kind,
                result,
                path,
                payload: target.or(payload),
            });
        })
    }

    /// Opens `path`; the completion's `result` is the new descriptor.
    pub fn open(
        self,
        path: impl AsRef<Path>,
        flags: i32,
        mode: u32,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let cpath = sys::cpath(&path)?;
        self.run(
            FsKind::Open,
            Some(path),
            None,
            move || (sys::open(&cpath, flags, mode), None),
            cb,
        )
    }

    pub fn close(self, fd: RawFd, cb: impl FnOnce(&FsCompletion) + 'static) -> Result<()> {
        self.run(FsKind::Close, None, None, move || (sys::close(fd), None), cb)
    }

    pub fn unlink(self, path: impl AsRef<Path>, cb: impl FnOnce(&FsCompletion) + 'static) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let cpath = sys::cpath(&path)?;
        self.run(FsKind::Unlink, Some(path), None, move || (sys::unlink(&cpath), None), cb)
    }

    pub fn rename(
        self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()> {
        let (from, to) = (from.as_ref().to_path_buf(), to.as_ref().to_path_buf());
        let (cfrom, cto) = (sys::cpath(&from)?, sys::cpath(&to)?);
        self.run(FsKind::Rename, Some(from), Some(to), move || (sys::rename(&cfrom, &cto), None), cb)
    }

    pub fn chmod(
        self,
        path: impl AsRef<Path>,
        mode: u32,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let cpath = sys::cpath(&path)?;
        self.run(FsKind::Chmod, Some(path), None, move || (sys::chmod(&cpath, mode), None), cb)
    }

    pub fn fchmod(self, fd: RawFd, mode: u32, cb: impl FnOnce(&FsCompletion) + 'static) -> Result<()> {
        self.run(FsKind::Fchmod, None, None, move || (sys::fchmod(fd, mode), None), cb)
    }

    pub fn fsync(self, fd: RawFd, cb: impl FnOnce(&FsCompletion) + 'static) -> Result<()> {
        self.run(FsKind::Fsync, None, None, move || (sys::fsync(fd), None), cb)
    }

    /// Flushes file data but not necessarily metadata. Falls back to `fsync`
    /// where `fdatasync` is unavailable.
    pub fn fdatasync(self, fd: RawFd, cb: impl FnOnce(&FsCompletion) + 'static) -> Result<()> {
        self.run(FsKind::Fdatasync, None, None, move || (sys::fdatasync(fd), None), cb)
    }

    pub fn ftruncate(self, fd: RawFd, len: u64, cb: impl FnOnce(&FsCompletion) + 'static) -> Result<()> {
        self.run(FsKind::Ftruncate, None, None, move || (sys::ftruncate(fd, len), None), cb)
    }

    /// Copies a file. `flags` may contain [`COPYFILE_EXCL`].
    pub fn copyfile(
        self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
        flags: i32,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()> {
        let (from, to) = (from.as_ref().to_path_buf(), to.as_ref().to_path_buf());
        sys::cpath(&from)?;
        sys::cpath(&to)?;

        let (src, dst) = (from.clone(), to.clone());
        let exclusive = flags & COPYFILE_EXCL != 0;
        self.run(
            FsKind::Copyfile,
            Some(from),
            Some(to),
            move || (sys::copyfile(&src, &dst, exclusive), None),
            cb,
        )
    }

    /// Sets access and modification times, in seconds since the epoch.
    pub fn utime(
        self,
        path: impl AsRef<Path>,
        atime: f64,
        mtime: f64,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let cpath = sys::cpath(&path)?;
        self.run(FsKind::Utime, Some(path), None, move || (sys::utime(&cpath, atime, mtime), None), cb)
    }

    /// Checks accessibility; `mode` is a mask of `libc::{F_OK, R_OK, W_OK,
    /// X_OK}`.
    pub fn access(
        self,
        path: impl AsRef<Path>,
        mode: i32,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let cpath = sys::cpath(&path)?;
        self.run(FsKind::Access, Some(path), None, move || (sys::access(&cpath, mode), None), cb)
    }

    /// Creates `link` pointing at `target`.
    pub fn symlink(
        self,
        target: impl AsRef<Path>,
        link: impl AsRef<Path>,
        cb: impl FnOnce(&FsCompletion) + 'static,
    ) -> Result<()> {
        let (target, link) = (target.as_ref().to_path_buf(), link.as_ref().to_path_buf());
        let (ctarget, clink) = (sys::cpath(&target)?, sys::cpath(&link)?);
        self.run(
            FsKind::Symlink,
            Some(target),
            Some(link),
            move || (sys::symlink(&ctarget, &clink), None),
            cb,
        )
    }

    /// Reads a symlink; the target arrives in the completion's `payload`.
    pub fn readlink(self, path: impl AsRef<Path>, cb: impl FnOnce(&FsCompletion) + 'static) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let cpath = sys::cpath(&path)?;
        let work = move || match sys::readlink(&cpath) {
            Ok(target) => (0, Some(target)),
            Err(code) => (code, None),
        };
        self.run(FsKind::Readlink, Some(path), None, work, cb)
    }
}
