use crate::error::Result;
use crate::fs::{FsRequest, sys};
use crate::runtime::Loop;

use std::os::unix::io::RawFd;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

/// File metadata as reported by `stat(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub dev: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub ino: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

impl Stat {
    pub(crate) fn from_raw(raw: &libc::stat) -> Self {
        Self {
            dev: raw.st_dev as u64,
            mode: raw.st_mode as u32,
            nlink: raw.st_nlink as u64,
            uid: raw.st_uid,
            gid: raw.st_gid,
            rdev: raw.st_rdev as u64,
            ino: raw.st_ino as u64,
            size: raw.st_size as u64,
            blksize: raw.st_blksize as u64,
            blocks: raw.st_blocks as u64,
            atime: Timespec {
                sec: raw.st_atime as i64,
                nsec: raw.st_atime_nsec as i64,
            },
            mtime: Timespec {
                sec: raw.st_mtime as i64,
                nsec: raw.st_mtime_nsec as i64,
            },
            ctime: Timespec {
                sec: raw.st_ctime as i64,
                nsec: raw.st_ctime_nsec as i64,
            },
        }
    }

    fn file_type(&self) -> u32 {
        self.mode & libc::S_IFMT as u32
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == libc::S_IFREG as u32
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == libc::S_IFDIR as u32
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == libc::S_IFLNK as u32
    }

    /// Permission bits, without the file type.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Filesystem statistics as reported by `statfs(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFs {
    pub fs_type: u64,
    pub bsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
}

impl StatFs {
    pub(crate) fn from_raw(raw: &libc::statfs) -> Self {
        Self {
            fs_type: raw.f_type as u64,
            bsize: raw.f_bsize as u64,
            blocks: raw.f_blocks as u64,
            bfree: raw.f_bfree as u64,
            bavail: raw.f_bavail as u64,
            files: raw.f_files as u64,
            ffree: raw.f_ffree as u64,
        }
    }
}

/// Metadata queries.
///
/// Callbacks receive the status and, on success only, the result struct.
pub struct FsStat {
    req: FsRequest,
}

impl FsStat {
    pub fn new(event_loop: &Loop) -> Self {
        Self {
            req: FsRequest::new(event_loop),
        }
    }

    /// Whether a query is in flight.
    pub fn is_busy(&self) -> bool {
        self.req.is_busy()
    }

    pub fn stat(
        &self,
        path: impl AsRef<Path>,
        cb: impl FnOnce(isize, Option<&Stat>) + 'static,
    ) -> Result<()> {
        let path = sys::cpath(path.as_ref())?;
        self.query(move || sys::stat(&path), cb)
    }

    /// Like [`stat`](Self::stat), but does not follow a final symlink.
    pub fn lstat(
        &self,
        path: impl AsRef<Path>,
        cb: impl FnOnce(isize, Option<&Stat>) + 'static,
    ) -> Result<()> {
        let path = sys::cpath(path.as_ref())?;
        self.query(move || sys::lstat(&path), cb)
    }

    pub fn fstat(&self, fd: RawFd, cb: impl FnOnce(isize, Option<&Stat>) + 'static) -> Result<()> {
        self.query(move || sys::fstat(fd), cb)
    }

    pub fn statfs(
        &self,
        path: impl AsRef<Path>,
        cb: impl FnOnce(isize, Option<&StatFs>) + 'static,
    ) -> Result<()> {
        let path = sys::cpath(path.as_ref())?;
        self.query(move || sys::statfs(&path), cb)
    }

    fn query<T, W>(&self, work: W, cb: impl FnOnce(isize, Option<&T>) + 'static) -> Result<()>
    where
        T: Send + 'static,
        W: FnOnce() -> sys::SysResult<T> + Send + 'static,
    {
        self.req.submit(work, move |outcome| match outcome {
            Ok(Ok(value)) => cb(0, Some(&value)),
            Ok(Err(code)) | Err(code) => cb(code, None),
        })
    }
}
