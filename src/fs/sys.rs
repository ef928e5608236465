//! Blocking syscalls behind the filesystem requests.
//!
//! These run on pool threads. They never fail with an [`Error`]; they return
//! the status the callback receives, negative errno on failure.

use crate::error::{EEXIST, EINTR, EINVAL, EIO, Error, Result, last_status};
use crate::fs::dir::DirEntry;
use crate::fs::stat::{Stat, StatFs};

use std::ffi::{CStr, CString, OsString};
use std::fs::ReadDir;
use std::io;
use std::mem;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

pub(crate) type SysResult<T> = std::result::Result<T, isize>;

/// Validates and converts a path for the C side.
pub(crate) fn cpath(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidArgument("path contains a nul byte"))
}

fn check(ret: libc::c_int) -> isize {
    if ret < 0 {
        last_status() as isize
    } else {
        ret as isize
    }
}

fn io_status(err: &io::Error) -> isize {
    -(err.raw_os_error().unwrap_or(libc::EIO) as isize)
}

pub(crate) fn open(path: &CStr, flags: i32, mode: u32) -> isize {
    check(unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC, mode as libc::c_uint) })
}

pub(crate) fn close(fd: RawFd) -> isize {
    check(unsafe { libc::close(fd) })
}

/// One read; a negative `offset` reads from the current position.
pub(crate) fn read(fd: RawFd, buffer: &mut [u8], offset: i64) -> isize {
    loop {
        let n = unsafe {
            if offset < 0 {
                libc::read(fd, buffer.as_mut_ptr().cast(), buffer.len())
            } else {
                libc::pread(
                    fd,
                    buffer.as_mut_ptr().cast(),
                    buffer.len(),
                    offset as libc::off_t,
                )
            }
        };

        if n >= 0 {
            return n;
        }

        let code = last_status();
        if code != EINTR {
            return code as isize;
        }
    }
}

/// Writes all of `data`, returning the byte count or the first error.
pub(crate) fn write_all(fd: RawFd, data: &[u8], offset: i64) -> isize {
    let mut written = 0usize;

    while written < data.len() {
        let rest = &data[written..];
        let n = unsafe {
            if offset < 0 {
                libc::write(fd, rest.as_ptr().cast(), rest.len())
            } else {
                libc::pwrite(
                    fd,
                    rest.as_ptr().cast(),
                    rest.len(),
                    (offset + written as i64) as libc::off_t,
                )
            }
        };

        if n < 0 {
            let code = last_status();
            if code == EINTR {
                continue;
            }
            return code as isize;
        }
        if n == 0 {
            return EIO as isize;
        }

        written += n as usize;
    }

    written as isize
}

pub(crate) fn stat(path: &CStr) -> SysResult<Stat> {
    let mut raw: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::stat(path.as_ptr(), &mut raw) } < 0 {
        return Err(last_status() as isize);
    }
    Ok(Stat::from_raw(&raw))
}

pub(crate) fn lstat(path: &CStr) -> SysResult<Stat> {
    let mut raw: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::lstat(path.as_ptr(), &mut raw) } < 0 {
        return Err(last_status() as isize);
    }
    Ok(Stat::from_raw(&raw))
}

pub(crate) fn fstat(fd: RawFd) -> SysResult<Stat> {
    let mut raw: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut raw) } < 0 {
        return Err(last_status() as isize);
    }
    Ok(Stat::from_raw(&raw))
}

pub(crate) fn statfs(path: &CStr) -> SysResult<StatFs> {
    let mut raw: libc::statfs = unsafe { mem::zeroed() };
    if unsafe { libc::statfs(path.as_ptr(), &mut raw) } < 0 {
        return Err(last_status() as isize);
    }
    Ok(StatFs::from_raw(&raw))
}

pub(crate) fn unlink(path: &CStr) -> isize {
    check(unsafe { libc::unlink(path.as_ptr()) })
}

pub(crate) fn rename(from: &CStr, to: &CStr) -> isize {
    check(unsafe { libc::rename(from.as_ptr(), to.as_ptr()) })
}

pub(crate) fn chmod(path: &CStr, mode: u32) -> isize {
    check(unsafe { libc::chmod(path.as_ptr(), mode as libc::mode_t) })
}

pub(crate) fn fchmod(fd: RawFd, mode: u32) -> isize {
    check(unsafe { libc::fchmod(fd, mode as libc::mode_t) })
}

pub(crate) fn fsync(fd: RawFd) -> isize {
    check(unsafe { libc::fsync(fd) })
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub(crate) fn fdatasync(fd: RawFd) -> isize {
    check(unsafe { libc::fdatasync(fd) })
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub(crate) fn fdatasync(fd: RawFd) -> isize {
    fsync(fd)
}

pub(crate) fn ftruncate(fd: RawFd, len: u64) -> isize {
    check(unsafe { libc::ftruncate(fd, len as libc::off_t) })
}

pub(crate) fn mkdir(path: &CStr, mode: u32) -> isize {
    check(unsafe { libc::mkdir(path.as_ptr(), mode as libc::mode_t) })
}

pub(crate) fn rmdir(path: &CStr) -> isize {
    check(unsafe { libc::rmdir(path.as_ptr()) })
}

pub(crate) fn access(path: &CStr, mode: i32) -> isize {
    check(unsafe { libc::access(path.as_ptr(), mode) })
}

pub(crate) fn symlink(target: &CStr, link: &CStr) -> isize {
    check(unsafe { libc::symlink(target.as_ptr(), link.as_ptr()) })
}

pub(crate) fn readlink(path: &CStr) -> SysResult<PathBuf> {
    let mut buffer = vec![0u8; libc::PATH_MAX as usize];
    let n = unsafe { libc::readlink(path.as_ptr(), buffer.as_mut_ptr().cast(), buffer.len()) };
    if n < 0 {
        return Err(last_status() as isize);
    }

    buffer.truncate(n as usize);
    Ok(PathBuf::from(OsString::from_vec(buffer)))
}

/// Sets access and modification times, given in seconds since the epoch.
pub(crate) fn utime(path: &CStr, atime: f64, mtime: f64) -> isize {
    fn timeval(secs: f64) -> libc::timeval {
        let whole = secs.floor();
        libc::timeval {
            tv_sec: whole as libc::time_t,
            tv_usec: ((secs - whole) * 1_000_000.0) as libc::suseconds_t,
        }
    }

    let times = [timeval(atime), timeval(mtime)];
    check(unsafe { libc::utimes(path.as_ptr(), times.as_ptr()) })
}

/// Copies `from` to `to`. With `exclusive`, an existing `to` fails with
/// `EEXIST`.
pub(crate) fn copyfile(from: &Path, to: &Path, exclusive: bool) -> isize {
    if exclusive && to.symlink_metadata().is_ok() {
        return EEXIST as isize;
    }

    match std::fs::copy(from, to) {
        Ok(_) => 0,
        Err(err) => io_status(&err),
    }
}

/// Creates a unique directory from a template ending in `XXXXXX`.
pub(crate) fn mkdtemp(template: &CStr) -> SysResult<PathBuf> {
    let mut buffer = template.to_bytes_with_nul().to_vec();
    if !template.to_bytes().ends_with(b"XXXXXX") {
        return Err(EINVAL as isize);
    }

    let ret = unsafe { libc::mkdtemp(buffer.as_mut_ptr().cast()) };
    if ret.is_null() {
        return Err(last_status() as isize);
    }

    buffer.pop();
    Ok(PathBuf::from(OsString::from_vec(buffer)))
}

pub(crate) fn open_dir(path: &Path) -> SysResult<ReadDir> {
    std::fs::read_dir(path).map_err(|err| io_status(&err))
}

/// Reads up to `limit` entries. An error after some entries were read ends
/// the batch early and is returned next to them; the stream yields nothing
/// after an error.
pub(crate) fn read_entries(stream: &mut ReadDir, limit: usize) -> (Vec<DirEntry>, Option<isize>) {
    let mut entries = Vec::new();

    for entry in stream.by_ref().take(limit) {
        match entry {
            Ok(entry) => entries.push(DirEntry::from_std(&entry)),
            Err(err) => return (entries, Some(io_status(&err))),
        }
    }

    (entries, None)
}

/// All entries of a directory, sorted by name.
pub(crate) fn scan(path: &Path) -> SysResult<Vec<DirEntry>> {
    let mut stream = open_dir(path)?;
    let (mut entries, error) = read_entries(&mut stream, usize::MAX);
    if let Some(code) = error {
        return Err(code);
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
