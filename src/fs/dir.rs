use crate::error::{EBADF, EBUSY, Error, Result};
use crate::fs::{FsRequest, status, sys};
use crate::runtime::Loop;

use std::cell::RefCell;
use std::ffi::OsString;
use std::fmt;
use std::fs::ReadDir;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirentType {
    Unknown,
    File,
    Dir,
    Link,
    Fifo,
    Socket,
    Char,
    Block,
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: DirentType,
}

impl DirEntry {
    pub(crate) fn from_std(entry: &std::fs::DirEntry) -> Self {
        let kind = match entry.file_type() {
            Ok(t) if t.is_file() => DirentType::File,
            Ok(t) if t.is_dir() => DirentType::Dir,
            Ok(t) if t.is_symlink() => DirentType::Link,
            Ok(t) if t.is_fifo() => DirentType::Fifo,
            Ok(t) if t.is_socket() => DirentType::Socket,
            Ok(t) if t.is_char_device() => DirentType::Char,
            Ok(t) if t.is_block_device() => DirentType::Block,
            _ => DirentType::Unknown,
        };

        Self {
            name: entry.file_name(),
            kind,
        }
    }
}

struct DirState {
    stream: Option<ReadDir>,
    entries: usize,
    closed: bool,
    // Error cut short the last batch; reported by the next `readdir`.
    deferred: Option<isize>,
}

/// An open directory stream from [`FsDir::opendir`].
///
/// The stream closes itself when `readdir` reaches the end or fails, and on
/// `closedir`. Clones share the same stream.
#[derive(Clone)]
pub struct DirHandle {
    inner: Rc<RefCell<DirState>>,
}

impl DirHandle {
    fn new(stream: ReadDir, entries: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DirState {
                stream: Some(stream),
                entries,
                closed: false,
                deferred: None,
            })),
        }
    }

    /// Maximum entries returned per `readdir`.
    pub fn entries(&self) -> usize {
        self.inner.borrow().entries
    }

    pub fn set_entries(&self, entries: usize) {
        self.inner.borrow_mut().entries = entries.max(1);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    fn mark_closed(&self) {
        let stream = {
            let mut state = self.inner.borrow_mut();
            state.closed = true;
            state.stream.take()
        };
        drop(stream);
    }
}

impl fmt::Debug for DirHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("DirHandle")
            .field("entries", &state.entries)
            .field("closed", &state.closed)
            .field("reading", &(state.stream.is_none() && !state.closed))
            .finish()
    }
}

/// Directory operations.
pub struct FsDir {
    req: FsRequest,
}

impl FsDir {
    pub fn new(event_loop: &Loop) -> Self {
        Self {
            req: FsRequest::new(event_loop),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.req.is_busy()
    }

    pub fn mkdir(
        &self,
        path: impl AsRef<Path>,
        mode: u32,
        cb: impl FnOnce(isize) + 'static,
    ) -> Result<()> {
        let path = sys::cpath(path.as_ref())?;
        self.req
            .submit(move || sys::mkdir(&path, mode), move |outcome| cb(status(outcome)))
    }

    pub fn rmdir(&self, path: impl AsRef<Path>, cb: impl FnOnce(isize) + 'static) -> Result<()> {
        let path = sys::cpath(path.as_ref())?;
        self.req
            .submit(move || sys::rmdir(&path), move |outcome| cb(status(outcome)))
    }

    /// Lists a whole directory, sorted by name, without `.` and `..`. The
    /// result is the number of entries.
    ///
    /// `flags` is accepted for compatibility and currently unused.
    pub fn scandir(
        &self,
        path: impl AsRef<Path>,
        _flags: i32,
        cb: impl FnOnce(isize, Vec<DirEntry>) + 'static,
    ) -> Result<()> {
        let path = checked(path.as_ref())?;

        self.req.submit(move || sys::scan(&path), move |outcome| match outcome {
            Ok(Ok(entries)) => cb(entries.len() as isize, entries),
            Ok(Err(code)) | Err(code) => cb(code, Vec::new()),
        })
    }

    /// Opens a directory stream for [`readdir`](Self::readdir).
    pub fn opendir(
        &self,
        path: impl AsRef<Path>,
        cb: impl FnOnce(isize, Option<DirHandle>) + 'static,
    ) -> Result<()> {
        let path = checked(path.as_ref())?;
        let entries = self.req.reactor().config().readdir_entries;

        self.req
            .submit(move || sys::open_dir(&path), move |outcome| match outcome {
                Ok(Ok(stream)) => cb(0, Some(DirHandle::new(stream, entries))),
                Ok(Err(code)) | Err(code) => cb(code, None),
            })
    }

    /// Reads the next batch of entries.
    ///
    /// The result is the number of entries. At the end of the stream, or on
    /// failure, the list is empty, the result is `0` or negative and the
    /// stream is closed. An error hit after part of a batch was read is
    /// reported by the following call. Fails with `EBADF` on a closed stream and with
    /// `EBUSY` while another read of the same stream is pending.
    pub fn readdir(
        &self,
        dir: &DirHandle,
        cb: impl FnOnce(isize, Vec<DirEntry>) + 'static,
    ) -> Result<()> {
        let busy = self.req.acquire()?;
        let (mut stream, limit, deferred) = {
            let mut state = dir.inner.borrow_mut();
            if state.closed {
                return Err(Error::from_status(EBADF));
            }
            let stream = state
                .stream
                .take()
                .ok_or_else(|| Error::from_status(EBUSY))?;
            (stream, state.entries, state.deferred.take())
        };

        let handle = dir.clone();
        let submitted = self.req.submit_as(
            busy,
            move || {
                let batch = match deferred {
                    Some(code) => (Vec::new(), Some(code)),
                    None => sys::read_entries(&mut stream, limit),
                };
                (stream, batch)
            },
            move |outcome| match outcome {
                Ok((stream, (entries, error))) if !entries.is_empty() => {
                    let mut state = handle.inner.borrow_mut();
                    state.stream = Some(stream);
                    state.deferred = error;
                    drop(state);
                    cb(entries.len() as isize, entries);
                }
                Ok((stream, (_, error))) => {
                    drop(stream);
                    handle.mark_closed();
                    cb(error.unwrap_or(0), Vec::new());
                }
                Err(code) => {
                    handle.mark_closed();
                    cb(code, Vec::new());
                }
            },
        );

        if submitted.is_err() {
            dir.mark_closed();
        }
        submitted
    }

    /// Closes a directory stream. Closing a stream that already closed itself
    /// succeeds.
    pub fn closedir(&self, dir: &DirHandle, cb: impl FnOnce(isize) + 'static) -> Result<()> {
        let busy = self.req.acquire()?;
        let stream = {
            let mut state = dir.inner.borrow_mut();
            if !state.closed && state.stream.is_none() {
                return Err(Error::from_status(EBUSY));
            }
            state.closed = true;
            state.stream.take()
        };

        self.req
            .submit_as(busy, move || drop(stream), move |outcome| {
                cb(outcome.err().unwrap_or(0))
            })
    }

    /// Creates a unique directory from `template`, which must end in
    /// `XXXXXX`. The callback receives the created path.
    pub fn mkdtemp(
        &self,
        template: impl AsRef<Path>,
        cb: impl FnOnce(isize, Option<PathBuf>) + 'static,
    ) -> Result<()> {
        let template = sys::cpath(template.as_ref())?;

        self.req
            .submit(move || sys::mkdtemp(&template), move |outcome| match outcome {
                Ok(Ok(path)) => cb(0, Some(path)),
                Ok(Err(code)) | Err(code) => cb(code, None),
            })
    }
}

fn checked(path: &Path) -> Result<PathBuf> {
    sys::cpath(path)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EIO;
    use crate::RunMode;

    #[test]
    fn error_cut_from_a_batch_is_reported_by_the_next_read() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("entry"), b"").unwrap();
        let event_loop = Loop::new().unwrap();
        let dir = FsDir::new(&event_loop);

        let stream = DirHandle::new(sys::open_dir(root.path()).unwrap(), 8);
        stream.inner.borrow_mut().deferred = Some(EIO as isize);

        let outcome = Rc::new(RefCell::new(None));
        let out = outcome.clone();
        dir.readdir(&stream, move |result, entries| {
            *out.borrow_mut() = Some((result, entries.len()));
        })
        .unwrap();
        event_loop.run(RunMode::Default).unwrap();

        assert_eq!(*outcome.borrow(), Some((EIO as isize, 0)));
        assert!(stream.is_closed());
        assert!(stream.inner.borrow().deferred.is_none());
    }
}
