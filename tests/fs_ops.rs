use runa_io::error::{EEXIST, ENOENT};
use runa_io::fs::{COPYFILE_EXCL, FsCompletion, FsKind, FsOp};
use runa_io::{Loop, RunMode};
use std::cell::RefCell;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Runs one consuming operation to completion and returns what it reported.
fn complete(
    event_loop: &Loop,
    submit: impl FnOnce(FsOp, Box<dyn FnOnce(&FsCompletion)>) -> runa_io::Result<()>,
) -> FsCompletion {
    let slot = Rc::new(RefCell::new(None));
    let out = slot.clone();

    submit(
        FsOp::new(event_loop),
        Box::new(move |completion: &FsCompletion| {
            *out.borrow_mut() = Some(completion.clone());
        }),
    )
    .unwrap();
    event_loop.run(RunMode::Default).unwrap();

    let completion = slot.borrow_mut().take();
    completion.expect("callback fired exactly once")
}

#[test]
fn open_then_close() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("opened");
    let event_loop = Loop::new().unwrap();

    let opened = complete(&event_loop, |op, cb| {
        op.open(&path, libc::O_CREAT | libc::O_RDWR, 0o600, cb)
    });
    assert_eq!(opened.kind, FsKind::Open);
    assert!(opened.result >= 0);
    assert_eq!(opened.path.as_deref(), Some(path.as_path()));

    let fd = opened.result as i32;
    let closed = complete(&event_loop, |op, cb| op.close(fd, cb));
    assert_eq!(closed.kind, FsKind::Close);
    assert_eq!(closed.result, 0);
    assert!(path.exists());
}

#[test]
fn rename_and_unlink() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let from = dir.path().join("from");
    let to = dir.path().join("to");
    std::fs::write(&from, b"x").unwrap();
    let event_loop = Loop::new().unwrap();

    let renamed = complete(&event_loop, |op, cb| op.rename(&from, &to, cb));
    assert_eq!(renamed.result, 0);
    assert_eq!(renamed.payload.as_deref(), Some(to.as_path()));
    assert!(!from.exists() && to.exists());

    let removed = complete(&event_loop, |op, cb| op.unlink(&to, cb));
    assert_eq!(removed.result, 0);

    let again = complete(&event_loop, |op, cb| op.unlink(&to, cb));
    assert_eq!(again.kind, FsKind::Unlink);
    assert_eq!(again.result, ENOENT as isize);
}

#[test]
fn permissions_and_descriptor_operations() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perm");
    std::fs::write(&path, b"0123456789").unwrap();
    let event_loop = Loop::new().unwrap();

    let chmod = complete(&event_loop, |op, cb| op.chmod(&path, 0o640, cb));
    assert_eq!(chmod.result, 0);
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);

    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    let fd = file.as_raw_fd();

    assert_eq!(complete(&event_loop, |op, cb| op.fchmod(fd, 0o600, cb)).result, 0);
    assert_eq!(complete(&event_loop, |op, cb| op.ftruncate(fd, 4, cb)).result, 0);
    assert_eq!(complete(&event_loop, |op, cb| op.fsync(fd, cb)).result, 0);
    assert_eq!(complete(&event_loop, |op, cb| op.fdatasync(fd, cb)).result, 0);

    let metadata = std::fs::metadata(&path).unwrap();
    assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    assert_eq!(metadata.len(), 4);
}

#[test]
fn copyfile_respects_exclusive_flag() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    std::fs::write(&src, b"copy me").unwrap();
    let event_loop = Loop::new().unwrap();

    let copied = complete(&event_loop, |op, cb| op.copyfile(&src, &dst, 0, cb));
    assert_eq!(copied.kind, FsKind::Copyfile);
    assert_eq!(copied.result, 0);
    assert_eq!(std::fs::read(&dst).unwrap(), b"copy me");

    let refused = complete(&event_loop, |op, cb| {
        op.copyfile(&src, &dst, COPYFILE_EXCL, cb)
    });
    assert_eq!(refused.result, EEXIST as isize);
}

#[test]
fn utime_sets_modification_time() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dated");
    std::fs::write(&path, b"").unwrap();
    let event_loop = Loop::new().unwrap();

    let done = complete(&event_loop, |op, cb| {
        op.utime(&path, 1_000_000.0, 1_500_000.5, cb)
    });
    assert_eq!(done.result, 0);

    use std::os::unix::fs::MetadataExt;
    let metadata = std::fs::metadata(&path).unwrap();
    assert_eq!(metadata.mtime(), 1_500_000);
    assert_eq!(metadata.atime(), 1_000_000);
}

#[test]
fn access_checks_existence() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let event_loop = Loop::new().unwrap();

    let present = complete(&event_loop, |op, cb| op.access(dir.path(), libc::F_OK, cb));
    assert_eq!(present.result, 0);

    let absent = dir.path().join("absent");
    let missing = complete(&event_loop, |op, cb| op.access(&absent, libc::F_OK, cb));
    assert_eq!(missing.kind, FsKind::Access);
    assert_eq!(missing.result, ENOENT as isize);
}

#[test]
fn symlink_and_readlink() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let target = PathBuf::from("pointed-at");
    let link = dir.path().join("link");
    let event_loop = Loop::new().unwrap();

    let linked = complete(&event_loop, |op, cb| op.symlink(&target, &link, cb));
    assert_eq!(linked.kind, FsKind::Symlink);
    assert_eq!(linked.result, 0);

    let read = complete(&event_loop, |op, cb| op.readlink(&link, cb));
    assert_eq!(read.kind, FsKind::Readlink);
    assert_eq!(read.result, 0);
    assert_eq!(read.payload, Some(target));

    let not_a_link = complete(&event_loop, |op, cb| op.readlink(dir.path(), cb));
    assert!(not_a_link.result < 0);
    assert_eq!(not_a_link.payload, None);
}
