use runa_io::error::{EBADF, ENOENT};
use runa_io::fs::{FsStat, Stat, StatFs};
use runa_io::{Loop, RunMode};
use std::cell::RefCell;
use std::os::unix::io::AsRawFd;
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type Outcome<T> = Rc<RefCell<Option<(isize, Option<T>)>>>;

fn capture<T: Copy + 'static>() -> (Outcome<T>, impl FnOnce(isize, Option<&T>) + 'static) {
    let outcome: Outcome<T> = Rc::new(RefCell::new(None));
    let out = outcome.clone();
    (outcome, move |result: isize, value: Option<&T>| {
        *out.borrow_mut() = Some((result, value.copied()));
    })
}

#[test]
fn stat_reports_file_metadata() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, b"twelve bytes").unwrap();
    let event_loop = Loop::new().unwrap();
    let request = FsStat::new(&event_loop);

    let (outcome, cb) = capture::<Stat>();
    request.stat(&path, cb).unwrap();
    assert!(request.is_busy());
    assert!(!event_loop.run(RunMode::Default).unwrap());

    let (result, stat) = outcome.borrow_mut().take().unwrap();
    let stat = stat.unwrap();
    assert_eq!(result, 0);
    assert_eq!(stat.size, 12);
    assert!(stat.is_file());
    assert!(!stat.is_dir());
    assert!(stat.nlink >= 1);
}

#[test]
fn missing_path_delivers_negative_result() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let event_loop = Loop::new().unwrap();
    let request = FsStat::new(&event_loop);

    let (outcome, cb) = capture::<Stat>();
    request.stat(dir.path().join("absent"), cb).unwrap();
    event_loop.run(RunMode::Default).expect("failures reach the callback only");

    assert_eq!(*outcome.borrow(), Some((ENOENT as isize, None)));
}

#[test]
fn lstat_does_not_follow_symlinks() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target");
    let link = dir.path().join("link");
    std::fs::create_dir(&target).unwrap();
    std::os::unix::fs::symlink(&target, &link).unwrap();
    let event_loop = Loop::new().unwrap();
    let request = FsStat::new(&event_loop);

    let (outcome, cb) = capture::<Stat>();
    request.lstat(&link, cb).unwrap();
    event_loop.run(RunMode::Default).unwrap();
    let linked = outcome.borrow_mut().take().unwrap().1.unwrap();
    assert!(linked.is_symlink());

    let (outcome, cb) = capture::<Stat>();
    request.stat(&link, cb).unwrap();
    event_loop.run(RunMode::Default).unwrap();
    let followed = outcome.borrow_mut().take().unwrap().1.unwrap();
    assert!(followed.is_dir());
}

#[test]
fn fstat_uses_an_open_descriptor() {
    init_logging();
    let file = tempfile::tempfile().unwrap();
    file.set_len(1024).unwrap();
    let event_loop = Loop::new().unwrap();
    let request = FsStat::new(&event_loop);

    let (outcome, cb) = capture::<Stat>();
    request.fstat(file.as_raw_fd(), cb).unwrap();
    event_loop.run(RunMode::Default).unwrap();
    let (result, stat) = outcome.borrow_mut().take().unwrap();
    assert_eq!(result, 0);
    assert_eq!(stat.unwrap().size, 1024);

    let (outcome, cb) = capture::<Stat>();
    request.fstat(-1, cb).unwrap();
    event_loop.run(RunMode::Default).unwrap();
    assert_eq!(*outcome.borrow(), Some((EBADF as isize, None)));
}

#[test]
fn statfs_reports_the_filesystem() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let event_loop = Loop::new().unwrap();
    let request = FsStat::new(&event_loop);

    let (outcome, cb) = capture::<StatFs>();
    request.statfs(dir.path(), cb).unwrap();
    event_loop.run(RunMode::Default).unwrap();

    let (result, statfs) = outcome.borrow_mut().take().unwrap();
    assert_eq!(result, 0);
    let statfs = statfs.unwrap();
    assert!(statfs.bsize > 0);
    assert!(statfs.blocks > 0);
}
