use runa_io::error::{EBADF, EEXIST, EINVAL, ENOENT};
use runa_io::fs::{DirEntry, DirHandle, DirentType, FsDir};
use runa_io::{Loop, LoopBuilder, RunMode};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn names(entries: &[DirEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| entry.name.to_string_lossy().into_owned())
        .collect()
}

fn status_of(event_loop: &Loop, submit: impl FnOnce(Box<dyn FnOnce(isize)>)) -> isize {
    let status = Rc::new(Cell::new(isize::MIN));
    let out = status.clone();
    submit(Box::new(move |result| out.set(result)));
    event_loop.run(RunMode::Default).unwrap();
    status.get()
}

#[test]
fn mkdir_and_rmdir() {
    init_logging();
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join("made");
    let event_loop = Loop::new().unwrap();
    let dir = FsDir::new(&event_loop);

    let made = status_of(&event_loop, |cb| dir.mkdir(&path, 0o755, cb).unwrap());
    assert_eq!(made, 0);
    assert!(path.is_dir());

    let again = status_of(&event_loop, |cb| dir.mkdir(&path, 0o755, cb).unwrap());
    assert_eq!(again, EEXIST as isize);

    let removed = status_of(&event_loop, |cb| dir.rmdir(&path, cb).unwrap());
    assert_eq!(removed, 0);
    assert!(!path.exists());
}

#[test]
fn scandir_lists_sorted_entries() {
    init_logging();
    let root = tempfile::tempdir().unwrap();
    for name in ["c", "a", "b"] {
        std::fs::write(root.path().join(name), name).unwrap();
    }
    std::fs::create_dir(root.path().join("sub")).unwrap();
    let event_loop = Loop::new().unwrap();
    let dir = FsDir::new(&event_loop);

    let listed = Rc::new(RefCell::new(None));
    let out = listed.clone();
    dir.scandir(root.path(), 0, move |result, entries| {
        *out.borrow_mut() = Some((result, entries));
    })
    .unwrap();
    event_loop.run(RunMode::Default).unwrap();

    let (result, entries) = listed.borrow_mut().take().unwrap();
    assert_eq!(result, 4);
    assert_eq!(names(&entries), ["a", "b", "c", "sub"]);
    assert_eq!(entries[0].kind, DirentType::File);
    assert_eq!(entries[3].kind, DirentType::Dir);
}

#[test]
fn scandir_of_missing_directory_fails() {
    init_logging();
    let root = tempfile::tempdir().unwrap();
    let event_loop = Loop::new().unwrap();
    let dir = FsDir::new(&event_loop);

    let listed = Rc::new(RefCell::new(None));
    let out = listed.clone();
    dir.scandir(root.path().join("absent"), 0, move |result, entries| {
        *out.borrow_mut() = Some((result, entries.len()));
    })
    .unwrap();
    event_loop.run(RunMode::Default).unwrap();

    assert_eq!(*listed.borrow(), Some((ENOENT as isize, 0)));
}

fn open(event_loop: &Loop, dir: &FsDir, path: &std::path::Path) -> DirHandle {
    let opened = Rc::new(RefCell::new(None));
    let out = opened.clone();
    dir.opendir(path, move |result, handle| {
        assert_eq!(result, 0);
        *out.borrow_mut() = handle;
    })
    .unwrap();
    event_loop.run(RunMode::Default).unwrap();

    let handle = opened.borrow_mut().take();
    handle.expect("opendir succeeded")
}

#[test]
fn readdir_streams_in_batches_then_closes() {
    init_logging();
    let root = tempfile::tempdir().unwrap();
    for i in 0..5 {
        std::fs::write(root.path().join(format!("f{i}")), b"").unwrap();
    }
    let event_loop = Loop::new().unwrap();
    let dir = FsDir::new(&event_loop);

    let stream = open(&event_loop, &dir, root.path());
    assert!(!stream.is_closed());
    stream.set_entries(2);
    assert_eq!(stream.entries(), 2);

    let mut seen = Vec::new();
    let mut batches = Vec::new();
    loop {
        let batch = Rc::new(RefCell::new((isize::MIN, Vec::new())));
        let out = batch.clone();
        dir.readdir(&stream, move |result, entries| {
            *out.borrow_mut() = (result, entries);
        })
        .unwrap();
        event_loop.run(RunMode::Default).unwrap();

        let (result, entries) = std::mem::take(&mut *batch.borrow_mut());
        assert_eq!(result, entries.len() as isize);
        batches.push(result);
        if result == 0 {
            break;
        }
        seen.extend(names(&entries));
    }

    assert_eq!(batches, [2, 2, 1, 0]);
    seen.sort();
    assert_eq!(seen, ["f0", "f1", "f2", "f3", "f4"]);
    assert!(stream.is_closed());

    let err = dir.readdir(&stream, |_, _| panic!("no callback")).unwrap_err();
    assert_eq!(err.code(), EBADF);

    let closed = status_of(&event_loop, |cb| dir.closedir(&stream, cb).unwrap());
    assert_eq!(closed, 0);
}

#[test]
fn closedir_releases_an_open_stream() {
    init_logging();
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("only"), b"").unwrap();
    let event_loop = LoopBuilder::new().readdir_entries(8).build().unwrap();
    let dir = FsDir::new(&event_loop);

    let stream = open(&event_loop, &dir, root.path());
    assert_eq!(stream.entries(), 8);

    let closed = status_of(&event_loop, |cb| dir.closedir(&stream, cb).unwrap());
    assert_eq!(closed, 0);
    assert!(stream.is_closed());
    assert_eq!(
        dir.readdir(&stream, |_, _| {}).unwrap_err().code(),
        EBADF
    );
}

#[test]
fn mkdtemp_creates_unique_directories() {
    init_logging();
    let root = tempfile::tempdir().unwrap();
    let template = root.path().join("tmp-XXXXXX");
    let event_loop = Loop::new().unwrap();
    let dir = FsDir::new(&event_loop);

    let created = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..2 {
        let out = created.clone();
        dir.mkdtemp(&template, move |result, path| {
            assert_eq!(result, 0);
            out.borrow_mut().extend(path);
        })
        .unwrap();
        event_loop.run(RunMode::Default).unwrap();
    }

    let created = created.borrow();
    assert_eq!(created.len(), 2);
    assert_ne!(created[0], created[1]);
    for path in created.iter() {
        assert!(path.is_dir());
        assert!(path.starts_with(root.path()));
    }

    let rejected = Rc::new(Cell::new(0));
    let out = rejected.clone();
    dir.mkdtemp(root.path().join("no-placeholder"), move |result, path| {
        assert!(path.is_none());
        out.set(result);
    })
    .unwrap();
    event_loop.run(RunMode::Default).unwrap();
    assert_eq!(rejected.get(), EINVAL as isize);
}
