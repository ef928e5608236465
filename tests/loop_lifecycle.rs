use runa_io::error::{EBUSY, EINVAL};
use runa_io::{
    Async, HandleType, Idle, Loop, LoopBuilder, LoopConfig, RunMode, Timer, Work,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn empty_loop_returns_immediately() {
    init_logging();
    let event_loop = Loop::new().expect("loop");

    assert!(!event_loop.is_alive());
    assert!(!event_loop.run(RunMode::Default).unwrap());
    assert!(!event_loop.run(RunMode::Once).unwrap());
    assert!(!event_loop.run(RunMode::NoWait).unwrap());
}

#[test]
fn close_twice_fires_one_close_callback() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let timer = Timer::new(&event_loop).unwrap();
    let closed = Rc::new(Cell::new(0));

    let first = closed.clone();
    timer.close_with(move || first.set(first.get() + 1));
    let second = closed.clone();
    timer.close_with(move || second.set(second.get() + 100));
    timer.close();

    assert!(timer.is_closing());
    event_loop.run(RunMode::Default).unwrap();
    drop(timer);
    event_loop.run(RunMode::Default).unwrap();

    assert_eq!(closed.get(), 1);
}

#[test]
fn dropping_a_closing_handle_does_not_close_again() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let closed = Rc::new(Cell::new(0));

    {
        let idle = Idle::new(&event_loop).unwrap();
        let counter = closed.clone();
        idle.close_with(move || counter.set(counter.get() + 1));
    }

    event_loop.run(RunMode::Default).unwrap();
    assert_eq!(closed.get(), 1);

    let mut handles = 0;
    event_loop.walk(|_| handles += 1);
    assert_eq!(handles, 0);
}

#[test]
fn walk_reports_every_handle() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let timer = Timer::new(&event_loop).unwrap();
    let notify = Async::new(&event_loop, || {}).unwrap();
    timer.start(|| {}, 1_000, 0).unwrap();
    notify.unref();

    let mut seen = Vec::new();
    event_loop.walk(|info| seen.push(*info));

    assert_eq!(seen.len(), 2);
    let timer_info = seen.iter().find(|i| i.kind == HandleType::Timer).unwrap();
    assert!(timer_info.active && timer_info.referenced && !timer_info.closing);
    let async_info = seen.iter().find(|i| i.kind == HandleType::Async).unwrap();
    assert!(async_info.active && !async_info.referenced);

    timer.close();
    notify.close();
    event_loop.run(RunMode::Default).unwrap();
}

#[test]
fn close_settles_open_handles() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let timer = Timer::new(&event_loop).unwrap();
    let fired = Rc::new(Cell::new(false));
    let closed = Rc::new(Cell::new(false));

    let flag = fired.clone();
    timer.start(move || flag.set(true), 10_000, 10_000).unwrap();

    let idle = Idle::new(&event_loop).unwrap();
    let flag = closed.clone();
    idle.close_with(move || flag.set(true));

    event_loop.close().expect("close walks and settles handles");

    assert!(event_loop.is_closed());
    assert!(timer.is_closing());
    assert!(!timer.is_active());
    assert!(closed.get());
    assert!(!fired.get());

    assert_eq!(event_loop.run(RunMode::Default).unwrap_err().code(), EINVAL);
    assert_eq!(Timer::new(&event_loop).unwrap_err().code(), EINVAL);
    assert_eq!(timer.start(|| {}, 1, 0).unwrap_err().code(), EINVAL);
}

#[test]
fn close_waits_for_pending_work() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let work = Work::new(&event_loop);
    let status = Rc::new(Cell::new(i32::MIN));

    let out = status.clone();
    work.queue(
        || std::thread::sleep(Duration::from_millis(20)),
        move |result| out.set(result),
    )
    .unwrap();

    event_loop.close().unwrap();
    assert_eq!(status.get(), 0);
}

#[test]
fn run_and_close_are_rejected_from_callbacks() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let inner = Loop::from_raw(Some(event_loop.raw())).unwrap();
    let owner_raw = event_loop.raw();
    let codes = Rc::new(RefCell::new(Vec::new()));

    let timer = Timer::new(&event_loop).unwrap();
    let seen = codes.clone();
    timer
        .start(
            move || {
                let nested = inner.run(RunMode::NoWait).unwrap_err().code();
                seen.borrow_mut().push(nested);

                let owner = Loop::from_raw(Some(owner_raw.clone())).unwrap();
                seen.borrow_mut().push(owner.close().unwrap_err().code());
            },
            0,
            0,
        )
        .unwrap();

    event_loop.run(RunMode::Default).unwrap();
    assert_eq!(*codes.borrow(), vec![EBUSY, runa_io::error::EPERM]);
}

#[test]
fn stop_ends_run_after_current_iteration() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let stopper = Loop::from_raw(Some(event_loop.raw())).unwrap();
    let iterations = Rc::new(Cell::new(0));

    let idle = Idle::new(&event_loop).unwrap();
    let count = iterations.clone();
    idle.start(move || {
        count.set(count.get() + 1);
        if count.get() == 3 {
            stopper.stop();
        }
    })
    .unwrap();

    assert!(event_loop.run(RunMode::Default).unwrap());
    assert_eq!(iterations.get(), 3);

    // The stop request is consumed by the run it ended.
    assert!(event_loop.run(RunMode::NoWait).unwrap());
    assert_eq!(iterations.get(), 4);

    idle.close();
    assert!(!event_loop.run(RunMode::Default).unwrap());
}

#[test]
fn backend_timeout_follows_loop_state() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    assert!(event_loop.backend_fd() >= 0);
    assert_eq!(event_loop.backend_timeout(), 0);

    let notify = Async::new(&event_loop, || {}).unwrap();
    assert_eq!(event_loop.backend_timeout(), -1);

    let timer = Timer::new(&event_loop).unwrap();
    timer.start(|| {}, 500, 0).unwrap();
    event_loop.update_time();
    let timeout = event_loop.backend_timeout();
    assert!(timeout > 0 && timeout <= 501, "timeout was {timeout}");

    let idle = Idle::new(&event_loop).unwrap();
    idle.start(|| {}).unwrap();
    assert_eq!(event_loop.backend_timeout(), 0);

    idle.close();
    timer.close();
    notify.close();
    event_loop.run(RunMode::Default).unwrap();
}

#[test]
fn clock_advances_with_update_time() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let before = event_loop.now();
    let hr_before = event_loop.hrtime();

    std::thread::sleep(Duration::from_millis(5));
    event_loop.update_time();

    assert!(event_loop.now() >= before + 5);
    assert!(event_loop.hrtime() > hr_before);
}

#[test]
fn builder_applies_configuration() {
    init_logging();
    let event_loop = LoopBuilder::with_config(LoopConfig::default())
        .threadpool_size(2)
        .readdir_entries(8)
        .build()
        .unwrap();

    assert_eq!(event_loop.config().threadpool_size, 2);
    assert_eq!(event_loop.config().readdir_entries, 8);
    assert!(event_loop.is_owner());
}

#[test]
fn close_reports_busy_when_a_close_callback_registers_a_handle() {
    init_logging();
    let event_loop = Loop::new().unwrap();
    let late: Rc<RefCell<Option<Async>>> = Rc::new(RefCell::new(None));

    let idle = Idle::new(&event_loop).unwrap();
    let (raw, slot) = (event_loop.raw(), late.clone());
    idle.close_with(move || {
        let borrowed = Loop::from_raw(Some(raw)).unwrap();
        let handle = Async::new(&borrowed, || {}).unwrap();
        handle.unref();
        *slot.borrow_mut() = Some(handle);
    });

    let err = event_loop.close().unwrap_err();
    assert_eq!(err.code(), EBUSY);
    assert!(!event_loop.is_closed());
    assert!(late.borrow().is_some());

    // Still usable after the failed close.
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    let timer = Timer::new(&event_loop).unwrap();
    timer.start(move || flag.set(true), 0, 0).unwrap();
    event_loop.run(RunMode::Default).unwrap();
    assert!(fired.get());
    drop(timer);

    late.borrow_mut().take();
    event_loop.close().unwrap();
    assert!(event_loop.is_closed());
}
