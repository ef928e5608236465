use crate::builder::LoopConfig;
use crate::error::{EBUSY, ECANCELED, EINVAL, EIO, Error, Result};
use crate::reactor::event::{WakePipe, wait_readable};
use crate::reactor::handle::{
    ACTIVE, CLOSING, Callback, CloseCallback, HandleData, HandleInfo, HandleSlot, HandleType,
    Phase, REF, SignalCallback,
};
use crate::reactor::signal;
use crate::runtime::pool::{CANCELLED, Job, JobState, QUEUED, ThreadPool};
use crate::runtime::queue::{Completion, CompletionQueue, Payload};
use crate::utils::slab::{Key, Slab};

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

/// How far a single [`Loop::run`](crate::Loop::run) call drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run until nothing keeps the loop alive.
    #[default]
    Default,
    /// Run one iteration, blocking for events if nothing is ready.
    Once,
    /// Run one iteration without blocking.
    NoWait,
}

type AfterFn = Box<dyn FnOnce(std::result::Result<Payload, i32>)>;

struct Request {
    after: AfterFn,
    state: JobState,
}

/// The native event loop.
///
/// Owns the handle registry, the timer queue, the pending requests and the
/// wake pipe. Everything here runs on the loop thread; the worker pool and
/// signal handler only ever reach it through the wake pipe and the
/// completion queue.
pub(crate) struct Reactor {
    config: LoopConfig,
    handles: RefCell<Slab<HandleSlot>>,
    timers: RefCell<BTreeMap<(u64, u64), Key>>,
    prepare_handles: RefCell<Vec<Key>>,
    idle_handles: RefCell<Vec<Key>>,
    check_handles: RefCell<Vec<Key>>,
    async_handles: RefCell<Vec<Key>>,
    signal_handles: RefCell<Vec<Key>>,
    closing: RefCell<VecDeque<Key>>,
    requests: RefCell<Slab<Request>>,
    ready: RefCell<VecDeque<Completion>>,
    completions: CompletionQueue,
    pool: RefCell<Option<ThreadPool>>,
    wake: Arc<WakePipe>,
    origin: Instant,
    time: Cell<u64>,
    next_seq: Cell<u64>,
    stop_flag: Cell<bool>,
    running: Cell<bool>,
    closed: Cell<bool>,
}

struct RunGuard<'a>(&'a Cell<bool>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn einval() -> Error {
    Error::from_status(EINVAL)
}

fn invoke(cb: &Callback) {
    match cb.try_borrow_mut() {
        Ok(mut f) => (*f)(),
        Err(_) => log::warn!("skipping re-entrant handle callback"),
    }
}

fn invoke_signal(cb: &SignalCallback, signum: i32) {
    match cb.try_borrow_mut() {
        Ok(mut f) => (*f)(signum),
        Err(_) => log::warn!("skipping re-entrant signal callback"),
    }
}

impl Reactor {
    pub(crate) fn new(config: LoopConfig) -> Result<Self> {
        let wake = Arc::new(WakePipe::new()?);

        Ok(Self {
            config,
            handles: RefCell::new(Slab::new(16)),
            timers: RefCell::new(BTreeMap::new()),
            prepare_handles: RefCell::new(Vec::new()),
            idle_handles: RefCell::new(Vec::new()),
            check_handles: RefCell::new(Vec::new()),
            async_handles: RefCell::new(Vec::new()),
            signal_handles: RefCell::new(Vec::new()),
            closing: RefCell::new(VecDeque::new()),
            requests: RefCell::new(Slab::new(16)),
            ready: RefCell::new(VecDeque::new()),
            completions: CompletionQueue::new(wake.clone()),
            pool: RefCell::new(None),
            wake,
            origin: Instant::now(),
            time: Cell::new(0),
            next_seq: Cell::new(0),
            stop_flag: Cell::new(false),
            running: Cell::new(false),
            closed: Cell::new(false),
        })
    }

    pub(crate) fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(einval());
        }
        Ok(())
    }

    pub(crate) fn wake_pipe(&self) -> Arc<WakePipe> {
        self.wake.clone()
    }

    // ---- clock -------------------------------------------------------------

    pub(crate) fn now(&self) -> u64 {
        self.time.get()
    }

    pub(crate) fn update_time(&self) {
        self.time.set(self.origin.elapsed().as_millis() as u64);
    }

    pub(crate) fn hrtime(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn next_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq.wrapping_add(1));
        seq
    }

    pub(crate) fn backend_fd(&self) -> RawFd {
        self.wake.read_fd()
    }

    /// Milliseconds the next poll may block: `-1` forever, `0` not at all.
    pub(crate) fn backend_timeout(&self) -> i32 {
        if self.stop_flag.get() {
            return 0;
        }
        if !self.has_active_handles() && self.requests.borrow().is_empty() {
            return 0;
        }
        if !self.idle_handles.borrow().is_empty()
            || !self.closing.borrow().is_empty()
            || !self.ready.borrow().is_empty()
            || !self.completions.is_empty()
        {
            return 0;
        }

        match self.timers.borrow().keys().next() {
            Some(&(deadline, _)) => deadline.saturating_sub(self.now()).min(i32::MAX as u64) as i32,
            None => -1,
        }
    }

    // ---- handle registry ---------------------------------------------------

    pub(crate) fn register(&self, kind: HandleType, data: HandleData) -> Result<Key> {
        self.ensure_open()?;

        let mut slot = HandleSlot::new(kind, data);
        if kind == HandleType::Async {
            slot.flags |= ACTIVE;
        }

        let key = self.handles.borrow_mut().insert(slot);
        if kind == HandleType::Async {
            self.async_handles.borrow_mut().push(key);
        }

        log::trace!("registered {kind:?} handle");
        Ok(key)
    }

    pub(crate) fn with_slot<R>(&self, key: Key, f: impl FnOnce(&HandleSlot) -> R) -> Option<R> {
        self.handles.borrow().get(key).map(f)
    }

    /// Runs `f` on a live, non-closing slot. The returned value is handed back
    /// after the registry borrow ends, so replaced callbacks drop outside it.
    fn update_slot<R>(
        &self,
        key: Key,
        f: impl FnOnce(&mut HandleSlot) -> Result<R>,
    ) -> Result<R> {
        let mut handles = self.handles.borrow_mut();
        let slot = handles
            .get_mut(key)
            .filter(|slot| !slot.is_closing())
            .ok_or_else(einval)?;
        f(slot)
    }

    pub(crate) fn is_active(&self, key: Key) -> bool {
        self.with_slot(key, HandleSlot::is_active).unwrap_or(false)
    }

    /// Closed handles have left the registry and count as closing.
    pub(crate) fn is_closing(&self, key: Key) -> bool {
        self.with_slot(key, HandleSlot::is_closing).unwrap_or(true)
    }

    pub(crate) fn has_ref(&self, key: Key) -> bool {
        self.with_slot(key, HandleSlot::has_ref).unwrap_or(false)
    }

    pub(crate) fn set_ref(&self, key: Key, referenced: bool) {
        if let Some(slot) = self.handles.borrow_mut().get_mut(key) {
            if referenced {
                slot.flags |= REF;
            } else {
                slot.flags &= !REF;
            }
        }
    }

    pub(crate) fn walk(&self) -> Vec<HandleInfo> {
        self.handles
            .borrow()
            .iter()
            .map(|(_, slot)| slot.info())
            .collect()
    }

    /// Starts closing a handle. Idempotent: a closing or closed handle keeps
    /// its first close callback.
    pub(crate) fn close_handle(&self, key: Key, cb: Option<CloseCallback>) {
        let Some(kind) = self
            .with_slot(key, |slot| (!slot.is_closing()).then_some(slot.kind))
            .flatten()
        else {
            return;
        };

        match kind {
            HandleType::Timer => self.timer_stop(key),
            HandleType::Prepare | HandleType::Idle | HandleType::Check => self.hook_stop(key),
            HandleType::Signal => self.signal_stop(key),
            HandleType::Async => {
                self.async_handles.borrow_mut().retain(|k| *k != key);
                self.with_slot(key, |slot| {
                    if let HandleData::Async(state) = &slot.data {
                        state.closed.store(true, Ordering::Release);
                    }
                });
            }
        }

        if let Some(slot) = self.handles.borrow_mut().get_mut(key) {
            slot.flags = (slot.flags & !ACTIVE) | CLOSING;
            slot.close_cb = cb;
        }
        self.closing.borrow_mut().push_back(key);

        log::trace!("closing {kind:?} handle");
    }

    fn run_closing(&self) {
        let keys: Vec<Key> = self.closing.borrow_mut().drain(..).collect();

        for key in keys {
            let slot = self.handles.borrow_mut().remove(key);
            if let Some(cb) = slot.and_then(|mut slot| slot.close_cb.take()) {
                cb();
            }
        }
    }

    fn has_active_handles(&self) -> bool {
        self.handles
            .borrow()
            .iter()
            .any(|(_, slot)| slot.keeps_alive())
    }

    // ---- timers ------------------------------------------------------------

    /// Arms a timer `timeout` ms from now. The start time is rounded up to
    /// the next millisecond so a timer never fires before `timeout` elapsed.
    pub(crate) fn timer_start(
        &self,
        key: Key,
        cb: Callback,
        timeout: u64,
        repeat: u64,
    ) -> Result<()> {
        self.timer_stop(key);

        let start = self.hrtime().div_ceil(1_000_000);
        let deadline = start.saturating_add(timeout);
        let seq = self.next_seq();

        let previous = self.update_slot(key, |slot| {
            let HandleData::Timer(timer) = &mut slot.data else {
                return Err(einval());
            };
            timer.repeat = repeat;
            timer.deadline = deadline;
            timer.seq = seq;
            slot.flags |= ACTIVE;
            Ok(timer.cb.replace(cb))
        })?;
        drop(previous);

        self.timers.borrow_mut().insert((deadline, seq), key);
        Ok(())
    }

    pub(crate) fn timer_stop(&self, key: Key) {
        let entry = self.handles.borrow_mut().get_mut(key).and_then(|slot| {
            let HandleData::Timer(timer) = &slot.data else {
                return None;
            };
            let entry = slot.is_active().then_some((timer.deadline, timer.seq));
            slot.flags &= !ACTIVE;
            entry
        });

        if let Some(entry) = entry {
            self.timers.borrow_mut().remove(&entry);
        }
    }

    pub(crate) fn timer_again(&self, key: Key) -> Result<()> {
        let (cb, repeat) = self.update_slot(key, |slot| match &slot.data {
            HandleData::Timer(timer) => timer
                .cb
                .clone()
                .map(|cb| (cb, timer.repeat))
                .ok_or_else(einval),
            _ => Err(einval()),
        })?;

        if repeat > 0 {
            self.timer_start(key, cb, repeat, repeat)?;
        }
        Ok(())
    }

    pub(crate) fn timer_set_repeat(&self, key: Key, repeat: u64) {
        if let Some(slot) = self.handles.borrow_mut().get_mut(key)
            && let HandleData::Timer(timer) = &mut slot.data
        {
            timer.repeat = repeat;
        }
    }

    pub(crate) fn timer_repeat(&self, key: Key) -> u64 {
        self.with_slot(key, |slot| match &slot.data {
            HandleData::Timer(timer) => timer.repeat,
            _ => 0,
        })
        .unwrap_or(0)
    }

    pub(crate) fn timer_due_in(&self, key: Key) -> u64 {
        self.with_slot(key, |slot| match &slot.data {
            HandleData::Timer(timer) if slot.is_active() => {
                timer.deadline.saturating_sub(self.now())
            }
            _ => 0,
        })
        .unwrap_or(0)
    }

    fn run_timers(&self) {
        let now = self.now();
        let due: Vec<((u64, u64), Key)> = self
            .timers
            .borrow()
            .range(..=(now, u64::MAX))
            .map(|(entry, key)| (*entry, *key))
            .collect();

        for (entry, key) in due {
            // Stopped or restarted by an earlier callback of this pass.
            if self.timers.borrow_mut().remove(&entry).is_none() {
                continue;
            }

            let fired = self.handles.borrow_mut().get_mut(key).and_then(|slot| {
                let HandleData::Timer(timer) = &mut slot.data else {
                    return None;
                };

                let rearm = if timer.repeat > 0 {
                    timer.deadline = now.saturating_add(timer.repeat);
                    timer.seq = self.next_seq();
                    Some((timer.deadline, timer.seq))
                } else {
                    slot.flags &= !ACTIVE;
                    None
                };

                Some((timer.cb.clone(), rearm))
            });

            let Some((cb, rearm)) = fired else {
                continue;
            };

            if let Some(entry) = rearm {
                self.timers.borrow_mut().insert(entry, key);
            }
            if let Some(cb) = cb {
                invoke(&cb);
            }
        }
    }

    // ---- prepare / idle / check -------------------------------------------

    fn hook_list(&self, phase: Phase) -> &RefCell<Vec<Key>> {
        match phase {
            Phase::Prepare => &self.prepare_handles,
            Phase::Idle => &self.idle_handles,
            Phase::Check => &self.check_handles,
        }
    }

    fn phase_of(kind: HandleType) -> Option<Phase> {
        match kind {
            HandleType::Prepare => Some(Phase::Prepare),
            HandleType::Idle => Some(Phase::Idle),
            HandleType::Check => Some(Phase::Check),
            _ => None,
        }
    }

    pub(crate) fn hook_start(&self, key: Key, cb: Callback) -> Result<()> {
        let (phase, newly_active, previous) = self.update_slot(key, |slot| {
            let phase = Self::phase_of(slot.kind).ok_or_else(einval)?;
            let HandleData::Hook(hook) = &mut slot.data else {
                return Err(einval());
            };
            let previous = hook.replace(cb);
            let newly_active = !slot.is_active();
            slot.flags |= ACTIVE;
            Ok((phase, newly_active, previous))
        })?;
        drop(previous);

        if newly_active {
            self.hook_list(phase).borrow_mut().push(key);
        }
        Ok(())
    }

    pub(crate) fn hook_stop(&self, key: Key) {
        let phase = self.handles.borrow_mut().get_mut(key).and_then(|slot| {
            let phase = Self::phase_of(slot.kind)?;
            slot.flags &= !ACTIVE;
            Some(phase)
        });

        if let Some(phase) = phase {
            self.hook_list(phase).borrow_mut().retain(|k| *k != key);
        }
    }

    fn run_hooks(&self, phase: Phase) {
        let keys = self.hook_list(phase).borrow().clone();

        for key in keys {
            let cb = self
                .with_slot(key, |slot| match &slot.data {
                    HandleData::Hook(cb) if slot.is_active() => cb.clone(),
                    _ => None,
                })
                .flatten();

            if let Some(cb) = cb {
                invoke(&cb);
            }
        }
    }

    // ---- async -------------------------------------------------------------

    pub(crate) fn async_flags(&self, key: Key) -> Option<(Arc<AtomicBool>, Arc<AtomicBool>)> {
        self.with_slot(key, |slot| match &slot.data {
            HandleData::Async(state) => Some((state.pending.clone(), state.closed.clone())),
            _ => None,
        })
        .flatten()
    }

    fn run_async(&self) {
        let keys = self.async_handles.borrow().clone();

        for key in keys {
            let cb = self
                .with_slot(key, |slot| match &slot.data {
                    HandleData::Async(state)
                        if slot.is_active() && state.pending.swap(false, Ordering::AcqRel) =>
                    {
                        Some(state.cb.clone())
                    }
                    _ => None,
                })
                .flatten();

            if let Some(cb) = cb {
                invoke(&cb);
            }
        }
    }

    // ---- signals -----------------------------------------------------------

    pub(crate) fn signal_start(
        &self,
        key: Key,
        signum: i32,
        cb: SignalCallback,
        oneshot: bool,
    ) -> Result<()> {
        let watching = self.update_slot(key, |slot| match &slot.data {
            HandleData::Signal(state) => Ok(slot.is_active().then_some(state.signum)),
            _ => Err(einval()),
        })?;

        let fd = self.wake.write_fd();
        if watching != Some(signum) {
            signal::install(signum, fd).map_err(Error::from_status)?;
            if let Some(previous) = watching {
                signal::uninstall(previous, fd);
            }
        }

        let previous = self.update_slot(key, |slot| {
            let HandleData::Signal(state) = &mut slot.data else {
                return Err(einval());
            };
            state.signum = signum;
            state.oneshot = oneshot;
            slot.flags |= ACTIVE;
            Ok(state.cb.replace(cb))
        })?;
        drop(previous);

        let mut handles = self.signal_handles.borrow_mut();
        if !handles.contains(&key) {
            handles.push(key);
        }
        Ok(())
    }

    pub(crate) fn signal_stop(&self, key: Key) {
        let watching = self.handles.borrow_mut().get_mut(key).and_then(|slot| {
            let HandleData::Signal(state) = &slot.data else {
                return None;
            };
            let watching = slot.is_active().then_some(state.signum);
            slot.flags &= !ACTIVE;
            watching
        });

        if let Some(signum) = watching {
            signal::uninstall(signum, self.wake.write_fd());
        }
        self.signal_handles.borrow_mut().retain(|k| *k != key);
    }

    pub(crate) fn signal_signum(&self, key: Key) -> i32 {
        self.with_slot(key, |slot| match &slot.data {
            HandleData::Signal(state) => state.signum,
            _ => 0,
        })
        .unwrap_or(0)
    }

    fn dispatch_signals(&self, signals: &[u8]) {
        for &signum in signals {
            let signum = i32::from(signum);
            let keys = self.signal_handles.borrow().clone();

            for key in keys {
                let hit = self
                    .with_slot(key, |slot| match &slot.data {
                        HandleData::Signal(state) if slot.is_active() && state.signum == signum => {
                            state.cb.clone().map(|cb| (cb, state.oneshot))
                        }
                        _ => None,
                    })
                    .flatten();

                if let Some((cb, oneshot)) = hit {
                    if oneshot {
                        self.signal_stop(key);
                    }
                    invoke_signal(&cb, signum);
                }
            }
        }
    }

    // ---- requests ----------------------------------------------------------

    /// Runs `work` on the pool and `after` on the loop thread once it is
    /// done. `after` receives `Err(ECANCELED)` for a cancelled job and
    /// `Err(EIO)` if `work` panicked.
    pub(crate) fn submit<T, W, A>(&self, work: W, after: A) -> Result<Key>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        A: FnOnce(std::result::Result<T, i32>) + 'static,
    {
        self.ensure_open()?;

        let state: JobState = Arc::new(AtomicU8::new(QUEUED));
        let after: AfterFn = Box::new(move |output| {
            let output = output.and_then(|payload| {
                payload
                    .downcast::<T>()
                    .map(|value| *value)
                    .map_err(|_| EIO)
            });
            after(output)
        });

        let key = self.requests.borrow_mut().insert(Request {
            after,
            state: state.clone(),
        });

        let job = Job {
            key,
            state,
            run: Box::new(move || Box::new(work()) as Payload),
        };

        let submitted = match self.ensure_pool() {
            Ok(()) => match self.pool.borrow().as_ref() {
                Some(pool) => pool.submit(job).map_err(Error::from_status),
                None => Err(Error::from_status(EIO)),
            },
            Err(err) => Err(err),
        };

        if let Err(err) = submitted {
            let request = self.requests.borrow_mut().remove(key);
            drop(request);
            return Err(err);
        }

        Ok(key)
    }

    fn ensure_pool(&self) -> Result<()> {
        if self.pool.borrow().is_some() {
            return Ok(());
        }

        let pool = ThreadPool::start(self.config.threadpool_size, self.completions.sender())?;
        *self.pool.borrow_mut() = Some(pool);
        Ok(())
    }

    /// Cancels a request whose job has not started yet. Its `after` runs with
    /// `ECANCELED` on the next iteration.
    pub(crate) fn cancel(&self, key: Key) -> Result<()> {
        let state = self
            .requests
            .borrow()
            .get(key)
            .map(|request| request.state.clone())
            .ok_or_else(einval)?;

        state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::from_status(EBUSY))?;

        self.ready.borrow_mut().push_back(Completion {
            key,
            output: Err(ECANCELED),
        });
        Ok(())
    }

    pub(crate) fn is_pending(&self, key: Key) -> bool {
        self.requests.borrow().contains(key)
    }

    fn complete(&self, completion: Completion) {
        let request = self.requests.borrow_mut().remove(completion.key);
        if let Some(request) = request {
            (request.after)(completion.output);
        }
    }

    fn run_ready(&self) -> bool {
        let ready: Vec<Completion> = self.ready.borrow_mut().drain(..).collect();
        let ran = !ready.is_empty();

        for completion in ready {
            self.complete(completion);
        }
        ran
    }

    // ---- loop --------------------------------------------------------------

    fn poll_io(&self, timeout: i32) -> Result<()> {
        if wait_readable(self.wake.read_fd(), timeout)? {
            let mut signals = Vec::new();
            self.wake.drain(&mut signals);
            self.dispatch_signals(&signals);
        }

        self.run_async();

        // Completions pushed while these callbacks run wait for the next
        // iteration, which keeps a NoWait pass bounded.
        for _ in 0..self.completions.len() {
            match self.completions.pop() {
                Some(completion) => self.complete(completion),
                None => break,
            }
        }
        Ok(())
    }

    pub(crate) fn alive(&self) -> bool {
        self.has_active_handles()
            || !self.requests.borrow().is_empty()
            || !self.closing.borrow().is_empty()
    }

    pub(crate) fn stop(&self) {
        self.stop_flag.set(true);
    }

    pub(crate) fn run(&self, mode: RunMode) -> Result<bool> {
        self.ensure_open()?;
        if self.running.replace(true) {
            return Err(Error::from_status(EBUSY));
        }
        let _guard = RunGuard(&self.running);

        let mut alive = self.alive();
        if !alive {
            self.update_time();
        }

        while alive && !self.stop_flag.get() {
            self.update_time();
            self.run_timers();
            let ran_pending = self.run_ready();
            self.run_hooks(Phase::Idle);
            self.run_hooks(Phase::Prepare);

            let timeout = match mode {
                RunMode::Default => self.backend_timeout(),
                RunMode::Once if !ran_pending => self.backend_timeout(),
                _ => 0,
            };
            self.poll_io(timeout)?;

            self.run_hooks(Phase::Check);
            self.run_closing();

            if mode == RunMode::Once {
                self.update_time();
                self.run_timers();
            }

            alive = self.alive();
            if mode != RunMode::Default {
                break;
            }
        }

        self.stop_flag.set(false);
        Ok(alive)
    }

    fn is_busy(&self) -> bool {
        !self.handles.borrow().is_empty() || !self.requests.borrow().is_empty()
    }

    /// Closes the loop. A busy loop gets every handle closed and one more
    /// default run to settle; if it is still busy afterwards the close fails
    /// with `EBUSY` and the loop stays usable.
    pub(crate) fn close(&self) -> Result<()> {
        if self.closed.get() {
            return Ok(());
        }
        if self.running.get() {
            return Err(Error::from_status(EBUSY));
        }

        if self.is_busy() {
            log::debug!(
                "loop busy on close ({} handles, {} requests), closing handles",
                self.handles.borrow().len(),
                self.requests.borrow().len()
            );

            let keys = self.handles.borrow().keys();
            for key in keys {
                self.close_handle(key, None);
            }

            self.run(RunMode::Default)?;

            if self.is_busy() {
                return Err(Error::from_status(EBUSY));
            }
        }

        self.closed.set(true);
        let pool = self.pool.borrow_mut().take();
        drop(pool);

        log::debug!("loop closed");
        Ok(())
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        let fd = self.wake.write_fd();
        for (_, slot) in self.handles.get_mut().iter() {
            if let HandleData::Signal(state) = &slot.data
                && slot.is_active()
            {
                signal::uninstall(state.signum, fd);
            }
        }
    }
}
