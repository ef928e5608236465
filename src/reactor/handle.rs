//! Registry entries for loop-attached handles.
//!
//! The reactor owns one [`HandleSlot`] per live handle. Public wrappers only
//! hold the slot's key, so a callback can stop, restart or close any handle
//! (including its own) without aliasing the wrapper.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// The kind of resource a handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleType {
    Timer,
    Prepare,
    Idle,
    Check,
    Async,
    Signal,
}

/// Per-iteration hook phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Prepare,
    Idle,
    Check,
}

pub(crate) const ACTIVE: u8 = 1 << 0;
pub(crate) const REF: u8 = 1 << 1;
pub(crate) const CLOSING: u8 = 1 << 2;

pub(crate) type Callback = Rc<RefCell<Box<dyn FnMut()>>>;
pub(crate) type SignalCallback = Rc<RefCell<Box<dyn FnMut(i32)>>>;
pub(crate) type CloseCallback = Box<dyn FnOnce()>;

pub(crate) fn callback(f: impl FnMut() + 'static) -> Callback {
    Rc::new(RefCell::new(Box::new(f)))
}

pub(crate) fn signal_callback(f: impl FnMut(i32) + 'static) -> SignalCallback {
    Rc::new(RefCell::new(Box::new(f)))
}

#[derive(Default)]
pub(crate) struct TimerState {
    pub(crate) cb: Option<Callback>,
    pub(crate) repeat: u64,
    pub(crate) deadline: u64,
    pub(crate) seq: u64,
}

pub(crate) struct AsyncState {
    pub(crate) cb: Callback,
    pub(crate) pending: Arc<AtomicBool>,
    pub(crate) closed: Arc<AtomicBool>,
}

#[derive(Default)]
pub(crate) struct SignalState {
    pub(crate) cb: Option<SignalCallback>,
    pub(crate) signum: i32,
    pub(crate) oneshot: bool,
}

pub(crate) enum HandleData {
    Timer(TimerState),
    Hook(Option<Callback>),
    Async(AsyncState),
    Signal(SignalState),
}

pub(crate) struct HandleSlot {
    pub(crate) kind: HandleType,
    pub(crate) flags: u8,
    pub(crate) data: HandleData,
    pub(crate) close_cb: Option<CloseCallback>,
}

impl HandleSlot {
    pub(crate) fn new(kind: HandleType, data: HandleData) -> Self {
        Self {
            kind,
            flags: REF,
            data,
            close_cb: None,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.flags & ACTIVE != 0
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.flags & CLOSING != 0
    }

    pub(crate) fn has_ref(&self) -> bool {
        self.flags & REF != 0
    }

    pub(crate) fn keeps_alive(&self) -> bool {
        self.is_active() && self.has_ref()
    }

    pub(crate) fn info(&self) -> HandleInfo {
        HandleInfo {
            kind: self.kind,
            active: self.is_active(),
            closing: self.is_closing(),
            referenced: self.has_ref(),
        }
    }
}

/// Snapshot of one handle, as seen by [`Loop::walk`](crate::Loop::walk).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleInfo {
    pub kind: HandleType,
    pub active: bool,
    pub closing: bool,
    pub referenced: bool,
}
