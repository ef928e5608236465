//! Completion queue between the worker pool and the loop thread.
//!
//! Workers push finished jobs from any thread; the loop pops them during its
//! poll phase. Every push also wakes the loop so a blocking poll returns.

use crate::reactor::event::WakePipe;
use crate::utils::slab::Key;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::any::Any;
use std::sync::Arc;

/// Type-erased result of a pool job.
pub(crate) type Payload = Box<dyn Any + Send>;

/// A finished (or failed) job addressed to the request that submitted it.
pub(crate) struct Completion {
    pub(crate) key: Key,
    pub(crate) output: Result<Payload, i32>,
}

/// Sending half, cloned into every worker.
#[derive(Clone)]
pub(crate) struct CompletionSender {
    sender: Sender<Completion>,
    wake: Arc<WakePipe>,
}

impl CompletionSender {
    pub(crate) fn push(&self, completion: Completion) {
        // The loop owns the receiver; once it is gone nobody is waiting.
        if self.sender.send(completion).is_ok() {
            self.wake.wake();
        }
    }
}

/// Receiving half, owned by the reactor.
pub(crate) struct CompletionQueue {
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    wake: Arc<WakePipe>,
}

impl CompletionQueue {
    pub(crate) fn new(wake: Arc<WakePipe>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            wake,
        }
    }

    pub(crate) fn sender(&self) -> CompletionSender {
        CompletionSender {
            sender: self.sender.clone(),
            wake: self.wake.clone(),
        }
    }

    pub(crate) fn pop(&self) -> Option<Completion> {
        match self.receiver.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
