//! The owning thread's message queue.
//!
//! Targets may only be touched from the thread that owns them.  Background jobs hand results back by posting closures
//! through a [MainHandle]; the owning thread runs them when it drives its [MainQueue].
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

type Message = Box<dyn FnOnce() + Send + 'static>;

/// The receiving end, pinned to the thread which created it.
pub struct MainQueue {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    /// Makes this type `!Send` and `!Sync`.
    _owner: PhantomData<*const ()>,
}

/// Posts closures to a [MainQueue] from any thread.
#[derive(Clone)]
pub struct MainHandle {
    sender: Sender<Message>,
}

impl MainQueue {
    pub fn new() -> MainQueue {
        let (sender, receiver) = crossbeam_channel::unbounded();
        MainQueue {
            sender,
            receiver,
            _owner: PhantomData,
        }
    }

    pub fn handle(&self) -> MainHandle {
        MainHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run everything currently queued, including anything those messages queue.  Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(message) = self.receiver.try_recv() {
            message();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one message and run it.  Returns whether one ran.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => {
                message();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Keep running messages until `done` returns true or `timeout` elapses.  Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.run_next(deadline - now);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for MainQueue {
    fn default() -> MainQueue {
        MainQueue::new()
    }
}

impl MainHandle {
    /// Queue `f` to run on the owning thread.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) {
        // The queue holds its own sender, so this can only fail once the queue itself is gone, at which point there's
        // nobody left to run it anyway.
        let _ = self.sender.send(Box::new(f));
    }
}
