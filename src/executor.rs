//! A fixed-size pool of worker threads implementing [Executor].
//!
//! Workers pull jobs from one shared channel.  A job which panics is logged and the worker moves on to the next one.
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use crate::*;

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

fn worker_loop(worker_id: usize, receiver: Receiver<Job>) {
    for job in receiver.iter() {
        if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            error!(
                worker_id,
                panic = panic_message(&*payload),
                "background job panicked"
            );
        }
    }
    debug!(worker_id, "worker exiting");
}

impl WorkerPool {
    /// Start `threads` workers.  Zero is treated as one.
    pub fn new(threads: usize) -> std::io::Result<WorkerPool> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..threads.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("mixtape-worker-{}", worker_id))
                    .spawn(move || worker_loop(worker_id, receiver))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) {
        let sent = self
            .sender
            .as_ref()
            .map_or(false, |s| s.send(job).is_ok());
        if !sent {
            warn!("worker pool is shut down; dropping job");
        }
    }
}

impl Drop for WorkerPool {
    /// Lets queued jobs finish, then joins the workers.
    fn drop(&mut self) {
        self.sender.take();
        let current = std::thread::current().id();
        for worker in self.workers.drain(..) {
            // The last reference may be dropped by one of our own jobs; joining ourselves would deadlock.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!("worker thread panicked outside of a job");
            }
        }
    }
}
