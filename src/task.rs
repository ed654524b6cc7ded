//! A [BindTask] fetches a value off the owning thread and applies it back on the owning thread, unless it was cancelled
//! in the meantime.
//!
//! Cancellation is cooperative and checked twice: on the worker before the fetch starts, and on the owning thread
//! before the result is applied.  Since cancellation also happens on the owning thread, a task cancelled before its
//! apply runs never has a visible effect, however far its fetch got.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::*;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct TaskState {
    id: u64,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

/// Shared view of one task's lifecycle.
#[derive(Debug, Clone)]
pub struct TaskHandle(Arc<TaskState>);

impl TaskHandle {
    pub(crate) fn new() -> TaskHandle {
        TaskHandle(Arc::new(TaskState {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Ask the task to stop.  Has no effect on a task which already applied its result.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Whether the task reached a terminal state: applied, or observed its cancellation.
    pub fn is_finished(&self) -> bool {
        self.0.finished.load(Ordering::Acquire)
    }

    fn finish(&self) {
        self.0.finished.store(true, Ordering::Release);
    }
}

/// Runs on the owning thread once a task is over, whichever way it ended.
type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Travels with a task from the executor to the owning thread.
///
/// If it is dropped without being completed (the fetch panicked, the executor discarded the job, or the task was
/// cancelled before fetching) it posts the cleanup to the owning thread itself, so the task still reaches a terminal
/// state there.
struct Completion {
    handle: TaskHandle,
    main: MainHandle,
    cleanup: Option<Cleanup>,
}

impl Completion {
    /// Finish on the owning thread.
    fn complete(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        self.handle.finish();
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let cleanup = match self.cleanup.take() {
            Some(c) => c,
            None => return,
        };
        let handle = self.handle.clone();
        self.main.post(move || {
            if !handle.is_cancelled() {
                debug!(task = handle.id(), "task abandoned before apply");
            }
            cleanup();
            handle.finish();
        });
    }
}

pub struct BindTask<F, A> {
    handle: TaskHandle,
    fetch: F,
    apply: A,
    cleanup: Option<Cleanup>,
}

impl<T, F, A> BindTask<F, A>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    A: FnOnce(T) + Send + 'static,
{
    /// `fetch` will run on an executor; `apply` will run on the thread owning the [MainQueue].
    pub fn new(fetch: F, apply: A) -> BindTask<F, A> {
        BindTask::with_handle(TaskHandle::new(), fetch, apply)
    }

    /// For callers which need the task's id before it is spawned.
    pub(crate) fn with_handle(handle: TaskHandle, fetch: F, apply: A) -> BindTask<F, A> {
        BindTask {
            handle,
            fetch,
            apply,
            cleanup: None,
        }
    }

    /// Run `f` on the owning thread when the task ends: after `apply`, or in its place if the task was cancelled,
    /// its fetch panicked, or the executor dropped it.
    pub fn on_finish(mut self, f: impl FnOnce() + Send + 'static) -> BindTask<F, A> {
        self.cleanup = Some(Box::new(f));
        self
    }

    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn spawn(self, executor: &dyn Executor, main: &MainHandle) -> TaskHandle {
        let BindTask {
            handle,
            fetch,
            apply,
            cleanup,
        } = self;
        let cleanup: Cleanup = match cleanup {
            Some(c) => c,
            None => Box::new(|| ()),
        };
        let completion = Completion {
            handle: handle.clone(),
            main: main.clone(),
            cleanup: Some(cleanup),
        };

        executor.execute(Box::new(move || {
            if completion.handle.is_cancelled() {
                debug!(task = completion.handle.id(), "cancelled before fetch");
                return;
            }

            let value = fetch();
            let main = completion.main.clone();
            main.post(move || {
                if completion.handle.is_cancelled() {
                    debug!(task = completion.handle.id(), "cancelled before apply");
                } else {
                    apply(value);
                }
                completion.complete();
            });
        }));

        handle
    }
}
