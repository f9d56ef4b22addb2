//! Tasks: units of work admitted by the execution serializer.

use crate::error::SessionError;
use parking_lot::{Condvar, Mutex};
use rhai::Dynamic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a task's thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    Running,
    Completed,
    Panicked,
    /// Abandoned after the interrupt grace period ran out.
    Terminated,
}

/// Lifecycle callbacks for a submitted task.
pub trait TaskListener: Send + Sync {
    fn task_started(&self) {}

    fn task_ended(&self);
}

/// Listener that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl TaskListener for NoopListener {
    fn task_ended(&self) {}
}

/// Script evaluation work for [`crate::session::Session::submit`].
pub struct Task {
    pub title: String,
    pub script: String,
    pub extra: Vec<(String, Dynamic)>,
    pub listener: Arc<dyn TaskListener>,
}

impl Task {
    pub fn new(title: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            script: script.into(),
            extra: Vec::new(),
            listener: Arc::new(NoopListener),
        }
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: Dynamic) -> Self {
        self.extra.push((name.into(), value));
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = listener;
        self
    }
}

/// Shared control block between a task's thread, the serializer and handle holders.
pub struct TaskControl {
    id: u64,
    title: String,
    exclusive: bool,
    cancelled: AtomicBool,
    waiting: AtomicUsize,
    exit: Mutex<TaskExit>,
    exited: Condvar,
    listener: Mutex<Option<Arc<dyn TaskListener>>>,
}

impl TaskControl {
    pub fn new(id: u64, title: impl Into<String>, exclusive: bool) -> Self {
        Self {
            id,
            title: title.into(),
            exclusive,
            cancelled: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
            exit: Mutex::new(TaskExit::Running),
            exited: Condvar::new(),
            listener: Mutex::new(None),
        }
    }

    pub fn with_listener(self, listener: Arc<dyn TaskListener>) -> Self {
        *self.listener.lock() = Some(listener);
        self
    }

    /// Control block for work that runs outside the serializer.
    pub fn detached(title: impl Into<String>) -> Self {
        Self::new(0, title, false)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Exclusive tasks (context rebuilds) always make new submissions queue.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Mark the task as blocked until the guard is dropped.
    pub fn wait_on(&self) -> WaitingGuard<'_> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        WaitingGuard { control: self }
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst) > 0
    }

    /// Record how the task ended. Only the first call takes effect.
    pub fn finish(&self, exit: TaskExit) -> bool {
        let mut current = self.exit.lock();
        if *current != TaskExit::Running {
            return false;
        }
        *current = exit;
        self.exited.notify_all();
        true
    }

    pub fn notify_started(&self) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.task_started();
        }
    }

    /// Tell the listener the task ended. Only the first call reaches it, whether it comes
    /// from the task's own thread or from a forced termination.
    pub fn notify_ended(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.task_ended();
        }
    }

    pub fn exit_state(&self) -> TaskExit {
        *self.exit.lock()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_state() != TaskExit::Running
    }

    /// Block until the task ends or `timeout` elapses. Returns the exit state seen last.
    pub fn wait_exit(&self, timeout: Duration) -> TaskExit {
        let deadline = Instant::now() + timeout;
        let mut exit = self.exit.lock();
        while *exit == TaskExit::Running {
            if self.exited.wait_until(&mut exit, deadline).timed_out() {
                break;
            }
        }
        *exit
    }

    pub fn join(&self) -> TaskExit {
        let mut exit = self.exit.lock();
        while *exit == TaskExit::Running {
            self.exited.wait(&mut exit);
        }
        *exit
    }
}

impl std::fmt::Debug for TaskControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskControl")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("exclusive", &self.exclusive)
            .field("cancelled", &self.is_cancelled())
            .field("exit", &self.exit_state())
            .finish()
    }
}

pub struct WaitingGuard<'a> {
    control: &'a TaskControl,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.control.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) type ResultSlot = Arc<Mutex<Option<Result<Dynamic, SessionError>>>>;

/// Handle to a submitted task.
#[derive(Clone)]
pub struct TaskHandle {
    control: Arc<TaskControl>,
    result: ResultSlot,
}

impl TaskHandle {
    pub(crate) fn new(control: Arc<TaskControl>, result: ResultSlot) -> Self {
        Self { control, result }
    }

    pub fn id(&self) -> u64 {
        self.control.id()
    }

    pub fn title(&self) -> &str {
        self.control.title()
    }

    pub fn control(&self) -> &Arc<TaskControl> {
        &self.control
    }

    pub fn is_finished(&self) -> bool {
        self.control.has_exited()
    }

    /// Wait for the task and take its result. A second call after the result was taken
    /// reports the task as already joined.
    pub fn join(&self) -> Result<Dynamic, SessionError> {
        let exit = self.control.join();
        self.take_result(exit)
    }

    /// Like [`TaskHandle::join`], giving up after `timeout`.
    pub fn join_timeout(&self, timeout: Duration) -> Option<Result<Dynamic, SessionError>> {
        match self.control.wait_exit(timeout) {
            TaskExit::Running => None,
            exit => Some(self.take_result(exit)),
        }
    }

    fn take_result(&self, exit: TaskExit) -> Result<Dynamic, SessionError> {
        match exit {
            TaskExit::Terminated => Err(SessionError::Interrupted(format!(
                "{} was terminated after the grace period",
                self.control.title()
            ))),
            _ => self.result.lock().take().unwrap_or_else(|| {
                Err(SessionError::TaskFailed(format!(
                    "no result available for {}",
                    self.control.title()
                )))
            }),
        }
    }
}
