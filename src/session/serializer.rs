//! Execution serializer: single-flight admission of tasks onto dedicated threads.
//!
//! One task is tracked at a time. A submission made while the tracked task is blocked or
//! exclusive waits for it to finish, and only one such submission may wait. A submission
//! made while the tracked task is busy computing starts anyway and takes over tracking.

use crate::error::SessionError;
use crate::session::task::{ResultSlot, TaskControl, TaskExit, TaskHandle, TaskListener};
use parking_lot::{Condvar, Mutex};
use rhai::Dynamic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long an interrupted task gets to stop on its own before it is abandoned.
pub const INTERRUPT_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerState {
    Idle,
    Running,
    Interrupting,
}

/// What an interrupt request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Nothing was running.
    Idle,
    /// The task noticed the cancellation and stopped within the grace period.
    Cooperative,
    /// The task was abandoned after the grace period.
    Forced,
}

struct Running {
    control: Arc<TaskControl>,
    thread: Option<JoinHandle<()>>,
}

struct Inner {
    state: SerializerState,
    current: Option<Running>,
    queued: bool,
    next_id: u64,
}

impl Inner {
    fn current_id(&self) -> Option<u64> {
        self.current.as_ref().map(|running| running.control.id())
    }

    fn clear(&mut self) -> Option<Running> {
        self.state = SerializerState::Idle;
        self.current.take()
    }
}

struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Shared {
    /// Called from a task thread once its task has ended.
    fn task_finished(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.current_id() == Some(id) {
            inner.clear();
            debug!(task = id, "Serializer idle");
        }
        self.changed.notify_all();
    }
}

enum Admission {
    Start,
    Queue(u64),
    Contend(String),
}

#[derive(Clone)]
pub struct ExecutionSerializer {
    shared: Arc<Shared>,
}

impl Default for ExecutionSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionSerializer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SerializerState::Idle,
                    current: None,
                    queued: false,
                    next_id: 1,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn state(&self) -> SerializerState {
        self.shared.inner.lock().state
    }

    /// Control block of the tracked task, if one is running.
    pub fn current(&self) -> Option<Arc<TaskControl>> {
        let inner = self.shared.inner.lock();
        inner.current.as_ref().map(|running| running.control.clone())
    }

    /// Admit `job` and run it on its own thread. Blocks while the tracked task is waiting or
    /// exclusive; fails with [`SessionError::QueueFull`] if another caller is already
    /// blocked that way.
    pub fn submit<F>(
        &self,
        title: impl Into<String>,
        exclusive: bool,
        listener: Arc<dyn TaskListener>,
        job: F,
    ) -> Result<TaskHandle, SessionError>
    where
        F: FnOnce(&Arc<TaskControl>) -> Result<Dynamic, SessionError> + Send + 'static,
    {
        let title = title.into();
        let mut inner = self.shared.inner.lock();
        let mut holds_queue = false;

        loop {
            let admission = match &inner.current {
                None => Admission::Start,
                Some(running) if running.control.has_exited() => Admission::Start,
                Some(running)
                    if inner.state == SerializerState::Interrupting
                        || running.control.is_waiting()
                        || running.control.is_exclusive() =>
                {
                    Admission::Queue(running.control.id())
                }
                Some(running) => Admission::Contend(running.control.title().to_string()),
            };

            match admission {
                Admission::Start => break,
                Admission::Contend(other) => {
                    warn!(
                        running = %other,
                        submitted = %title,
                        "There is already a task running, overriding the tracked task"
                    );
                    break;
                }
                Admission::Queue(blocking) => {
                    if !holds_queue {
                        if inner.queued {
                            return Err(SessionError::QueueFull(title));
                        }
                        inner.queued = true;
                        holds_queue = true;
                        debug!(task = %title, behind = blocking, "Queued behind running task");
                    }
                    while inner.current_id() == Some(blocking)
                        && inner
                            .current
                            .as_ref()
                            .is_some_and(|running| !running.control.has_exited())
                    {
                        self.shared.changed.wait(&mut inner);
                    }
                }
            }
        }

        if holds_queue {
            inner.queued = false;
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let control = Arc::new(TaskControl::new(id, title.clone(), exclusive).with_listener(listener));
        let slot: ResultSlot = Arc::new(Mutex::new(None));

        let thread = {
            let control = control.clone();
            let slot = slot.clone();
            let shared = self.shared.clone();
            std::thread::Builder::new()
                .name(format!("rivet-task-{}", id))
                .spawn(move || run_task(shared, control, slot, job))?
        };

        debug!(task = id, title = %title, exclusive, "Task started");
        inner.state = SerializerState::Running;
        inner.current = Some(Running {
            control: control.clone(),
            thread: Some(thread),
        });
        Ok(TaskHandle::new(control, slot))
    }

    /// Cancel the tracked task and wait up to [`INTERRUPT_GRACE_PERIOD`] for it to stop.
    /// A task still running after that is abandoned. The serializer is idle afterwards.
    pub fn interrupt(&self) -> InterruptOutcome {
        let control = {
            let mut inner = self.shared.inner.lock();
            let Some(control) = inner.current.as_ref().map(|r| r.control.clone()) else {
                return InterruptOutcome::Idle;
            };
            inner.state = SerializerState::Interrupting;
            control
        };

        info!(task = control.id(), title = %control.title(), "Interrupting task");
        control.cancel();
        let exit = control.wait_exit(INTERRUPT_GRACE_PERIOD);

        let forced = exit == TaskExit::Running && control.finish(TaskExit::Terminated);
        let released = {
            let mut inner = self.shared.inner.lock();
            let released = if inner.current_id() == Some(control.id()) {
                inner.clear()
            } else {
                None
            };
            if inner.state == SerializerState::Interrupting {
                inner.state = SerializerState::Idle;
            }
            self.shared.changed.notify_all();
            released
        };

        if forced {
            warn!(
                task = control.id(),
                title = %control.title(),
                grace_ms = INTERRUPT_GRACE_PERIOD.as_millis() as u64,
                "Task did not stop within the grace period, abandoning its thread"
            );
            control.notify_ended();
            return InterruptOutcome::Forced;
        }

        if let Some(thread) = released.and_then(|mut running| running.thread.take()) {
            let _ = thread.join();
        }
        InterruptOutcome::Cooperative
    }

    /// Block until nothing is tracked or `timeout` elapses. Returns whether the serializer is
    /// idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        while inner.current.is_some() {
            if self.shared.changed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.current.is_none()
    }
}

fn run_task<F>(shared: Arc<Shared>, control: Arc<TaskControl>, slot: ResultSlot, job: F)
where
    F: FnOnce(&Arc<TaskControl>) -> Result<Dynamic, SessionError>,
{
    control.notify_started();
    let exit = match std::panic::catch_unwind(AssertUnwindSafe(|| job(&control))) {
        Ok(result) => {
            *slot.lock() = Some(result);
            TaskExit::Completed
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(task = control.id(), title = %control.title(), panic = %message, "Task panicked");
            *slot.lock() = Some(Err(SessionError::TaskFailed(message)));
            TaskExit::Panicked
        }
    };
    control.finish(exit);
    control.notify_ended();
    shared.task_finished(control.id());
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
