//! Script Engine
//!
//! Creation of the embedded Rhai engine: output hooks, the cooperative cancellation hook and
//! the host functions available to every script.

pub mod fault;

pub use fault::{EvaluationFault, FaultKind};

use crate::report::OutputRouter;
use crate::session::task::TaskControl;
use parking_lot::RwLock;
use rhai::module_resolvers::ModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Position};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Operations between two checks of the cancellation flag.
const PROGRESS_CHECK_INTERVAL: u64 = 64;

/// Granularity of the interruptible `sleep` host function.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Host-fixed bindings injected into every context and every evaluation.
#[derive(Debug, Clone, Default)]
pub struct HostBindings {
    values: BTreeMap<String, Dynamic>,
}

impl HostBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Dynamic) -> Option<Dynamic> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Dynamic> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dynamic)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Dynamic)> for HostBindings {
    fn from_iter<I: IntoIterator<Item = (S, Dynamic)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

/// The tasks currently evaluating on an engine, one per evaluating thread.
#[derive(Clone, Default)]
pub struct ActiveTask {
    slots: Arc<RwLock<HashMap<ThreadId, Arc<TaskControl>>>>,
}

impl ActiveTask {
    /// Make `control` the calling thread's active task until the guard drops.
    pub fn enter(&self, control: Arc<TaskControl>) -> ActiveTaskGuard {
        let thread = thread::current().id();
        let previous = self.slots.write().insert(thread, control);
        ActiveTaskGuard {
            slots: self.slots.clone(),
            thread,
            previous,
        }
    }

    pub fn current(&self) -> Option<Arc<TaskControl>> {
        self.slots.read().get(&thread::current().id()).cloned()
    }

    pub fn is_cancelled(&self) -> bool {
        self.current()
            .map(|control| control.is_cancelled())
            .unwrap_or(false)
    }
}

pub struct ActiveTaskGuard {
    slots: Arc<RwLock<HashMap<ThreadId, Arc<TaskControl>>>>,
    thread: ThreadId,
    previous: Option<Arc<TaskControl>>,
}

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.write();
        match self.previous.take() {
            Some(previous) => {
                slots.insert(self.thread, previous);
            }
            None => {
                slots.remove(&self.thread);
            }
        }
    }
}

/// Create an engine bound to a module resolver, writing output through `router` and
/// honouring cancellation of the task in `active`.
pub fn create_engine(
    resolver: impl ModuleResolver + 'static,
    router: OutputRouter,
    active: ActiveTask,
) -> Engine {
    let mut engine = Engine::new();
    engine.set_module_resolver(resolver);

    let out = router.clone();
    engine.on_print(move |text| out.out(text));

    let debug = router.clone();
    engine.on_debug(move |text, source, pos| {
        let line = match source {
            Some(source) => format!("{} @ {} | {}", source, pos, text),
            None if pos.is_none() => text.to_string(),
            None => format!("{} | {}", pos, text),
        };
        debug.out(&line);
    });

    let err = router;
    engine.register_fn("eprint", move |text: &str| err.err(text));

    let sleeper = active.clone();
    engine.register_fn("sleep", move |ms: i64| sleep_interruptibly(&sleeper, ms));

    engine.register_fn("read_text", |path: &str| -> Result<String, Box<EvalAltResult>> {
        std::fs::read_to_string(path).map_err(|e| {
            EvalAltResult::ErrorSystem(format!("Failed to read {}", path), Box::new(e)).into()
        })
    });

    engine.on_progress(move |ops| {
        if ops % PROGRESS_CHECK_INTERVAL == 0 && active.is_cancelled() {
            Some(Dynamic::from("interrupted".to_string()))
        } else {
            None
        }
    });

    engine
}

/// Sleep in small slices so an interrupt is noticed. The task counts as waiting meanwhile.
fn sleep_interruptibly(active: &ActiveTask, ms: i64) -> Result<(), Box<EvalAltResult>> {
    let control = active.current();
    let _waiting = control.as_ref().map(|c| c.wait_on());
    let deadline = Instant::now() + Duration::from_millis(ms.max(0) as u64);
    loop {
        if control.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(EvalAltResult::ErrorTerminated(
                Dynamic::from("interrupted".to_string()),
                Position::NONE,
            )
            .into());
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
