//! Execution Context
//!
//! A context is the code-loading boundary, the engine bound to it and the persistent scope
//! holding the session bindings. Contexts are never rebuilt in place: the builder produces a
//! new one with the next generation and the session swaps it in.

pub mod builder;
pub mod loading;

pub use builder::{
    ContextBuilder, ProjectDirSupplier, RebuildOptions,
    ResolutionListener, TranscriptResolutionListener,
};
pub use loading::{LoadingScope, ScopeModuleResolver};

use crate::engine::{create_engine, ActiveTask, EvaluationFault, HostBindings};
use crate::error::SessionError;
use crate::report::{EnvironmentSnapshot, OutputRouter, OutputSink};
use crate::resolver::CodeLocation;
use crate::session::task::TaskControl;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rhai::{Dynamic, Engine, Scope};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long `remove_variable` waits for a scope held by a running evaluation.
pub const SCOPE_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// How long an evaluation waits for the scope before running as a contender on a copy.
const CONTENTION_WAIT: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct ScopeEntry {
    name: String,
    constant: bool,
    value: Dynamic,
}

pub struct Context {
    generation: u64,
    created_at: DateTime<Utc>,
    engine: Engine,
    scope: Mutex<Scope<'static>>,
    /// Bindings as of the last finished access, plus contender changes not yet merged.
    published: RwLock<Scope<'static>>,
    /// Contender changes waiting for the scope to be released.
    pending: Mutex<Vec<ScopeEntry>>,
    loading: Arc<RwLock<LoadingScope>>,
    router: OutputRouter,
    active: ActiveTask,
    used: AtomicBool,
    possibly_corrupted: AtomicBool,
}

impl Context {
    pub fn new(generation: u64, loading: LoadingScope, bindings: &HostBindings) -> Self {
        let loading = Arc::new(RwLock::new(loading));
        let router = OutputRouter::default();
        let active = ActiveTask::default();
        let engine = create_engine(
            ScopeModuleResolver::new(loading.clone()),
            router.clone(),
            active.clone(),
        );

        let mut scope = Scope::new();
        for (name, value) in bindings.iter() {
            scope.push_dynamic(name.to_string(), value.clone());
        }

        Self {
            generation,
            created_at: Utc::now(),
            engine,
            published: RwLock::new(scope.clone()),
            scope: Mutex::new(scope),
            pending: Mutex::new(Vec::new()),
            loading,
            router,
            active,
            used: AtomicBool::new(false),
            possibly_corrupted: AtomicBool::new(false),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn loading_scope(&self) -> LoadingScope {
        self.loading.read().clone()
    }

    /// Add previously resolved locations. Only allowed before the first evaluation.
    pub fn augment(&self, locations: Vec<CodeLocation>) -> Result<(), SessionError> {
        if self.used.load(Ordering::SeqCst) {
            return Err(SessionError::ContextInUse(self.generation));
        }
        debug!(generation = self.generation, count = locations.len(), "Augmenting context");
        self.loading.write().extend(locations);
        Ok(())
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::SeqCst)
    }

    /// Set after a task was abandoned mid-evaluation on this context.
    pub fn mark_possibly_corrupted(&self) {
        self.possibly_corrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_possibly_corrupted(&self) -> bool {
        self.possibly_corrupted.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> EvaluationFault {
        if self.is_possibly_corrupted() {
            EvaluationFault::engine(format!(
                "context generation {} is held by a task that was abandoned; \
                 rebuild the context to continue",
                self.generation
            ))
        } else {
            EvaluationFault::engine(format!(
                "context generation {} is busy with another evaluation; try again when it finishes",
                self.generation
            ))
        }
    }

    fn lock_scope(&self, timeout: Duration) -> Option<MutexGuard<'_, Scope<'static>>> {
        let mut scope = self.scope.try_lock_for(timeout)?;
        self.merge_pending(&mut scope);
        Some(scope)
    }

    fn merge_pending(&self, scope: &mut Scope<'static>) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for entry in pending {
            apply(scope, entry);
        }
    }

    fn publish(&self, scope: &Scope<'static>) {
        *self.published.write() = scope.clone();
    }

    /// Record changes made away from the scope: visible now through the published bindings,
    /// merged into the scope as soon as it is free.
    fn defer(&self, entries: Vec<ScopeEntry>) {
        {
            let mut published = self.published.write();
            for entry in &entries {
                apply(&mut published, entry.clone());
            }
        }
        self.pending.lock().extend(entries);
        if let Some(mut scope) = self.scope.try_lock() {
            self.merge_pending(&mut scope);
            self.publish(&scope);
        }
    }

    /// Evaluate `script` with the host bindings and `extra` bound, writing output to `sink`
    /// and honouring cancellation through `control`.
    ///
    /// When another evaluation holds the scope, this one runs anyway on a copy of the
    /// published bindings; the bindings it declares or changes are merged back afterwards.
    pub fn evaluate(
        &self,
        script: &str,
        bindings: &HostBindings,
        extra: &[(String, Dynamic)],
        sink: Arc<dyn OutputSink>,
        control: Arc<TaskControl>,
    ) -> Result<Dynamic, EvaluationFault> {
        self.used.store(true, Ordering::SeqCst);
        if self.is_possibly_corrupted() {
            warn!(
                generation = self.generation,
                "Evaluating on a context that may be inconsistent after a forced termination"
            );
        }

        let Some(mut scope) = self.lock_scope(CONTENTION_WAIT) else {
            return self.evaluate_contended(script, bindings, extra, sink, control);
        };
        bind_all(&mut scope, bindings, extra);
        let result = self.run(&mut scope, script, sink, control);
        self.merge_pending(&mut scope);
        self.publish(&scope);
        result
    }

    fn evaluate_contended(
        &self,
        script: &str,
        bindings: &HostBindings,
        extra: &[(String, Dynamic)],
        sink: Arc<dyn OutputSink>,
        control: Arc<TaskControl>,
    ) -> Result<Dynamic, EvaluationFault> {
        warn!(
            generation = self.generation,
            "Scope held by another evaluation, running on a copy of the published bindings"
        );
        let mut scope = self.published.read().clone();
        let before: Vec<(String, String)> = scope
            .iter()
            .map(|(name, _, value)| (name.to_string(), format!("{:?}", value)))
            .collect();

        bind_all(&mut scope, bindings, extra);
        let result = self.run(&mut scope, script, sink, control);

        let changed = scope
            .iter()
            .enumerate()
            .filter(|(index, (name, _, value))| {
                before
                    .get(*index)
                    .map_or(true, |(old, repr)| old != name || *repr != format!("{:?}", value))
            })
            .map(|(_, (name, constant, value))| ScopeEntry {
                name: name.to_string(),
                constant,
                value,
            })
            .collect::<Vec<_>>();
        debug!(generation = self.generation, changed = changed.len(), "Contended evaluation finished");
        self.defer(changed);
        result
    }

    fn run(
        &self,
        scope: &mut Scope<'static>,
        script: &str,
        sink: Arc<dyn OutputSink>,
        control: Arc<TaskControl>,
    ) -> Result<Dynamic, EvaluationFault> {
        let _active = self.active.enter(control);
        let _capture = self.router.install(sink);
        self.engine
            .eval_with_scope::<Dynamic>(scope, script)
            .map_err(EvaluationFault::from)
    }

    /// Bind `name`. While an evaluation holds the scope the binding is merged once it ends.
    pub fn set_variable(&self, name: &str, value: Dynamic) {
        match self.lock_scope(CONTENTION_WAIT) {
            Some(mut scope) => {
                bind(&mut scope, name, value);
                self.publish(&scope);
            }
            None => self.defer(vec![ScopeEntry {
                name: name.to_string(),
                constant: false,
                value,
            }]),
        }
    }

    pub fn variable(&self, name: &str) -> Option<Dynamic> {
        self.published.read().get_value::<Dynamic>(name)
    }

    /// Remove every binding called `name`, shadowed ones included.
    pub fn remove_variable(&self, name: &str) -> Result<Option<Dynamic>, EvaluationFault> {
        let mut scope = self
            .lock_scope(SCOPE_LOCK_TIMEOUT)
            .ok_or_else(|| self.unavailable())?;
        let removed = scope.get_value::<Dynamic>(name);
        if removed.is_some() {
            let mut kept = Scope::new();
            for (binding, constant, value) in scope.iter() {
                if binding == name {
                    continue;
                }
                if constant {
                    kept.push_constant_dynamic(binding.to_string(), value);
                } else {
                    kept.push_dynamic(binding.to_string(), value);
                }
            }
            *scope = kept;
        }
        self.publish(&scope);
        Ok(removed)
    }

    /// Current bindings. While an evaluation is in flight these are the bindings as of its
    /// start, plus whatever finished contenders added.
    pub fn snapshot(&self) -> EnvironmentSnapshot {
        let bindings: BTreeMap<String, Dynamic> = self
            .published
            .read()
            .iter()
            .map(|(name, _, value)| (name.to_string(), value))
            .collect();
        EnvironmentSnapshot::new(self.generation, bindings)
    }
}

fn bind_all(scope: &mut Scope<'static>, bindings: &HostBindings, extra: &[(String, Dynamic)]) {
    let extra = extra.iter().map(|(name, value)| (name.as_str(), value));
    for (name, value) in bindings.iter().chain(extra) {
        bind(scope, name, value.clone());
    }
}

/// Bind `name`, leaving script-declared constants untouched.
fn bind(scope: &mut Scope<'static>, name: &str, value: Dynamic) {
    if scope.is_constant(name) == Some(true) {
        warn!(name, "Not rebinding a constant declared by the session");
        return;
    }
    scope.set_value(name.to_string(), value);
}

fn apply(scope: &mut Scope<'static>, entry: ScopeEntry) {
    if entry.constant && !scope.contains(&entry.name) {
        scope.push_constant_dynamic(entry.name, entry.value);
    } else {
        bind(scope, &entry.name, entry.value);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("generation", &self.generation)
            .field("created_at", &self.created_at)
            .field("locations", &self.loading.read().len())
            .field("possibly_corrupted", &self.is_possibly_corrupted())
            .finish()
    }
}
