//! Script Execution Session
//!
//! The session owns the active context, the execution serializer and the reporter. Callers
//! submit script text and get values, transcript output and environment snapshots back.

pub mod serializer;
pub mod task;

pub use serializer::{ExecutionSerializer, InterruptOutcome, SerializerState, INTERRUPT_GRACE_PERIOD};
pub use task::{NoopListener, Task, TaskControl, TaskExit, TaskHandle, TaskListener};

use crate::config::SessionConfig;
use crate::context::{
    Context, ContextBuilder, LoadingScope, ProjectDirSupplier, ResolutionListener,
    TranscriptResolutionListener,
};
use crate::engine::{EvaluationFault, HostBindings};
use crate::error::SessionError;
use crate::report::testing::INDENT;
use crate::report::{
    BufferSink, EnvironmentObserver, EnvironmentSnapshot, OutputSink, ProcessSink,
    SessionReporter, TestCase, TestResult, TestRun, Transcript, TranscriptSink,
};
use crate::resolver::cache::run_deferred_deletions;
use crate::resolver::{
    strategy_for, ArtifactCache, ArtifactFetcher, CodeLocation, DependencyManifest,
    DependencyResolver, HttpFetcher, RepositoryDescriptor, RepositoryStore,
};
use parking_lot::{Mutex, RwLock};
use rhai::Dynamic;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Version reported in the banner written after each rebuild.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the global and project autorun scripts.
pub const AUTORUN_FILENAME: &str = "autorun.rhai";

/// Collaborators a session is assembled from. [`SessionComponents::defaults`] gives the
/// production set; tests swap individual pieces.
pub struct SessionComponents {
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub cache: ArtifactCache,
    /// Defaults to alerting through the transcript.
    pub listener: Option<Arc<dyn ResolutionListener>>,
    pub project_dir: Arc<dyn ProjectDirSupplier>,
    pub repositories: Vec<RepositoryDescriptor>,
}

impl SessionComponents {
    pub fn defaults(config: &SessionConfig) -> Result<Self, SessionError> {
        let cache = ArtifactCache::new(
            config
                .cache_dir
                .clone()
                .unwrap_or_else(ArtifactCache::default_root),
        );
        let repositories = if config.repositories.is_empty() {
            match RepositoryStore::default_location() {
                Some(store) => store.load()?,
                None => crate::resolver::repositories::default_repositories(),
            }
        } else {
            config.repositories.clone()
        };
        let project_dir = config.project_dir.clone();
        Ok(Self {
            fetcher: Arc::new(HttpFetcher::new()?),
            cache,
            listener: None,
            project_dir: Arc::new(move || {
                project_dir
                    .clone()
                    .or_else(|| std::env::current_dir().ok())
            }),
            repositories,
        })
    }
}

struct SessionShared {
    config: SessionConfig,
    builder: ContextBuilder,
    resolver: Arc<DependencyResolver>,
    serializer: ExecutionSerializer,
    context: RwLock<Option<Arc<Context>>>,
    bindings: RwLock<HostBindings>,
    base_scope: RwLock<LoadingScope>,
    manifest: RwLock<DependencyManifest>,
    reporter: SessionReporter,
    rebuild_lock: Mutex<()>,
}

/// Handle to a scripting session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    pub fn new(config: SessionConfig, transcript: Arc<dyn Transcript>) -> Result<Self, SessionError> {
        let components = SessionComponents::defaults(&config)?;
        Ok(Self::with_components(config, transcript, components))
    }

    pub fn with_components(
        config: SessionConfig,
        transcript: Arc<dyn Transcript>,
        components: SessionComponents,
    ) -> Self {
        let resolver = Arc::new(DependencyResolver::new(components.cache, components.fetcher));
        let listener = components
            .listener
            .unwrap_or_else(|| Arc::new(TranscriptResolutionListener::new(transcript.clone())));
        let builder = ContextBuilder::new(
            components.project_dir,
            strategy_for(config.resolver, resolver.clone()),
            listener,
        )
        .with_build_output_dirs(config.build_output_dirs.clone());
        let manifest = DependencyManifest::new(components.repositories, config.dependencies.clone());
        let base_scope = LoadingScope::from_dirs(config.module_dirs.clone());

        Self {
            shared: Arc::new(SessionShared {
                config,
                builder,
                resolver,
                serializer: ExecutionSerializer::new(),
                context: RwLock::new(None),
                bindings: RwLock::new(HostBindings::new()),
                base_scope: RwLock::new(base_scope),
                manifest: RwLock::new(manifest),
                reporter: SessionReporter::new(transcript),
                rebuild_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn transcript(&self) -> &Arc<dyn Transcript> {
        self.shared.reporter.transcript()
    }

    pub fn reporter(&self) -> &SessionReporter {
        &self.shared.reporter
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.shared.resolver
    }

    pub fn state(&self) -> SerializerState {
        self.shared.serializer.state()
    }

    pub fn context(&self) -> Option<Arc<Context>> {
        self.shared.context.read().clone()
    }

    fn current_context(&self) -> Result<Arc<Context>, SessionError> {
        self.context().ok_or(SessionError::EngineNotReady)
    }

    pub fn manifest(&self) -> DependencyManifest {
        self.shared.manifest.read().clone()
    }

    /// Replace the manifest used by the next rebuild.
    pub fn set_manifest(&self, manifest: DependencyManifest) {
        *self.shared.manifest.write() = manifest;
    }

    /// Replace the base module directories used by the next rebuild.
    pub fn set_base_scope(&self, scope: LoadingScope) {
        *self.shared.base_scope.write() = scope;
    }

    /// Host-fixed binding injected into every evaluation from now on.
    pub fn set_binding(&self, name: impl Into<String>, value: Dynamic) {
        self.shared.bindings.write().insert(name, value);
    }

    pub fn remove_binding(&self, name: &str) -> Option<Dynamic> {
        self.shared.bindings.write().remove(name)
    }

    pub fn add_observer(&self, observer: Arc<dyn EnvironmentObserver>) {
        self.shared.reporter.add_observer(observer);
    }

    /// Latest published environment snapshot.
    pub fn environment_snapshot(&self) -> Option<EnvironmentSnapshot> {
        self.shared.reporter.latest()
    }

    /// Evaluate on the calling thread, writing output to the transcript.
    pub fn evaluate(&self, script: &str, extra: &[(String, Dynamic)]) -> Result<Dynamic, SessionError> {
        let context = self.current_context()?;
        let sink = Arc::new(TranscriptSink::new(self.transcript().clone()));
        self.evaluate_on(&context, script, extra, sink, "evaluate")
            .map_err(SessionError::from)
    }

    /// Evaluate on the calling thread, writing output to the process streams.
    pub fn evaluate_silent(
        &self,
        script: &str,
        extra: &[(String, Dynamic)],
    ) -> Result<Dynamic, SessionError> {
        let context = self.current_context()?;
        self.evaluate_on(&context, script, extra, Arc::new(ProcessSink), "evaluate_silent")
            .map_err(SessionError::from)
    }

    fn evaluate_on(
        &self,
        context: &Context,
        script: &str,
        extra: &[(String, Dynamic)],
        sink: Arc<dyn OutputSink>,
        title: &str,
    ) -> Result<Dynamic, EvaluationFault> {
        let bindings = self.shared.bindings.read().clone();
        context.evaluate(script, &bindings, extra, sink, Arc::new(TaskControl::detached(title)))
    }

    /// Run `script` as a serialized task. Whatever happens, `listener` is told the task
    /// ended, the environment snapshot is refreshed and a prompt follows.
    pub fn evaluate_async(
        &self,
        script: impl Into<String>,
        title: impl Into<String>,
        listener: Arc<dyn TaskListener>,
        extra: Vec<(String, Dynamic)>,
    ) -> Result<TaskHandle, SessionError> {
        let context = self.current_context()?;
        let session = self.clone();
        let script = script.into();
        let title = title.into();
        debug!(title = %title, generation = context.generation(), "Submitting evaluation");

        self.shared
            .serializer
            .submit(title, false, listener, move |control| {
                let _completion = Completion {
                    session: &session,
                    context: &context,
                    control,
                };
                let transcript = session.transcript().clone();
                let bindings = session.shared.bindings.read().clone();
                let sink = Arc::new(TranscriptSink::new(transcript.clone()));
                match context.evaluate(&script, &bindings, &extra, sink, control.clone()) {
                    Ok(value) => {
                        if !value.is_unit() {
                            transcript.on_output(&value.to_string());
                        }
                        Ok(value)
                    }
                    Err(fault) => {
                        transcript.on_warning(&fault.to_string());
                        Err(SessionError::from(fault))
                    }
                }
            })
    }

    /// Submit a prepared [`Task`].
    pub fn submit(&self, task: Task) -> Result<TaskHandle, SessionError> {
        self.evaluate_async(task.script, task.title, task.listener, task.extra)
    }

    /// Run one test script as a serialized task and report its banner.
    pub fn run_test(&self, script: impl Into<String>, title: impl Into<String>) -> Result<TestResult, SessionError> {
        let case = TestCase::new(title, script);
        let mut run = self.run_batch(vec![case], false)?;
        run.results
            .pop()
            .ok_or_else(|| SessionError::TaskFailed("test produced no result".to_string()))
    }

    /// Run `tests` in order against the current context inside one serialized task, with
    /// per-test banners and a summary.
    pub fn run_tests(&self, tests: Vec<TestCase>) -> Result<TestRun, SessionError> {
        self.run_batch(tests, true)
    }

    fn run_batch(&self, tests: Vec<TestCase>, with_summary: bool) -> Result<TestRun, SessionError> {
        let context = self.current_context()?;
        let session = self.clone();
        let outcome: Arc<Mutex<Option<TestRun>>> = Arc::new(Mutex::new(None));
        let slot = outcome.clone();
        let title = match tests.as_slice() {
            [single] => single.title.clone(),
            _ => format!("{} tests", tests.len()),
        };

        let handle = self
            .shared
            .serializer
            .submit(title, false, Arc::new(NoopListener), move |control| {
                let _completion = Completion {
                    session: &session,
                    context: &context,
                    control,
                };
                let reporter = session.reporter();
                let indent = if with_summary { INDENT } else { "" };
                if with_summary {
                    reporter.transcript().on_output("Running tests");
                    reporter.transcript().on_output("-------------");
                }

                let started = Instant::now();
                let mut run = TestRun::default();
                for case in tests {
                    if control.is_cancelled() {
                        warn!(remaining = %case.title, "Test batch interrupted");
                        break;
                    }
                    if with_summary {
                        reporter
                            .transcript()
                            .on_output(&format!("# Running test {}", case.title));
                    }
                    let result = session.run_case(&context, &case, control);
                    reporter.print_test_result(&result, indent);
                    run.results.push(result);
                }
                run.elapsed = started.elapsed();

                if with_summary {
                    reporter.print_test_summary(&run);
                }
                *slot.lock() = Some(run);
                Ok(Dynamic::UNIT)
            })?;

        handle.join()?;
        let run = outcome.lock().take();
        run.ok_or_else(|| SessionError::TaskFailed("test batch produced no results".to_string()))
    }

    fn run_case(&self, context: &Context, case: &TestCase, control: &Arc<TaskControl>) -> TestResult {
        let sink = Arc::new(BufferSink::new());
        let bindings = self.shared.bindings.read().clone();
        let started = Instant::now();
        let result = context.evaluate(&case.script, &bindings, &[], sink.clone(), control.clone());
        let duration = started.elapsed();
        let result = match result {
            Ok(_) => TestResult::success(&case.title, duration),
            Err(fault) => TestResult::from_fault(&case.title, fault, duration),
        };
        debug!(test = %case.title, outcome = ?result.outcome, "Test finished");
        result.with_output(sink.take_out(), sink.take_err())
    }

    /// Interrupt the running task. A task abandoned after the grace period leaves its
    /// context flagged as possibly corrupted.
    pub fn interrupt(&self) -> InterruptOutcome {
        let outcome = self.shared.serializer.interrupt();
        if outcome == InterruptOutcome::Forced {
            if let Some(context) = self.context() {
                context.mark_possibly_corrupted();
            }
            self.transcript().on_warning(
                "The running script did not stop and was abandoned; the session state may be \
                 inconsistent, restart the session to get a clean context",
            );
            self.transcript().prompt();
        }
        outcome
    }

    /// Build a new context as an exclusive task. Evaluations submitted meanwhile queue behind
    /// it. The task's value is the new generation.
    pub fn rebuild_context(&self) -> Result<TaskHandle, SessionError> {
        let session = self.clone();
        self.shared
            .serializer
            .submit("rebuild context", true, Arc::new(NoopListener), move |_| {
                let generation = session.rebuild_now()?;
                Ok(Dynamic::from(generation as i64))
            })
    }

    /// [`Session::rebuild_context`], waiting for the new generation.
    pub fn rebuild_context_blocking(&self) -> Result<u64, SessionError> {
        let value = self.rebuild_context()?.join()?;
        value
            .as_int()
            .map(|generation| generation as u64)
            .map_err(|kind| SessionError::TaskFailed(format!("rebuild returned a {}", kind)))
    }

    /// Restart: mark the transcript and rebuild.
    pub fn restart(&self) -> Result<TaskHandle, SessionError> {
        info!("Restarting session");
        self.transcript().on_output("[Session restarted]");
        self.rebuild_context()
    }

    fn rebuild_now(&self) -> Result<u64, SessionError> {
        let _rebuilding = self.shared.rebuild_lock.lock();
        let parent = self.shared.base_scope.read().clone();
        let manifest = self.shared.manifest.read().clone();
        let bindings = self.shared.bindings.read().clone();

        let context = Arc::new(self.shared.builder.rebuild(
            &parent,
            &manifest,
            &bindings,
            self.shared.config.rebuild_options(),
        )?);
        let generation = context.generation();
        *self.shared.context.write() = Some(context.clone());

        self.write_banner();
        self.run_autorun(&context);
        self.refresh_snapshot(&context);
        Ok(generation)
    }

    /// Resolve the current manifest with the configured strategy.
    pub fn resolve_dependencies(&self) -> Result<Vec<CodeLocation>, SessionError> {
        let manifest = self.shared.manifest.read().clone();
        self.shared.builder.resolve(&manifest)
    }

    fn write_banner(&self) {
        let line = format!("* Rivet {} (Rhai scripting) *", VERSION);
        let stars = "*".repeat(line.len());
        let transcript = self.transcript();
        transcript.on_output(&stars);
        transcript.on_output(&line);
        transcript.on_output(&stars);
    }

    fn run_autorun(&self, context: &Context) {
        let config = &self.shared.config;
        let mut scripts = Vec::new();
        if config.autorun_global {
            if let Some(install_dir) = &config.install_dir {
                scripts.push(install_dir.join(AUTORUN_FILENAME));
            }
        }
        if config.autorun_project {
            if let Some(project) = self.shared.builder.project_dir() {
                scripts.push(project.join(AUTORUN_FILENAME));
            }
        }

        for path in scripts.iter().filter(|path| path.is_file()) {
            if let Err(e) = self.run_autorun_script(context, path) {
                warn!(script = %path.display(), error = %e, "Autorun script failed");
                self.transcript()
                    .on_warning(&format!("Failed to run autorun script {}: {}", path.display(), e));
            }
        }
    }

    fn run_autorun_script(&self, context: &Context, path: &Path) -> Result<(), SessionError> {
        debug!(script = %path.display(), "Running autorun script");
        let script = std::fs::read_to_string(path)?;
        self.evaluate_on(context, &script, &[], Arc::new(ProcessSink), "autorun")?;
        Ok(())
    }

    fn refresh_snapshot(&self, context: &Context) {
        self.shared.reporter.publish(context.snapshot());
    }

    /// Bind a session variable in the current context.
    pub fn add_variable(&self, name: &str, value: Dynamic) -> Result<(), SessionError> {
        let context = self.current_context()?;
        context.set_variable(name, value);
        self.refresh_snapshot(&context);
        Ok(())
    }

    pub fn remove_variable(&self, name: &str) -> Result<Option<Dynamic>, SessionError> {
        let context = self.current_context()?;
        let removed = context.remove_variable(name)?;
        self.refresh_snapshot(&context);
        Ok(removed)
    }

    pub fn fetch_variable(&self, name: &str) -> Result<Option<Dynamic>, SessionError> {
        Ok(self.current_context()?.variable(name))
    }

    /// Project directory as supplied to the builder.
    pub fn project_dir(&self) -> Option<PathBuf> {
        self.shared.builder.project_dir()
    }

    /// Stop whatever is running and run pending deferred deletions.
    pub fn shutdown(&self) {
        if self.state() != SerializerState::Idle {
            self.interrupt();
        }
        let removed = run_deferred_deletions();
        info!(deferred_deletions = removed, "Session shut down");
    }
}

/// Runs when a serialized evaluation ends, unwinding included: listener, snapshot, prompt.
struct Completion<'a> {
    session: &'a Session,
    context: &'a Arc<Context>,
    control: &'a Arc<TaskControl>,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.control.notify_ended();
        self.session.refresh_snapshot(self.context);
        self.session.transcript().prompt();
    }
}
