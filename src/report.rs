//! Output Capture & Session Reporter
//!
//! Routes evaluation output into the transcript, publishes environment snapshots to
//! observers and prints test results.

pub mod capture;
pub mod snapshot;
pub mod testing;
pub mod transcript;

pub use capture::{BufferSink, CaptureGuard, OutputRouter, OutputSink, ProcessSink, TranscriptSink};
pub use snapshot::{EnvironmentObserver, EnvironmentSnapshot};
pub use testing::{TestCase, TestOutcome, TestResult, TestRun};
pub use transcript::{ConsoleTranscript, MemoryTranscript, Transcript, TranscriptEntry};

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

pub struct SessionReporter {
    transcript: Arc<dyn Transcript>,
    observers: RwLock<Vec<Arc<dyn EnvironmentObserver>>>,
    latest: RwLock<Option<EnvironmentSnapshot>>,
}

impl SessionReporter {
    pub fn new(transcript: Arc<dyn Transcript>) -> Self {
        Self {
            transcript,
            observers: RwLock::new(Vec::new()),
            latest: RwLock::new(None),
        }
    }

    pub fn transcript(&self) -> &Arc<dyn Transcript> {
        &self.transcript
    }

    pub fn add_observer(&self, observer: Arc<dyn EnvironmentObserver>) {
        self.observers.write().push(observer);
    }

    /// Keep `snapshot` as the latest and hand it to every observer.
    pub fn publish(&self, snapshot: EnvironmentSnapshot) {
        debug!(
            generation = snapshot.generation(),
            bindings = snapshot.len(),
            "Publishing environment snapshot"
        );
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.environment_updated(&snapshot);
        }
        *self.latest.write() = Some(snapshot);
    }

    pub fn latest(&self) -> Option<EnvironmentSnapshot> {
        self.latest.read().clone()
    }

    pub fn clear(&self) {
        *self.latest.write() = None;
    }

    /// Captured output of one test, indented, followed by its banner.
    pub fn print_test_result(&self, result: &TestResult, indent: &str) {
        let out = capture::indent_lines(&result.out, indent);
        if !out.is_empty() {
            self.transcript.on_output(&out);
        }
        let err = capture::indent_lines(&result.err, indent);
        if !err.is_empty() {
            self.transcript.on_output(&err);
        }
        let banner = format!("{}{}", indent, result.banner());
        if result.is_success() {
            self.transcript.on_output(&banner);
        } else {
            self.transcript.on_warning(&banner);
        }
    }

    pub fn print_test_summary(&self, run: &TestRun) {
        self.transcript.on_output("");
        self.transcript.on_output("Tests summary:");
        self.transcript.on_output("--------------");
        self.transcript.on_output(&run.summary_line());
        self.transcript
            .on_output(&format!("Time: {}", testing::format_duration(run.elapsed)));
    }
}
