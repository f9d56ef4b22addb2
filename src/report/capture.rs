//! Output capture: routing the script's output streams to the right sink.

use crate::report::transcript::Transcript;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Destination for the two output streams of an evaluation.
pub trait OutputSink: Send + Sync {
    fn out(&self, text: &str);

    fn err(&self, text: &str);

    fn flush(&self) {}
}

/// Appends into the session transcript as output arrives. Error output becomes warnings.
pub struct TranscriptSink {
    transcript: Arc<dyn Transcript>,
}

impl TranscriptSink {
    pub fn new(transcript: Arc<dyn Transcript>) -> Self {
        Self { transcript }
    }
}

impl OutputSink for TranscriptSink {
    fn out(&self, text: &str) {
        self.transcript.on_output(text);
    }

    fn err(&self, text: &str) {
        self.transcript.on_warning(text);
    }
}

/// The process's own stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSink;

impl OutputSink for ProcessSink {
    fn out(&self, text: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{}", text);
    }

    fn err(&self, text: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{}", text);
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

/// Collects both streams in memory, one line per call.
#[derive(Debug, Default)]
pub struct BufferSink {
    out: Mutex<String>,
    err: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_out(&self) -> String {
        std::mem::take(&mut *self.out.lock())
    }

    pub fn take_err(&self) -> String {
        std::mem::take(&mut *self.err.lock())
    }
}

impl OutputSink for BufferSink {
    fn out(&self, text: &str) {
        let mut out = self.out.lock();
        out.push_str(text);
        out.push('\n');
    }

    fn err(&self, text: &str) {
        let mut err = self.err.lock();
        err.push_str(text);
        err.push('\n');
    }
}

/// Prefix every line of `text` with `indent`. Blank input yields an empty string.
pub fn indent_lines(text: &str, indent: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed
        .lines()
        .map(|line| format!("{}{}", indent, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The sinks an engine's print hooks write to. Each evaluating thread has its own installed
/// sink, so overlapping evaluations on one engine keep their output apart. Threads with no
/// installed sink write to the default one.
#[derive(Clone)]
pub struct OutputRouter {
    default_sink: Arc<dyn OutputSink>,
    installed: Arc<RwLock<HashMap<ThreadId, Arc<dyn OutputSink>>>>,
}

impl OutputRouter {
    pub fn new(default_sink: Arc<dyn OutputSink>) -> Self {
        Self {
            default_sink,
            installed: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn sink(&self) -> Arc<dyn OutputSink> {
        self.installed
            .read()
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_else(|| self.default_sink.clone())
    }

    pub fn out(&self, text: &str) {
        self.sink().out(text);
    }

    pub fn err(&self, text: &str) {
        self.sink().err(text);
    }

    /// Route the calling thread's output to `sink` until the returned guard is dropped.
    pub fn install(&self, sink: Arc<dyn OutputSink>) -> CaptureGuard {
        let thread = thread::current().id();
        let previous = self.installed.write().insert(thread, sink.clone());
        CaptureGuard {
            router: self.clone(),
            thread,
            installed: sink,
            previous,
        }
    }
}

impl Default for OutputRouter {
    fn default() -> Self {
        Self::new(Arc::new(ProcessSink))
    }
}

/// Restores the thread's previous sink on drop, after flushing the installed one. Runs on
/// every exit path, unwinding included.
pub struct CaptureGuard {
    router: OutputRouter,
    thread: ThreadId,
    installed: Arc<dyn OutputSink>,
    previous: Option<Arc<dyn OutputSink>>,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.installed.flush();
        let mut installed = self.router.installed.write();
        match self.previous.take() {
            Some(previous) => {
                installed.insert(self.thread, previous);
            }
            None => {
                installed.remove(&self.thread);
            }
        }
    }
}
