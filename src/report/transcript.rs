//! The host transcript: where session output, warnings and prompts end up.

use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::io::Write;

/// Observable session transcript. Calls arrive incrementally while a script runs, from
/// whichever thread is running it.
pub trait Transcript: Send + Sync {
    /// Append normal output verbatim.
    fn on_output(&self, text: &str);

    /// Append error-stream output or a reported fault.
    fn on_warning(&self, text: &str);

    /// Signal that the session is ready for the next input.
    fn prompt(&self) {}
}

/// Transcript written to the terminal. Warnings are styled.
pub struct ConsoleTranscript {
    color: bool,
    lock: Mutex<()>,
}

impl ConsoleTranscript {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            lock: Mutex::new(()),
        }
    }
}

impl Default for ConsoleTranscript {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Transcript for ConsoleTranscript {
    fn on_output(&self, text: &str) {
        let _guard = self.lock.lock();
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", text);
    }

    fn on_warning(&self, text: &str) {
        let _guard = self.lock.lock();
        let mut stderr = std::io::stderr().lock();
        if self.color {
            let _ = writeln!(stderr, "{}", text.yellow());
        } else {
            let _ = writeln!(stderr, "{}", text);
        }
    }

    fn prompt(&self) {
        let _guard = self.lock.lock();
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "> ");
        let _ = stdout.flush();
    }
}

/// One recorded transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    Output(String),
    Warning(String),
    Prompt,
}

/// Transcript that records everything in memory.
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    entries: Mutex<Vec<TranscriptEntry>>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().clone()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                TranscriptEntry::Output(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                TranscriptEntry::Warning(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn prompt_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| matches!(e, TranscriptEntry::Prompt))
            .count()
    }

    /// All output and warning text joined with newlines.
    pub fn text(&self) -> String {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                TranscriptEntry::Output(text) | TranscriptEntry::Warning(text) => {
                    Some(text.as_str())
                }
                TranscriptEntry::Prompt => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Transcript for MemoryTranscript {
    fn on_output(&self, text: &str) {
        self.entries.lock().push(TranscriptEntry::Output(text.to_string()));
    }

    fn on_warning(&self, text: &str) {
        self.entries.lock().push(TranscriptEntry::Warning(text.to_string()));
    }

    fn prompt(&self) {
        self.entries.lock().push(TranscriptEntry::Prompt);
    }
}
