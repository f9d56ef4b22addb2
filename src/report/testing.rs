//! Test outcomes and batch aggregation.

use crate::engine::{EvaluationFault, FaultKind};
use std::time::Duration;

/// Indentation for lines that belong to a test.
pub const INDENT: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestOutcome {
    Success,
    /// The script itself faulted.
    Failure,
    /// Anything else went wrong.
    Error,
}

impl TestOutcome {
    pub fn for_fault(fault: &EvaluationFault) -> TestOutcome {
        match fault.kind {
            FaultKind::Script => TestOutcome::Failure,
            FaultKind::Engine | FaultKind::Io | FaultKind::Unknown => TestOutcome::Error,
        }
    }
}

/// A named test script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub title: String,
    pub script: String,
}

impl TestCase {
    pub fn new(title: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            script: script.into(),
        }
    }
}

#[derive(Debug)]
pub struct TestResult {
    pub title: String,
    pub outcome: TestOutcome,
    pub out: String,
    pub err: String,
    pub fault: Option<EvaluationFault>,
    /// Short description of what went wrong, for non-successful outcomes.
    pub issue: Option<String>,
    pub duration: Duration,
}

impl TestResult {
    pub fn success(title: impl Into<String>, duration: Duration) -> Self {
        Self {
            title: title.into(),
            outcome: TestOutcome::Success,
            out: String::new(),
            err: String::new(),
            fault: None,
            issue: None,
            duration,
        }
    }

    pub fn from_fault(title: impl Into<String>, fault: EvaluationFault, duration: Duration) -> Self {
        let title = title.into();
        let outcome = TestOutcome::for_fault(&fault);
        let issue = match outcome {
            TestOutcome::Failure => format!("Script fault executing test {}", title),
            _ => format!("{} fault occurred running test {}", fault.kind, title),
        };
        Self {
            title,
            outcome,
            out: String::new(),
            err: String::new(),
            fault: Some(fault),
            issue: Some(issue),
            duration,
        }
    }

    pub fn with_output(mut self, out: String, err: String) -> Self {
        self.out = out;
        self.err = err;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TestOutcome::Success
    }

    /// `# <title>: Success` or `# <title>: Failure detected: <message>`.
    pub fn banner(&self) -> String {
        match &self.fault {
            None => format!("# {}: Success", self.title),
            Some(fault) => format!("# {}: Failure detected: {}", self.title, fault.single_line()),
        }
    }
}

/// Aggregated results of a batch.
#[derive(Debug, Default)]
pub struct TestRun {
    pub results: Vec<TestResult>,
    pub elapsed: Duration,
}

impl TestRun {
    pub fn count(&self, outcome: TestOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn successes(&self) -> usize {
        self.count(TestOutcome::Success)
    }

    pub fn failures(&self) -> usize {
        self.count(TestOutcome::Failure)
    }

    pub fn errors(&self) -> usize {
        self.count(TestOutcome::Error)
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(TestResult::is_success)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Tests run: {}, Successes: {}, Failures: {}, Errors: {}",
            self.results.len(),
            self.successes(),
            self.failures(),
            self.errors()
        )
    }
}

/// `mm minutes, ss seconds, SSS millis`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    format!(
        "{:02} minutes, {:02} seconds, {:03} millis",
        millis / 60_000,
        (millis / 1000) % 60,
        millis % 1000
    )
}
