//! Test batches: outcome classification, banners and summary

use crate::integration::test_utils::test_session;
use rivet::config::SessionConfig;
use rivet::report::{TestCase, TestOutcome};
use tempfile::TempDir;

fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("adds", "let x = 1 + 1; if x != 2 { throw \"math\" }"),
        TestCase::new("throws", "throw \"boom\""),
        TestCase::new("undefined", "undefined_var"),
        TestCase::new("missing_file", "read_text(\"/nonexistent/rivet/data.txt\")"),
        TestCase::new("prints", "print(\"checking\"); 1"),
    ]
}

#[test]
fn test_batch_counts_successes_failures_and_errors() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();

    let run = session.run_tests(cases()).unwrap();
    assert_eq!(run.results.len(), 5);
    assert_eq!(run.successes(), 2);
    assert_eq!(run.failures(), 2);
    assert_eq!(run.errors(), 1);
    assert!(!run.all_passed());

    let outcomes: Vec<TestOutcome> = run.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            TestOutcome::Success,
            TestOutcome::Failure,
            TestOutcome::Failure,
            TestOutcome::Error,
            TestOutcome::Success,
        ]
    );
}

#[test]
fn test_batch_transcript_layout() {
    let project = TempDir::new().unwrap();
    let (session, transcript) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();
    transcript.clear();

    session.run_tests(cases()).unwrap();
    let outputs = transcript.outputs();
    assert_eq!(outputs[0], "Running tests");
    assert_eq!(outputs[1], "-------------");
    assert_eq!(outputs[2], "# Running test adds");
    assert_eq!(outputs[3], "  # adds: Success");
    assert!(outputs.iter().any(|line| line == "  checking"));
    assert!(outputs
        .iter()
        .any(|line| line == "Tests run: 5, Successes: 2, Failures: 2, Errors: 1"));
    assert!(outputs.iter().any(|line| line.starts_with("Time: ")));

    let warnings = transcript.warnings();
    assert_eq!(warnings.len(), 3);
    assert!(warnings[0].starts_with("  # throws: Failure detected: "));
}

#[test]
fn test_single_test_has_no_summary() {
    let project = TempDir::new().unwrap();
    let (session, transcript) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();
    transcript.clear();

    let result = session.run_test("print(\"alone\")", "solo").unwrap();
    assert!(result.is_success());
    assert_eq!(result.out.trim_end(), "alone");
    let outputs = transcript.outputs();
    assert!(outputs.iter().any(|line| line == "# solo: Success"));
    assert!(!outputs.iter().any(|line| line.starts_with("Tests run:")));
}

#[test]
fn test_tests_share_the_session_scope() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();
    session.evaluate("let threshold = 3;", &[]).unwrap();

    let run = session
        .run_tests(vec![TestCase::new(
            "threshold",
            "if threshold != 3 { throw \"wrong threshold\" }",
        )])
        .unwrap();
    assert!(run.all_passed());
}
