//! Context rebuilds: generations, build output and resolution failures

use crate::integration::test_utils::test_session;
use parking_lot::Mutex;
use rivet::config::SessionConfig;
use rivet::context::{ContextBuilder, LoadingScope, RebuildOptions, ResolutionListener};
use rivet::engine::HostBindings;
use rivet::error::{ResolutionError, SessionError};
use rivet::resolver::{
    strategy_for, ArtifactCache, Coordinate, DependencyManifest, DependencyResolver, HttpFetcher,
    RepositoryDescriptor, ResolverKind,
};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingListener(Mutex<Vec<String>>);

impl ResolutionListener for RecordingListener {
    fn resolution_failed(&self, error: &ResolutionError) {
        self.0.lock().push(error.to_string());
    }
}

#[test]
fn test_each_rebuild_gets_a_larger_generation() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());

    let mut previous = 0;
    for _ in 0..3 {
        let generation = session.rebuild_context_blocking().unwrap();
        assert!(generation > previous);
        assert_eq!(session.context().unwrap().generation(), generation);
        previous = generation;
    }
}

#[test]
fn test_rebuild_starts_from_a_clean_scope() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());

    session.rebuild_context_blocking().unwrap();
    session.evaluate("let counter = 10;", &[]).unwrap();
    assert_eq!(session.evaluate("counter", &[]).unwrap().as_int(), Ok(10));

    session.rebuild_context_blocking().unwrap();
    let err = session.evaluate("counter", &[]).unwrap_err();
    assert!(err.as_fault().is_some());
}

#[test]
fn test_build_output_modules_are_importable() {
    let project = TempDir::new().unwrap();
    let build = project.path().join("build/main");
    std::fs::create_dir_all(&build).unwrap();
    std::fs::write(build.join("greet.rhai"), "fn hello(name) { `hello ${name}` }").unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());

    session.rebuild_context_blocking().unwrap();
    let value = session
        .evaluate(r#"import "greet" as g; g::hello("rivet")"#, &[])
        .unwrap();
    assert_eq!(value.to_string(), "hello rivet");
}

#[test]
fn test_unreachable_repository_reports_once_and_context_still_usable() {
    let project = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let listener = Arc::new(RecordingListener::default());
    let resolver = Arc::new(DependencyResolver::new(
        ArtifactCache::new(cache.path()),
        Arc::new(HttpFetcher::new().unwrap()),
    ));
    let project_dir = project.path().to_path_buf();
    let builder = ContextBuilder::new(
        Arc::new(move || Some(project_dir.clone())),
        strategy_for(ResolverKind::RepositoryList, resolver),
        listener.clone(),
    );
    let manifest = DependencyManifest::new(
        vec![RepositoryDescriptor::new("offline", "default", "http://127.0.0.1:1/")],
        vec![Coordinate::new("org.example", "stats", "1.0")],
    );

    let context = builder
        .rebuild(
            &LoadingScope::new(),
            &manifest,
            &HostBindings::new(),
            RebuildOptions {
                use_manifest_resolution: true,
                include_local_build_output: true,
            },
        )
        .unwrap();

    assert_eq!(listener.0.lock().len(), 1);
    assert!(listener.0.lock()[0].contains("org.example:stats:1.0"));
    assert_eq!(context.generation(), 1);
    assert!(context.loading_scope().is_empty());
}

#[test]
fn test_session_alerts_transcript_on_resolution_failure() {
    let project = TempDir::new().unwrap();
    let config = SessionConfig {
        use_manifest_resolution: true,
        resolver: ResolverKind::RepositoryList,
        dependencies: vec![Coordinate::new("org.example", "missing", "0.1")],
        ..SessionConfig::default()
    };
    let (session, transcript) = test_session(&project, config);

    session.rebuild_context_blocking().unwrap();
    let warnings = transcript.warnings();
    let failures: Vec<_> = warnings
        .iter()
        .filter(|w| w.starts_with("Failed to resolve dependency"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(session.evaluate("1 + 1", &[]).unwrap().as_int(), Ok(2));
}

#[test]
fn test_resolve_without_project_directory_is_premature() {
    let cache = TempDir::new().unwrap();
    let resolver = Arc::new(DependencyResolver::new(
        ArtifactCache::new(cache.path()),
        Arc::new(HttpFetcher::new().unwrap()),
    ));
    let builder = ContextBuilder::new(
        Arc::new(|| None),
        strategy_for(ResolverKind::ManifestFile, resolver),
        Arc::new(RecordingListener::default()),
    );
    assert!(matches!(
        builder.resolve(&DependencyManifest::default()),
        Err(SessionError::PrematureInit(_))
    ));
}
