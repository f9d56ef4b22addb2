//! Artifact cache behaviour through the dependency resolver

use crate::integration::test_utils::{test_session_with, MemoryFetcher};
use rivet::config::SessionConfig;
use rivet::resolver::{
    ArtifactCache, Coordinate, DependencyResolver, PurgeOutcome, RepositoryDescriptor,
    ResolverKind, MANIFEST_FILENAME,
};
use std::sync::Arc;
use tempfile::TempDir;

fn repositories() -> Vec<RepositoryDescriptor> {
    vec![RepositoryDescriptor::new("memory", "default", "https://repo.example/")]
}

#[test]
fn test_cached_artifact_is_not_fetched_again() {
    let cache_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MemoryFetcher::default().with_artifact("org.example:stats:1.0", "fn mean(a, b) { (a + b) / 2 }"),
    );
    let resolver = DependencyResolver::new(ArtifactCache::new(cache_dir.path()), fetcher.clone());
    let coordinate = Coordinate::new("org.example", "stats", "1.0");

    let first = resolver.resolve_coordinate(&repositories(), &coordinate).unwrap();
    let second = resolver.resolve_coordinate(&repositories(), &coordinate).unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
    assert!(first.starts_with(cache_dir.path()));
    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        "fn mean(a, b) { (a + b) / 2 }"
    );
}

#[test]
fn test_purge_forces_refetch() {
    let cache_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(MemoryFetcher::default().with_artifact("org.example:stats:1.0", "42"));
    let resolver = DependencyResolver::new(ArtifactCache::new(cache_dir.path()), fetcher.clone());
    let coordinate = Coordinate::new("org.example", "stats", "1.0");

    resolver.resolve_coordinate(&repositories(), &coordinate).unwrap();
    assert_eq!(resolver.purge(&coordinate), PurgeOutcome::Removed);
    assert_eq!(resolver.purge(&coordinate), PurgeOutcome::NotCached);

    let path = resolver.resolve_coordinate(&repositories(), &coordinate).unwrap();
    assert!(path.is_file());
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn test_resolved_artifact_is_importable_by_name() {
    let project = TempDir::new().unwrap();
    std::fs::write(
        project.path().join(MANIFEST_FILENAME),
        r#"
dependencies = ["org.example:stats:1.0"]

[[repositories]]
id = "memory"
address = "https://repo.example/"
"#,
    )
    .unwrap();
    let fetcher = Arc::new(
        MemoryFetcher::default().with_artifact("org.example:stats:1.0", "fn mean(a, b) { (a + b) / 2 }"),
    );
    let config = SessionConfig {
        use_manifest_resolution: true,
        resolver: ResolverKind::ManifestFile,
        ..SessionConfig::default()
    };
    let (session, transcript) = test_session_with(&project, config, fetcher.clone());

    session.rebuild_context_blocking().unwrap();
    assert!(transcript.warnings().is_empty());
    let value = session
        .evaluate(r#"import "stats" as stats; stats::mean(4, 8)"#, &[])
        .unwrap();
    assert_eq!(value.as_int(), Ok(6));

    // A second rebuild is served from the cache.
    session.rebuild_context_blocking().unwrap();
    assert_eq!(fetcher.calls(), 1);
}
