//! Integration tests for Configuration System

use crate::integration::test_utils::with_xdg_env;
use rivet::config::{ConfigLoader, ValidationError};
use rivet::resolver::ResolverKind;
use tempfile::TempDir;

#[test]
fn test_config_file_sets_session_flags() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("rivet_config.toml");

    std::fs::write(
        &config_file,
        r#"
[session]
use_manifest_resolution = true
resolver = "repository_list"
autorun_global = false
build_output_dirs = ["out/scripts"]
dependencies = ["org.example:stats:1.0"]

[[session.repositories]]
id = "team"
address = "https://repo.team.example/"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    assert!(config.session.use_manifest_resolution);
    assert_eq!(config.session.resolver, ResolverKind::RepositoryList);
    assert!(!config.session.autorun_global);
    assert!(config.session.autorun_project);
    assert_eq!(config.session.build_output_dirs, vec!["out/scripts".to_string()]);
    assert_eq!(config.session.dependencies[0].to_string(), "org.example:stats:1.0");
    assert_eq!(config.session.repositories[0].kind, "default");
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_workspace_config_and_env_override() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config/config.toml"),
        "[session]\nautorun_project = false\nwatch_manifest = false\n",
    )
    .unwrap();

    with_xdg_env(&test_dir, || {
        let config = ConfigLoader::load(workspace.path()).unwrap();
        assert!(!config.session.autorun_project);
        assert!(!config.session.watch_manifest);

        std::env::set_var("RIVET_SESSION__WATCH_MANIFEST", "true");
        let config = ConfigLoader::load(workspace.path());
        std::env::remove_var("RIVET_SESSION__WATCH_MANIFEST");
        assert!(config.unwrap().session.watch_manifest);
    });
}

#[test]
fn test_global_config_is_layered_under_workspace() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    with_xdg_env(&test_dir, || {
        let global = ConfigLoader::global_config_path().unwrap();
        std::fs::create_dir_all(global.parent().unwrap()).unwrap();
        std::fs::write(&global, "[session]\nautorun_global = false\nautorun_project = false\n")
            .unwrap();
        std::fs::create_dir_all(workspace.path().join("config")).unwrap();
        std::fs::write(
            workspace.path().join("config/config.toml"),
            "[session]\nautorun_project = true\n",
        )
        .unwrap();

        let config = ConfigLoader::load(workspace.path()).unwrap();
        assert!(!config.session.autorun_global);
        assert!(config.session.autorun_project);
    });
}

#[test]
fn test_invalid_repositories_fail_validation() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("bad.toml");
    std::fs::write(
        &config_file,
        r#"
[[session.repositories]]
id = "dup"
address = "https://a.example/"

[[session.repositories]]
id = "dup"
address = ""
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Repository(id, _) if id == "dup")));
}
