//! CLI route table against a scratch workspace

use crate::integration::test_utils::with_xdg_env;
use clap::Parser;
use rivet::cli::{logging_config, CacheCommands, Cli, Commands, RepoCommands, RunContext};
use rivet::config::RivetConfig;
use rivet::error::SessionError;
use std::path::Path;
use tempfile::TempDir;

fn write_workspace_config(workspace: &Path) {
    std::fs::create_dir_all(workspace.join("config")).unwrap();
    std::fs::write(
        workspace.join("config/config.toml"),
        format!(
            "[session]\nautorun_global = false\ncache_dir = {:?}\n",
            workspace.join(".cache").display().to_string()
        ),
    )
    .unwrap();
}

#[test]
fn test_run_prints_script_value() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_workspace_config(workspace.path());
    let script = workspace.path().join("answer.rhai");
    std::fs::write(&script, "let x = 40; x + 2").unwrap();

    with_xdg_env(&test_dir, || {
        let context = RunContext::new(workspace.path().to_path_buf(), None).unwrap();
        let output = context.execute(&Commands::Run { file: script.clone() }).unwrap();
        assert_eq!(output, "42");
    });
}

#[test]
fn test_run_reports_script_fault() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_workspace_config(workspace.path());
    let script = workspace.path().join("broken.rhai");
    std::fs::write(&script, "missing_fn()").unwrap();

    with_xdg_env(&test_dir, || {
        let context = RunContext::new(workspace.path().to_path_buf(), None).unwrap();
        let err = context.execute(&Commands::Run { file: script.clone() }).unwrap_err();
        assert!(err.as_fault().is_some());
    });
}

#[test]
fn test_test_command_fails_when_any_test_fails() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_workspace_config(workspace.path());
    let passing = workspace.path().join("passing.rhai");
    let failing = workspace.path().join("failing.rhai");
    std::fs::write(&passing, "1").unwrap();
    std::fs::write(&failing, "throw \"nope\"").unwrap();

    with_xdg_env(&test_dir, || {
        let context = RunContext::new(workspace.path().to_path_buf(), None).unwrap();
        let err = context
            .execute(&Commands::Test {
                files: vec![passing.clone(), failing.clone()],
            })
            .unwrap_err();
        match err {
            SessionError::TaskFailed(summary) => {
                assert_eq!(summary, "Tests run: 2, Successes: 1, Failures: 1, Errors: 0")
            }
            other => panic!("unexpected error: {}", other),
        }

        let ok = context
            .execute(&Commands::Test {
                files: vec![passing.clone()],
            })
            .unwrap();
        assert!(ok.is_empty());
    });
}

#[test]
fn test_repos_commands_persist() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    with_xdg_env(&test_dir, || {
        let context = RunContext::new(workspace.path().to_path_buf(), None).unwrap();
        context
            .execute(&Commands::Repos {
                command: RepoCommands::Add {
                    id: "team".to_string(),
                    address: "https://repo.team.example/".to_string(),
                    kind: "default".to_string(),
                },
            })
            .unwrap();

        let json = context
            .execute(&Commands::Repos {
                command: RepoCommands::List {
                    format: "json".to_string(),
                },
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let ids: Vec<&str> = value["repositories"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["local", "central", "team"]);

        let duplicate = context.execute(&Commands::Repos {
            command: RepoCommands::Add {
                id: "team".to_string(),
                address: "https://other.example/".to_string(),
                kind: "default".to_string(),
            },
        });
        assert!(duplicate.is_err());
    });
}

#[test]
fn test_cache_purge_of_uncached_coordinate() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_workspace_config(workspace.path());

    with_xdg_env(&test_dir, || {
        let context = RunContext::new(workspace.path().to_path_buf(), None).unwrap();
        let output = context
            .execute(&Commands::Cache {
                command: CacheCommands::Purge {
                    coordinate: "org.example:stats:1.0".to_string(),
                },
            })
            .unwrap();
        assert_eq!(output, "org.example:stats:1.0 is not cached");

        let bad = context.execute(&Commands::Cache {
            command: CacheCommands::Purge {
                coordinate: "not-a-coordinate".to_string(),
            },
        });
        assert!(matches!(bad, Err(SessionError::Resolution(_))));
    });
}

#[test]
fn test_invalid_config_is_rejected() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let config_file = workspace.path().join("bad.toml");
    std::fs::write(&config_file, "[logging]\nformat = \"xml\"\n").unwrap();

    with_xdg_env(&test_dir, || {
        let result = RunContext::new(workspace.path().to_path_buf(), Some(config_file.clone()));
        assert!(matches!(result, Err(SessionError::ConfigError(_))));
    });
}

#[test]
fn test_logging_is_off_without_verbose() {
    let cli = Cli::parse_from(["rivet", "--log-level", "debug", "repl"]);
    assert_eq!(logging_config(&cli, None).level, "off");
}

#[test]
fn test_repl_logs_to_file_unless_output_given() {
    let mut config = RivetConfig::default();
    config.logging.output = "stderr".to_string();

    let repl = Cli::parse_from(["rivet", "--verbose", "repl"]);
    let logging = logging_config(&repl, Some(&config));
    assert_eq!(logging.output, "file");
    assert!(logging.file.ends_with("rivet.log"));

    let explicit = Cli::parse_from(["rivet", "--verbose", "--log-output", "stdout", "repl"]);
    assert_eq!(logging_config(&explicit, Some(&config)).output, "stdout");

    let run = Cli::parse_from(["rivet", "--verbose", "--log-level", "trace", "run", "x.rhai"]);
    let logging = logging_config(&run, Some(&config));
    assert_eq!(logging.output, "stderr");
    assert_eq!(logging.level, "trace");
}
