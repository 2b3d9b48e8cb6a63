use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use autopilot::errors::AgentError;
use autopilot::models::tool::ToolCall;
use autopilot::systems::ToolCatalog;
use autopilot::workspace::{CommandRunner, FileSystem, LocalFileSystem, ShellRunner};

fn developer_catalog() -> (TempDir, ToolCatalog) {
    let dir = tempfile::tempdir().unwrap();
    let local = LocalFileSystem::new(dir.path()).unwrap();
    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(local.root()));
    let fs: Arc<dyn FileSystem> = Arc::new(local);
    let catalog = ToolCatalog::developer(fs, runner).unwrap();
    (dir, catalog)
}

fn call(name: &str, parameters: serde_json::Value) -> ToolCall {
    ToolCall::new(format!("{}_1", name), name, parameters)
}

#[test]
fn test_developer_catalog_tools() {
    let (_dir, catalog) = developer_catalog();
    for name in [
        "read_file",
        "write_file",
        "list_files",
        "search_files",
        "delete_file",
        "get_working_directory",
        "analyze_project",
        "analyze_code",
        "find_dependencies",
        "git_status",
        "git_commit",
        "git_diff",
        "run_tests",
        "generate_tests",
        "build_project",
        "install_package",
        "check_outdated",
        "run_command",
    ] {
        assert!(catalog.get(name).is_some(), "{} is not registered", name);
    }
}

#[tokio::test]
async fn test_file_round_trip_through_the_catalog() {
    let (dir, catalog) = developer_catalog();

    let written = catalog
        .invoke(&call(
            "write_file",
            json!({"path": "src/lib/greet.js", "content": "export const greet = () => 'Hello';\n"}),
        ))
        .await;
    assert!(written.is_success(), "{:?}", written.result);
    assert!(dir.path().join("src/lib/greet.js").exists());

    let listed = catalog
        .invoke(&call("list_files", json!({"pattern": "src/**/*.js"})))
        .await
        .result
        .unwrap();
    assert_eq!(listed["files"], json!(["src/lib/greet.js"]));
    assert_eq!(listed["truncated"], false);

    let found = catalog
        .invoke(&call("search_files", json!({"query": "HELLO"})))
        .await
        .result
        .unwrap();
    assert_eq!(found["matches"][0]["file"], "src/lib/greet.js");
    assert_eq!(found["matches"][0]["line"], 1);

    let deleted = catalog
        .invoke(&call("delete_file", json!({"path": "src/lib/greet.js"})))
        .await;
    assert!(deleted.is_success());
    assert!(!dir.path().join("src/lib/greet.js").exists());
}

#[tokio::test]
async fn test_paths_outside_the_root_fail() {
    let (_dir, catalog) = developer_catalog();
    let result = catalog
        .invoke(&call("read_file", json!({"path": "../../etc/passwd"})))
        .await;
    assert!(matches!(result.result, Err(AgentError::ExecutionError(_))));

    let refused = catalog.invoke(&call("delete_file", json!({"path": "."}))).await;
    assert!(matches!(refused.result, Err(AgentError::InvalidParameters(_))));
}

#[tokio::test]
async fn test_analyze_code_on_empty_file() {
    let (dir, catalog) = developer_catalog();
    fs::write(dir.path().join("empty.ts"), "").unwrap();

    let metrics = catalog
        .invoke(&call("analyze_code", json!({"path": "empty.ts"})))
        .await
        .result
        .unwrap();
    assert_eq!(metrics["complexity"], 1);
    assert_eq!(metrics["issues"], json!([]));
}

#[tokio::test]
async fn test_analyze_project_without_manifest() {
    let (dir, catalog) = developer_catalog();
    fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();

    let project = catalog
        .invoke(&call("analyze_project", json!({})))
        .await
        .result
        .unwrap();
    assert_eq!(project["project_type"], "unknown");
    assert_eq!(project["total_files"], 1);
    assert_eq!(project["files_by_language"]["Python"], 1);
}

#[tokio::test]
async fn test_run_command_uses_the_shell() {
    let (dir, catalog) = developer_catalog();
    fs::write(dir.path().join("notes.txt"), "one\ntwo\n").unwrap();

    let output = catalog
        .invoke(&call("run_command", json!({"command": "wc -l < notes.txt"})))
        .await
        .result
        .unwrap();
    assert_eq!(output["success"], true);
    assert_eq!(output["stdout"].as_str().unwrap().trim(), "2");

    let rejected = catalog
        .invoke(&call("run_command", json!({"command": "rm -rf notes.txt"})))
        .await;
    assert!(matches!(rejected.result, Err(AgentError::CommandRejected(_))));
    assert!(dir.path().join("notes.txt").exists());
}

#[tokio::test]
async fn test_batch_settles_with_one_result_per_call() {
    let (dir, catalog) = developer_catalog();
    fs::write(dir.path().join("a.txt"), "a").unwrap();

    let calls = vec![
        ToolCall::new("1", "read_file", json!({"path": "a.txt"})),
        ToolCall::new("2", "read_file", json!({"path": "missing.txt"})),
        ToolCall::new("3", "no_such_tool", json!({})),
        ToolCall::new("4", "run_command", json!({"command": "exit 3"})),
    ];
    let results = catalog.invoke_all(&calls, &CancellationToken::new()).await;

    let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert!(results[0].is_success());
    assert!(results[1].result.is_err());
    assert_eq!(
        results[2].result,
        Err(AgentError::ToolNotFound("no_such_tool".to_string()))
    );
    // A failing command is still a returned result
    assert_eq!(results[3].result.as_ref().unwrap()["exit_code"], 3);
}
