//! Integration tests for the rag-chat binary. Uses assert_cmd to run the
//! binary, a real temp config, and an in-process HTTP server. No mocks.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;
use std::net::TcpListener as StdTcpListener;

/// Pick a free port by binding to :0 and extracting the assigned port.
fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write a YAML config pointing at `port`, with conversations kept in the
/// temp dir so the test never touches the real home directory.
fn write_config(dir: &tempfile::TempDir, port: u16) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "api:\n  base_url: http://127.0.0.1:{}\nstorage:\n  conversations_path: {}",
        port,
        dir.path().join("conversations.json").display()
    )
    .unwrap();
    path
}

/// Spawn a minimal HTTP server that answers each `/query/stream` request with
/// a fixed line-oriented stream: tokens, two citations, and a timing record.
fn spawn_test_server(port: u16) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let body = concat!(
                "event: answer\n",
                "data: {\"content\":\"Test \"}\n",
                "data: {\"content\":\"answer.\"}\n",
                "data: {\"source\":\"/docs/a.md\",\"content\":\"passage a\"}\n",
                "data: {\"source\":\"/docs/b.md\",\"content\":\"passage b\"}\n",
                "data: {\"breakdown\":{\"retrieve\":10,\"generate\":25.5}}\n",
            );
            let app = axum::Router::new().route(
                "/query/stream",
                axum::routing::post(move || async move { body }),
            );
            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
                .await
                .unwrap();
            // Serve until the test process exits.
            axum::serve(listener, app).await.unwrap();
        });
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn cli_prints_streamed_answer_sources_and_latency() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = spawn_test_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    // Run the binary, passing the config path and a question on stdin.
    let mut cmd = Command::cargo_bin("rag-chat").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."))
        .stdout(predicate::str::contains("/docs/a.md"))
        .stdout(predicate::str::contains("/docs/b.md"))
        .stdout(predicate::str::contains("35.5"));
}

#[test]
fn cli_with_config_env_var() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = spawn_test_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    // Use RAG_CHAT_CONFIG env var instead of --config flag.
    let mut cmd = Command::cargo_bin("rag-chat").unwrap();
    cmd.env("RAG_CHAT_CONFIG", &config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn cli_with_positional_question_argument() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = spawn_test_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    // Provide question as a positional argument (no stdin piping).
    let mut cmd = Command::cargo_bin("rag-chat").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("What is the answer?");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn cli_persists_the_exchange_between_runs() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = spawn_test_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut cmd = Command::cargo_bin("rag-chat").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("Remember me?\n");
    cmd.assert().success();

    let saved = std::fs::read_to_string(dir.path().join("conversations.json")).unwrap();
    assert!(saved.contains("Remember me?"));
    assert!(saved.contains("Test answer."));
}

#[test]
fn cli_server_down_shows_error() {
    // Point the config at a port where nothing is listening.
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::cargo_bin("rag-chat").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("hello\n");

    // The binary should exit with a non-zero code and print an error.
    cmd.assert()
        .failure()
        .stderr(predicate::str::is_match("(?i)(connect|error|refused|failed)").unwrap());
}

#[test]
fn cli_without_a_question_shows_error() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::cargo_bin("rag-chat").unwrap();
    cmd.arg("--config").arg(&config_path).write_stdin("");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no question provided"));
}
