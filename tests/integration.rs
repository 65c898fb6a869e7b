//! End-to-end tests driving the compiled `codeask` binary: ingest a small
//! corpus, search it, ask against it, and exercise the failure paths a user
//! hits from the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn codeask_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("codeask");
    path
}

/// Write a config using the offline providers so every test is hermetic.
fn write_config(dir: &Path, root: &Path, index: &Path) -> PathBuf {
    let config_path = dir.join("codeask.toml");
    let content = format!(
        r#"
[index]
path = "{index}"

[ingest]
root = "{root}"
extensions = ["txt", "md", "rs"]

[embedding]
provider = "hash"

[generation]
provider = "static"
static_reply = "canned answer"
"#,
        index = index.display(),
        root = root.display(),
    );
    fs::write(&config_path, content).unwrap();
    config_path
}

fn run(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(codeask_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run codeask")
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn setup_corpus() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.txt"), "hello world").unwrap();
    fs::write(root.join("b.txt"), "hello universe").unwrap();
    let config = write_config(tmp.path(), &root, &tmp.path().join("index.sqlite"));
    (tmp, config)
}

#[test]
fn ingest_reports_document_and_chunk_counts() {
    let (_tmp, config) = setup_corpus();

    let output = run(&config, &["ingest"]);
    assert!(output.status.success(), "{:?}", output);
    let out = stdout(&output);
    assert!(
        out.contains("Indexed 2 documents into 2 chunks."),
        "unexpected output: {}",
        out
    );
}

#[test]
fn search_ranks_shared_and_unique_terms() {
    let (_tmp, config) = setup_corpus();
    assert!(run(&config, &["ingest"]).status.success());

    // Both documents share "hello": both come back with positive scores
    let output = run(&config, &["search", "hello", "--limit", "2"]);
    assert!(output.status.success(), "{:?}", output);
    let out = stdout(&output);
    assert!(out.contains("a.txt#0"), "missing a.txt: {}", out);
    assert!(out.contains("b.txt#0"), "missing b.txt: {}", out);

    // "universe" appears only in b.txt, which must rank first
    let output = run(&config, &["search", "universe", "--limit", "1"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("b.txt#0"), "expected b.txt first: {}", out);
    assert!(!out.contains("a.txt#0"));
}

#[test]
fn search_is_deterministic_across_runs() {
    let (_tmp, config) = setup_corpus();
    assert!(run(&config, &["ingest"]).status.success());

    let first = stdout(&run(&config, &["search", "hello"]));
    let second = stdout(&run(&config, &["search", "hello"]));
    assert_eq!(first, second);
}

#[test]
fn search_before_ingest_fails_with_guidance() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.txt"), "hello").unwrap();
    let config = write_config(tmp.path(), &root, &tmp.path().join("index.sqlite"));

    let output = run(&config, &["search", "hello"]);
    assert!(!output.status.success());
    let err = String::from_utf8_lossy(&output.stderr).to_string();
    assert!(err.contains("run ingest first"), "unexpected stderr: {}", err);
}

#[test]
fn ask_answers_with_static_generator() {
    let (_tmp, config) = setup_corpus();
    assert!(run(&config, &["ingest"]).status.success());

    let output = run(&config, &["ask", "what greets the world?", "--role", "developer"]);
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("canned answer"));
}

#[test]
fn ask_debug_prints_sources_and_scores() {
    let (_tmp, config) = setup_corpus();
    assert!(run(&config, &["ingest"]).status.success());

    let output = run(&config, &["ask", "hello universe", "--debug"]);
    assert!(output.status.success(), "{:?}", output);
    let out = stdout(&output);
    assert!(out.contains("canned answer"));
    assert!(out.contains("retrieved context"));
    assert!(out.contains("b.txt"));
    assert!(out.contains("fused"));
}

#[test]
fn reingest_replaces_the_corpus() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.txt"), "hello world").unwrap();
    let config = write_config(tmp.path(), &root, &tmp.path().join("index.sqlite"));

    assert!(run(&config, &["ingest"]).status.success());

    fs::remove_file(root.join("a.txt")).unwrap();
    fs::write(root.join("b.txt"), "entirely new topic").unwrap();
    assert!(run(&config, &["ingest"]).status.success());

    let out = stdout(&run(&config, &["search", "hello"]));
    assert!(!out.contains("a.txt"), "old corpus leaked: {}", out);
}

#[test]
fn unknown_role_falls_back_to_default_persona() {
    let (_tmp, config) = setup_corpus();
    assert!(run(&config, &["ingest"]).status.success());

    let output = run(&config, &["ask", "hello?", "--role", "wizard"]);
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("canned answer"));
}

#[test]
fn element_flag_without_page_url_is_rejected() {
    let (_tmp, config) = setup_corpus();
    assert!(run(&config, &["ingest"]).status.success());

    let output = run(&config, &["ask", "hello?", "--element", "submit button"]);
    assert!(
        !output.status.success(),
        "--element without --page-url must be an error"
    );
    let err = String::from_utf8_lossy(&output.stderr).to_string();
    assert!(err.contains("--page-url"), "unexpected stderr: {}", err);
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    let config_path = tmp.path().join("codeask.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[index]
path = "{}"

[ingest]
root = "{}"

[chunking]
chunk_size = 100
overlap = 200
"#,
            tmp.path().join("index.sqlite").display(),
            root.display()
        ),
    )
    .unwrap();

    let output = run(&config_path, &["ingest"]);
    assert!(!output.status.success());
    let err = String::from_utf8_lossy(&output.stderr).to_string();
    assert!(err.contains("overlap"), "unexpected stderr: {}", err);
}
