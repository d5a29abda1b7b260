use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use std::process::Stdio;
use tempfile::TempDir;

/// Each scenario gets its own HOME so the operator files (config, codes,
/// credentials) never leak between tests or into the real user account.
fn xwgit(home: &TempDir, workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("xwgit").unwrap();
    cmd.current_dir(workspace)
        .env("HOME", home.path())
        .env("XWGIT_ROOT", workspace)
        .env_remove("GITHUB_API_KEY");
    cmd
}

fn git(workspace: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(workspace)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

fn git_stdout(workspace: &Path, args: &[&str]) -> String {
    let out = std::process::Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()
        .unwrap();
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn seed_repo(workspace: &Path) {
    git(workspace, &["init", "-b", "main"]);
    git(workspace, &["config", "--local", "user.name", "seed"]);
    git(
        workspace,
        &["config", "--local", "user.email", "seed@example.com"],
    );
    std::fs::write(workspace.join("README.md"), "# XwDevTools\n").unwrap();
    git(workspace, &["add", "--all"]);
    git(workspace, &["commit", "-m", "seed"]);
}

/// Adds a local bare repository as `origin` so pushes succeed offline.
fn add_bare_remote(workspace: &Path, remote_dir: &Path) {
    git(remote_dir, &["init", "--bare"]);
    git(
        workspace,
        &["remote", "add", "origin", remote_dir.to_str().unwrap()],
    );
}

fn commit_count(workspace: &Path) -> usize {
    let log = git_stdout(workspace, &["log", "--oneline"]);
    log.lines().count()
}

/// Issue a code via the CLI and parse it from the JSON output.
fn issue_code(home: &TempDir, workspace: &Path, subject: &str, ttl: Option<&str>) -> String {
    let mut cmd = xwgit(home, workspace);
    cmd.args(["generate-code", subject, "--json"]);
    if let Some(ttl) = ttl {
        cmd.args(["--ttl", ttl]);
    }
    let output = cmd.assert().success().get_output().stdout.clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    value["code"].as_str().unwrap().to_string()
}

fn init_session(home: &TempDir, workspace: &Path) {
    let code = issue_code(home, workspace, "claude", None);
    xwgit(home, workspace)
        .args(["init", "--code", &code])
        .assert()
        .success();
}

/// Rewrite scaffolded files so no placeholder marker remains.
fn resolve_markers(workspace: &Path, name: &str) {
    for rel in [
        format!("tools/search/{name}.py"),
        format!("tests/test_{name}.py"),
    ] {
        let path = workspace.join(rel);
        let resolved = std::fs::read_to_string(&path)
            .unwrap()
            .replace("XWGIT-TODO", "implemented");
        std::fs::write(&path, resolved).unwrap();
    }
}

// ---------------------------------------------------------------------------
// generate-code / init
// ---------------------------------------------------------------------------

#[test]
fn generate_code_prints_single_use_code() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();

    xwgit(&home, ws.path())
        .args(["generate-code", "claude"])
        .assert()
        .success()
        .stdout(predicate::str::contains("xwgit init --code"))
        .stdout(predicate::str::contains("single-use"));
}

#[test]
fn init_with_valid_code_creates_session() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());

    let code = issue_code(&home, ws.path(), "claude", None);
    xwgit(&home, ws.path())
        .args(["init", "--code", &code])
        .assert()
        .success()
        .stdout(predicate::str::contains("Session initialized for claude"));

    assert!(ws.path().join(".xwgit/session.yaml").exists());
    let gitignore = std::fs::read_to_string(ws.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == ".xwgit/"));
}

#[test]
fn init_with_unknown_code_exits_2() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());

    xwgit(&home, ws.path())
        .args(["init", "--code", "NOPE1234"])
        .assert()
        .code(2);
    assert!(!ws.path().join(".xwgit/session.yaml").exists());
}

#[test]
fn init_with_consumed_code_exits_2_without_state_change() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());

    let code = issue_code(&home, ws.path(), "claude", None);
    xwgit(&home, ws.path())
        .args(["init", "--code", &code])
        .assert()
        .success();

    let ws2 = TempDir::new().unwrap();
    seed_repo(ws2.path());
    xwgit(&home, ws2.path())
        .args(["init", "--code", &code])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already used"));
    assert!(!ws2.path().join(".xwgit/session.yaml").exists());
}

#[test]
fn init_with_zero_ttl_code_exits_2() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());

    let code = issue_code(&home, ws.path(), "claude", Some("0"));
    xwgit(&home, ws.path())
        .args(["init", "--code", &code])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("expired"));
}

// ---------------------------------------------------------------------------
// quickstart
// ---------------------------------------------------------------------------

#[test]
fn quickstart_creates_three_files_and_branch() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args([
            "quickstart",
            "x",
            "--description",
            "Example tool",
            "--type",
            "search-tool",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("tools/search/x.py"));

    assert!(ws.path().join("tools/search/x.py").exists());
    assert!(ws.path().join("docs/tools/x.md").exists());
    assert!(ws.path().join("tests/test_x.py").exists());
    assert_eq!(
        git_stdout(ws.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
        "feature/x"
    );
}

#[test]
fn quickstart_without_init_fails() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "x", "--description", "d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("init"));
}

#[test]
fn quickstart_conflict_exits_4() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "dup", "--description", "d"])
        .assert()
        .success();
    xwgit(&home, ws.path())
        .args(["quickstart", "dup", "--description", "d"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn quickstart_api_tool_wires_key_variable() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args([
            "quickstart",
            "weather",
            "--description",
            "Weather lookups",
            "--type",
            "api-tool",
            "--api",
            "openweather",
        ])
        .assert()
        .success();

    let content = std::fs::read_to_string(ws.path().join("tools/api/weather.py")).unwrap();
    assert!(content.contains("OPENWEATHER_API_KEY"));
    assert!(content.contains("os.environ.get"));
}

#[test]
fn quickstart_with_issue_derives_branch() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "tracker", "--description", "d", "--issue", "17"])
        .assert()
        .success();
    assert_eq!(
        git_stdout(ws.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
        "feature/issue-17-tracker"
    );
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[test]
fn status_is_read_only_and_exits_0_without_session() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();

    xwgit(&home, ws.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("uninitialized"));
    assert!(!ws.path().join(".xwgit").exists());
}

#[test]
fn status_reports_branch_and_changes() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());
    xwgit(&home, ws.path())
        .args(["quickstart", "x", "--description", "d"])
        .assert()
        .success();

    xwgit(&home, ws.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("scaffolded"))
        .stdout(predicate::str::contains("feature/x"))
        .stdout(predicate::str::contains("tools/search/x.py"));
}

#[test]
fn status_json_output() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());

    let output = xwgit(&home, ws.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["state"], "initialized");
    assert_eq!(value["agent"], "claude");
}

// ---------------------------------------------------------------------------
// finalize
// ---------------------------------------------------------------------------

#[test]
fn finalize_scenario_credential_block_then_success_then_idempotent() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    seed_repo(ws.path());
    add_bare_remote(ws.path(), remote.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "x", "--description", "Example tool"])
        .assert()
        .success();
    resolve_markers(ws.path(), "x");

    // Plant a fake bearer token in the generated implementation.
    let impl_path = ws.path().join("tools/search/x.py");
    let clean = std::fs::read_to_string(&impl_path).unwrap();
    std::fs::write(
        &impl_path,
        format!("{clean}\nTOKEN = 'Bearer abcdefghij0123456789XYZW'\n"),
    )
    .unwrap();

    let before = commit_count(ws.path());
    xwgit(&home, ws.path())
        .args(["finalize", "Add x tool"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("tools/search/x.py"))
        .stderr(predicate::str::contains("bearer-token"));
    // Hard stop before any commit.
    assert_eq!(commit_count(ws.path()), before);

    // Remove the leak and finalize for real.
    std::fs::write(&impl_path, clean).unwrap();
    xwgit(&home, ws.path())
        .args(["finalize", "Add x tool"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Changes committed"));
    assert_eq!(commit_count(ws.path()), before + 1);

    // Idempotent re-run: no duplicate commit.
    xwgit(&home, ws.path())
        .args(["finalize", "Add x tool"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no new commit"));
    assert_eq!(commit_count(ws.path()), before + 1);
}

#[test]
fn finalize_with_unresolved_marker_exits_5() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    seed_repo(ws.path());
    add_bare_remote(ws.path(), remote.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "x", "--description", "d"])
        .assert()
        .success();

    xwgit(&home, ws.path())
        .args(["finalize", "msg"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("unresolved"));
}

#[test]
fn finalize_without_remote_exits_6_and_is_recoverable() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "x", "--description", "d"])
        .assert()
        .success();
    resolve_markers(ws.path(), "x");

    // Commit lands, push fails: recoverable partial state, exit 6.
    xwgit(&home, ws.path())
        .args(["finalize", "Add x"])
        .assert()
        .code(6);

    xwgit(&home, ws.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pending finalize stage: committed"));

    // Attach a remote and resume: no second commit, push succeeds.
    let remote = TempDir::new().unwrap();
    add_bare_remote(ws.path(), remote.path());
    let before = commit_count(ws.path());
    xwgit(&home, ws.path())
        .args(["finalize", "Add x"])
        .assert()
        .success();
    assert_eq!(commit_count(ws.path()), before);

    xwgit(&home, ws.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("finalized"));
}

#[test]
fn finalize_with_issue_suffixes_message() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    seed_repo(ws.path());
    add_bare_remote(ws.path(), remote.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "x", "--description", "d", "--issue", "9"])
        .assert()
        .success();
    resolve_markers(ws.path(), "x");

    xwgit(&home, ws.path())
        .args(["finalize", "Add x", "--issue", "9"])
        .assert()
        .success();
    let log = git_stdout(ws.path(), &["log", "--oneline", "--max-count=1"]);
    assert!(log.contains("(#9)"), "log line: {log}");
}

// ---------------------------------------------------------------------------
// cag
// ---------------------------------------------------------------------------

#[test]
fn cag_note_then_show_roundtrip() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    seed_repo(ws.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["cag", "note", "tools live under tools/<kind>/", "--section", "Layout"])
        .assert()
        .success();

    xwgit(&home, ws.path())
        .args(["cag", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Layout"))
        .stdout(predicate::str::contains("tools live under"));

    xwgit(&home, ws.path())
        .args(["cag", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));

    // A backup exists for the mutation.
    let backups = ws.path().join(".xwgit/cag/backups");
    assert!(backups.exists());
    assert!(std::fs::read_dir(&backups).unwrap().next().is_some());
}

#[test]
fn finalize_records_session_in_cag() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    seed_repo(ws.path());
    add_bare_remote(ws.path(), remote.path());
    init_session(&home, ws.path());

    xwgit(&home, ws.path())
        .args(["quickstart", "x", "--description", "d"])
        .assert()
        .success();
    resolve_markers(ws.path(), "x");
    xwgit(&home, ws.path())
        .args(["finalize", "Add x"])
        .assert()
        .success();

    xwgit(&home, ws.path())
        .args(["cag", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Last Session"))
        .stdout(predicate::str::contains("claude"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_default_is_clean() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();

    xwgit(&home, ws.path())
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration ok"));
}

#[test]
fn config_validate_flags_zero_ttl() {
    let home = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    let config_dir = home.path().join(".xwgit");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.yaml"), "code_ttl_minutes: 0\n").unwrap();

    xwgit(&home, ws.path())
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("born expired"));
}
