//! Narrow-verb wrapper over the `git` binary.
//!
//! Each verb is retried exactly once with backoff before surfacing, runs
//! under a bounded timeout, and never swallows a non-zero exit. When git is
//! missing (or the workspace is not a repository) the adapter degrades to
//! "non-git mode": verbs report `GitUnavailable` and the session keeps
//! working on local files, with the degradation surfaced through `status`.

use crate::error::{Result, XwgitError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// ChangeSummary
// ---------------------------------------------------------------------------

/// Parsed `git status --porcelain` output for `status` reporting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ChangeSummary {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
}

impl ChangeSummary {
    pub fn is_clean(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.untracked.is_empty()
    }

    pub fn parse(porcelain: &str) -> Self {
        let mut summary = ChangeSummary::default();
        for line in porcelain.lines() {
            if line.len() < 4 {
                continue;
            }
            let status = &line[..2];
            let path = line[3..].to_string();
            match status {
                "??" => summary.untracked.push(path),
                s if s.contains('D') => summary.deleted.push(path),
                s if s.contains('A') => summary.added.push(path),
                _ => summary.modified.push(path),
            }
        }
        summary
    }

    pub fn all_paths(&self) -> Vec<&str> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .chain(&self.untracked)
            .map(|s| s.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CommitOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Created,
    /// The working tree was already clean; no duplicate commit is created.
    NothingToCommit,
}

// ---------------------------------------------------------------------------
// GitAdapter
// ---------------------------------------------------------------------------

pub struct GitAdapter {
    root: PathBuf,
    git_bin: Option<PathBuf>,
    timeout: Duration,
}

impl GitAdapter {
    pub fn new(root: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            root: root.into(),
            git_bin: which::which("git").ok(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// False means non-git mode: the binary is missing or the workspace is
    /// not a repository.
    pub fn available(&self) -> bool {
        self.git_bin.is_some() && self.root.join(".git").exists()
    }

    fn require_available(&self) -> Result<&Path> {
        if !self.root.join(".git").exists() {
            return Err(XwgitError::GitUnavailable);
        }
        self.git_bin.as_deref().ok_or(XwgitError::GitUnavailable)
    }

    // -----------------------------------------------------------------------
    // Verbs
    // -----------------------------------------------------------------------

    pub fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let git = self.git_bin.as_deref().ok_or(XwgitError::GitUnavailable)?;
        let dest_str = dest.to_string_lossy().into_owned();
        self.retrying("clone", || {
            let out = self.run_at(git, Path::new("."), &["clone", url, &dest_str])?;
            classify(out, |stderr| {
                if is_auth_failure(&stderr) {
                    XwgitError::GitAuth(stderr)
                } else {
                    XwgitError::GitClone(stderr)
                }
            })
        })
    }

    /// Set the session identity on the repository only — never `--global`.
    pub fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        let git = self.require_available()?;
        let out = self.run_at(git, &self.root, &["config", "--local", "user.name", name])?;
        classify(out, XwgitError::GitCommit)?;
        let out = self.run_at(git, &self.root, &["config", "--local", "user.email", email])?;
        classify(out, XwgitError::GitCommit)
    }

    pub fn current_branch(&self) -> Result<String> {
        let git = self.require_available()?;
        let out = self.run_at(git, &self.root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        let stdout = out.stdout.trim().to_string();
        classify(out, XwgitError::GitCommit)?;
        Ok(stdout)
    }

    /// Create `branch` (or switch to it if it already exists).
    pub fn create_branch(&self, branch: &str) -> Result<()> {
        let git = self.require_available()?;
        self.retrying("branch", || {
            let out = self.run_at(git, &self.root, &["checkout", "-b", branch])?;
            if out.success {
                return Ok(());
            }
            if out.stderr.contains("already exists") {
                let out = self.run_at(git, &self.root, &["checkout", branch])?;
                return classify(out, XwgitError::GitCommit);
            }
            Err(XwgitError::GitCommit(out.stderr))
        })
    }

    pub fn add_all(&self) -> Result<()> {
        let git = self.require_available()?;
        self.retrying("add", || {
            let out = self.run_at(git, &self.root, &["add", "--all"])?;
            classify(out, XwgitError::GitCommit)
        })
    }

    /// Commit staged changes. A clean tree is success, not failure.
    pub fn commit(&self, message: &str) -> Result<CommitOutcome> {
        let git = self.require_available()?;
        if self.status_porcelain()?.is_empty() {
            debug!("working tree clean, skipping commit");
            return Ok(CommitOutcome::NothingToCommit);
        }
        self.retrying("commit", || {
            let out = self.run_at(git, &self.root, &["commit", "-m", message])?;
            classify(out, XwgitError::GitCommit)
        })?;
        Ok(CommitOutcome::Created)
    }

    pub fn push(&self, branch: &str) -> Result<()> {
        let git = self.require_available()?;
        self.retrying("push", || {
            let out = self.run_at(git, &self.root, &["push", "-u", "origin", branch])?;
            classify(out, |stderr| {
                if is_auth_failure(&stderr) {
                    XwgitError::GitAuth(stderr)
                } else {
                    XwgitError::GitPush(stderr)
                }
            })
        })
    }

    pub fn status_porcelain(&self) -> Result<String> {
        let git = self.require_available()?;
        let out = self.run_at(git, &self.root, &["status", "--porcelain"])?;
        let stdout = out.stdout.clone();
        classify(out, XwgitError::GitCommit)?;
        Ok(stdout)
    }

    pub fn change_summary(&self) -> Result<ChangeSummary> {
        Ok(ChangeSummary::parse(&self.status_porcelain()?))
    }

    pub fn recent_commits(&self, count: usize) -> Result<Vec<String>> {
        let git = self.require_available()?;
        let max = format!("--max-count={count}");
        let out = self.run_at(git, &self.root, &["log", "--oneline", &max])?;
        if !out.success {
            // An unborn branch has no log; that is not an error worth surfacing.
            return Ok(Vec::new());
        }
        Ok(out.stdout.lines().map(|l| l.to_string()).collect())
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Run one verb, retrying exactly once with backoff before giving up.
    fn retrying<T>(&self, verb: &str, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
        match attempt() {
            Ok(v) => Ok(v),
            Err(first) => {
                warn!(verb, error = %first, "git verb failed, retrying once");
                std::thread::sleep(RETRY_BACKOFF);
                attempt()
            }
        }
    }

    fn run_at(&self, git: &Path, cwd: &Path, args: &[&str]) -> Result<VerbOutput> {
        debug!(args = ?args, "running git");
        let mut child = Command::new(git)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                child.kill()?;
                child.wait()?;
                return Err(XwgitError::GitTimeout {
                    verb: args.first().unwrap_or(&"git").to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        use std::io::Read as _;
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)?;
        }
        if let Some(mut err) = child.stderr.take() {
            err.read_to_string(&mut stderr)?;
        }

        Ok(VerbOutput {
            success: status.success(),
            stdout,
            stderr: stderr.trim().to_string(),
        })
    }
}

struct VerbOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

fn classify(out: VerbOutput, to_err: impl FnOnce(String) -> XwgitError) -> Result<()> {
    if out.success {
        Ok(())
    } else {
        let detail = if out.stderr.is_empty() {
            out.stdout.trim().to_string()
        } else {
            out.stderr
        };
        Err(to_err(detail))
    }
}

fn is_auth_failure(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("could not read username")
        || lower.contains("403")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
