//! Orchestration of the session lifecycle: each function here is one step
//! of the state machine, composing the code store, template engine, git
//! adapter, and context cache. The CLI layer stays a thin shell over these.

use crate::access_code::CodeStore;
use crate::cag::{CagStore, SectionPatch};
use crate::config::Config;
use crate::creds::Resolver;
use crate::error::{Result, XwgitError};
use crate::git::{CommitOutcome, GitAdapter};
use crate::github::{GithubClient, PrCreated};
use crate::paths;
use crate::session::{ScaffoldedTool, Session};
use crate::template::{self, ConflictPolicy, ToolSpec};
use crate::types::{FinalizeStage, SessionState};
use crate::validate::{Finding, ValidationReport};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::warn;

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct InitOutcome {
    pub agent: String,
    pub git_name: String,
    pub degraded_git: bool,
    pub cag_sections: usize,
}

/// Consume an access code and set up the workspace session.
///
/// Fails closed on the workspace: a missing or unwritable directory is
/// created in non-strict mode and refused with `WorkspaceError` in strict
/// mode. Validation of the code is the only path into `initialized`.
pub fn init(root: &Path, config: &Config, store: &CodeStore, code: &str) -> Result<InitOutcome> {
    let agent = store.validate(code)?;

    if !root.exists() {
        if config.strict_workspace {
            return Err(XwgitError::Workspace {
                path: root.to_path_buf(),
                reason: "workspace directory does not exist (strict mode)".to_string(),
            });
        }
        std::fs::create_dir_all(root).map_err(|e| XwgitError::Workspace {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    // Probe writability early; a read-only workspace is unrecoverable here.
    crate::io::ensure_dir(&paths::xwgit_dir(root)).map_err(|e| XwgitError::Workspace {
        path: root.to_path_buf(),
        reason: format!("cannot write session state: {e}"),
    })?;

    let git = GitAdapter::new(root, config.git_timeout_secs);
    let mut degraded = !git.available();
    if degraded && config.clone_missing && !root.join(".git").exists() && is_empty_dir(root)? {
        // Fresh workspace: bring the configured repository in.
        let url = format!(
            "https://github.com/{}/{}.git",
            config.remote.organization, config.remote.repository
        );
        match git.clone_repo(&url, root) {
            Ok(()) => degraded = !GitAdapter::new(root, config.git_timeout_secs).available(),
            Err(e) => warn!(error = %e, "clone failed, continuing without git"),
        }
    }

    let session = Session::new(agent, &config.identity);
    if !degraded {
        if let Err(e) = git.configure_identity(&session.git_name, &session.git_email) {
            warn!(error = %e, "could not set git identity");
        }
    }

    let cag = CagStore::open(paths::cag_dir(root), config.cag.ceiling_tokens);
    let doc = cag.load()?;

    crate::io::ensure_gitignore_entry(root, ".xwgit/")?;
    session.save(root)?;

    Ok(InitOutcome {
        agent: session.agent,
        git_name: session.git_name,
        degraded_git: degraded,
        cag_sections: doc.manifest.sections.len(),
    })
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}

// ---------------------------------------------------------------------------
// quickstart
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct QuickstartOutcome {
    pub branch: String,
    pub written: Vec<PathBuf>,
    pub degraded_git: bool,
}

pub fn quickstart(
    root: &Path,
    config: &Config,
    spec: &ToolSpec,
    issue: Option<u64>,
) -> Result<QuickstartOutcome> {
    let mut session = Session::load(root)?;
    session.ensure_can_quickstart()?;

    let set = template::render(spec)?;
    let written = set.write(root, ConflictPolicy::Abort)?;

    let branch = paths::branch_for(&spec.name, issue);
    let git = GitAdapter::new(root, config.git_timeout_secs);
    let degraded = !git.available();
    if degraded {
        warn!("git unavailable, scaffolding on local files only");
    } else {
        git.create_branch(&branch)?;
    }

    session.record_scaffold(ScaffoldedTool {
        name: spec.name.clone(),
        kind: spec.kind.clone(),
        branch: branch.clone(),
        artifacts: set.files.iter().map(|f| f.path.clone()).collect(),
        created_at: Utc::now(),
    });
    session.save(root)?;

    Ok(QuickstartOutcome {
        branch,
        written,
        degraded_git: degraded,
    })
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

/// Pre-finalize validation over the scaffolded artifacts plus everything
/// git reports as changed. Pure read.
pub fn validate(root: &Path, config: &Config) -> Result<ValidationReport> {
    let session = Session::load(root)?;
    let artifacts = session.artifact_paths();

    let git = GitAdapter::new(root, config.git_timeout_secs);
    let mut candidates: Vec<PathBuf> = artifacts.iter().map(|p| p.to_path_buf()).collect();
    if git.available() {
        for path in git.change_summary()?.all_paths() {
            let p = PathBuf::from(path);
            if !candidates.contains(&p) {
                candidates.push(p);
            }
        }
    }
    let candidate_refs: Vec<&Path> = candidates.iter().map(|p| p.as_path()).collect();
    crate::validate::check(root, &artifacts, &candidate_refs)
}

fn finding_to_error(finding: &Finding) -> XwgitError {
    match finding {
        Finding::MissingArtifact { path } => XwgitError::MissingArtifact(path.clone()),
        Finding::UnresolvedPlaceholder { path } => {
            XwgitError::UnresolvedPlaceholder { path: path.clone() }
        }
        Finding::CredentialLeak { path, rule } => XwgitError::CredentialLeak {
            path: path.clone(),
            rule: rule.clone(),
        },
    }
}

// ---------------------------------------------------------------------------
// finalize
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FinalizeOutcome {
    pub commit: CommitOutcome,
    pub pushed: bool,
    pub pr: Option<PrCreated>,
    pub degraded_git: bool,
}

/// Stage, commit, push and open a PR for the session's branch.
///
/// Validation runs first and is a hard stop. The commit is idempotent (a
/// clean tree creates nothing). Partial failure records how far the run
/// got so `status` can surface it and a re-run resumes.
pub fn finalize(
    root: &Path,
    config: &Config,
    message: &str,
    issue: Option<u64>,
) -> Result<FinalizeOutcome> {
    let mut session = Session::load(root)?;
    session.ensure_can_finalize()?;

    let report = validate(root, config)?;
    if let Some(finding) = report.findings.first() {
        return Err(finding_to_error(finding));
    }

    let git = GitAdapter::new(root, config.git_timeout_secs);
    if !git.available() {
        warn!("git unavailable, cannot finalize; local files are untouched");
        return Err(XwgitError::GitUnavailable);
    }

    let message = match issue {
        Some(n) => format!("{message} (#{n})"),
        None => message.to_string(),
    };

    git.add_all()?;
    let commit = match git.commit(&message) {
        Ok(outcome) => outcome,
        Err(e) => {
            session.record_failure(&e.to_string());
            session.save(root)?;
            return Err(e);
        }
    };

    let branch = match session.active_branch.clone() {
        Some(b) => b,
        None => git.current_branch()?,
    };

    if let Err(e) = git.push(&branch) {
        session.record_partial(FinalizeStage::Committed, &e.to_string());
        session.save(root)?;
        return Err(e);
    }

    let pr = match pr_client(root, config)? {
        Some(client) => {
            match client.create_pr(
                &config.remote.organization,
                &config.remote.repository,
                &message,
                &branch,
                &config.remote.default_branch,
                issue,
            ) {
                Ok(pr) => Some(pr),
                Err(e) => {
                    session.record_partial(FinalizeStage::Pushed, &e.to_string());
                    session.save(root)?;
                    return Err(e);
                }
            }
        }
        None => {
            warn!("no GITHUB_API_KEY resolved, skipping pull request creation");
            None
        }
    };

    session.record_finalized();
    session.save(root)?;

    record_session_in_cag(root, config, &session, &message);

    Ok(FinalizeOutcome {
        commit,
        pushed: true,
        pr,
        degraded_git: false,
    })
}

fn pr_client(root: &Path, config: &Config) -> Result<Option<GithubClient>> {
    let resolver = Resolver::standard(root)?;
    match resolver.resolve("github") {
        Some(found) => Ok(Some(GithubClient::new(
            config.remote.api_base.clone(),
            found.value,
        )?)),
        None => Ok(None),
    }
}

/// Best-effort end-of-session knowledge update. A cache failure never
/// undoes a finalize that already succeeded.
fn record_session_in_cag(root: &Path, config: &Config, session: &Session, message: &str) {
    let cag = CagStore::open(paths::cag_dir(root), config.cag.ceiling_tokens);
    let tools: Vec<&str> = session.tools.iter().map(|t| t.name.as_str()).collect();
    let patch = SectionPatch {
        section: "Last Session".to_string(),
        content: format!(
            "- agent: {}\n- finalized: {}\n- tools: {}\n- message: {}",
            session.agent,
            Utc::now().to_rfc3339(),
            tools.join(", "),
            message,
        ),
    };
    if let Err(e) = cag.mutate(&patch) {
        warn!(error = %e, "could not record session in context cache");
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
pub struct StatusReport {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub degraded_git: bool,
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<crate::git::ChangeSummary>,
    pub recent_commits: Vec<String>,
    pub cag_sections: Vec<String>,
    pub cag_tokens: usize,
    pub cag_saturation_warning: bool,
    pub workspace: PathBuf,
}

/// Pure read over the session file, git, and the cache. Never mutates; a
/// missing session reports `uninitialized` instead of failing.
pub fn status(root: &Path, config: &Config) -> Result<StatusReport> {
    let git = GitAdapter::new(root, config.git_timeout_secs);
    let degraded = !git.available();

    let (changes, recent) = if degraded {
        (None, Vec::new())
    } else {
        (
            Some(git.change_summary()?),
            git.recent_commits(3).unwrap_or_default(),
        )
    };

    let cag = CagStore::open(paths::cag_dir(root), config.cag.ceiling_tokens);
    let (sections, tokens, saturated) = match cag.load() {
        Ok(doc) => (
            doc.manifest.sections.clone(),
            doc.token_estimate(),
            doc.manifest.saturation_warning,
        ),
        Err(e) => {
            warn!(error = %e, "context cache unreadable");
            (Vec::new(), 0, false)
        }
    };

    let report = match Session::load(root) {
        Ok(session) => StatusReport {
            state: session.state,
            agent: Some(session.agent.clone()),
            branch: session.active_branch.clone(),
            pending: session.pending.map(|p| p.to_string()),
            last_error: session.last_error.clone(),
            degraded_git: degraded,
            tools: session.tools.iter().map(|t| t.name.clone()).collect(),
            changes,
            recent_commits: recent,
            cag_sections: sections,
            cag_tokens: tokens,
            cag_saturation_warning: saturated,
            workspace: root.to_path_buf(),
        },
        Err(XwgitError::NotInitialized) => StatusReport {
            state: SessionState::Uninitialized,
            agent: None,
            branch: None,
            pending: None,
            last_error: None,
            degraded_git: degraded,
            tools: Vec::new(),
            changes,
            recent_commits: recent,
            cag_sections: sections,
            cag_tokens: tokens,
            cag_saturation_warning: saturated,
            workspace: root.to_path_buf(),
        },
        Err(e) => return Err(e),
    };

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
