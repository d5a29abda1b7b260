//! Session lifecycle and its on-disk record.
//!
//! One CLI invocation performs one step of the machine and exits; the
//! session file under `.xwgit/` is the only carrier of state between
//! invocations. `status` reads it without consulting the code store or
//! re-deriving everything from git.

use crate::config::IdentityConfig;
use crate::error::{Result, XwgitError};
use crate::paths;
use crate::types::{FinalizeStage, SessionState, ToolKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ScaffoldedTool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldedTool {
    pub name: String,
    pub kind: ToolKind,
    pub branch: String,
    /// Workspace-relative artifact paths, in render order.
    pub artifacts: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default = "default_version")]
    pub version: u32,
    pub agent: String,
    pub git_name: String,
    pub git_email: String,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_branch: Option<String>,
    #[serde(default)]
    pub tools: Vec<ScaffoldedTool>,
    /// Progress marker from a partially-failed finalize. `status` surfaces
    /// this distinctly from a total failure, and a re-run resumes from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<FinalizeStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Session {
    pub fn new(agent: impl Into<String>, identity: &IdentityConfig) -> Self {
        let agent = agent.into();
        let now = Utc::now();
        Self {
            version: 1,
            git_name: identity.git_name(&agent),
            git_email: identity.git_email(&agent),
            agent,
            state: SessionState::Initialized,
            active_branch: None,
            tools: Vec::new(),
            pending: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::session_path(root);
        if !path.exists() {
            return Err(XwgitError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::session_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn exists(root: &Path) -> bool {
        paths::session_path(root).exists()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Scaffolding is allowed from `initialized` and again from `scaffolded`
    /// (additional tools in the same session).
    pub fn ensure_can_quickstart(&self) -> Result<()> {
        match self.state {
            SessionState::Initialized | SessionState::Scaffolded => Ok(()),
            other => Err(XwgitError::InvalidTransition {
                from: other.to_string(),
                to: SessionState::Scaffolded.to_string(),
                reason: "run 'xwgit init --code <CODE>' first".to_string(),
            }),
        }
    }

    /// Finalize runs from `scaffolded`; it is also callable again in
    /// `finalized` (idempotent re-run) and after a partial failure.
    pub fn ensure_can_finalize(&self) -> Result<()> {
        match self.state {
            SessionState::Scaffolded | SessionState::Finalized => Ok(()),
            other => Err(XwgitError::InvalidTransition {
                from: other.to_string(),
                to: SessionState::Finalized.to_string(),
                reason: "nothing scaffolded in this session".to_string(),
            }),
        }
    }

    pub fn record_scaffold(&mut self, tool: ScaffoldedTool) {
        self.active_branch = Some(tool.branch.clone());
        self.tools.retain(|t| t.name != tool.name);
        self.tools.push(tool);
        self.state = SessionState::Scaffolded;
        self.last_error = None;
        self.touch();
    }

    pub fn record_finalized(&mut self) {
        self.state = SessionState::Finalized;
        self.pending = None;
        self.last_error = None;
        self.touch();
    }

    /// A finalize that got through some verbs and then failed. The session
    /// stays recoverable: state remains `scaffolded` with the reached stage
    /// recorded.
    pub fn record_partial(&mut self, stage: FinalizeStage, error: &str) {
        self.state = SessionState::Scaffolded;
        self.pending = Some(stage);
        self.last_error = Some(error.to_string());
        self.touch();
    }

    pub fn record_failure(&mut self, error: &str) {
        self.state = SessionState::Failed;
        self.last_error = Some(error.to_string());
        self.touch();
    }

    /// Explicit reset out of the terminal `failed` state.
    pub fn reset_failure(&mut self) {
        if self.state == SessionState::Failed {
            self.state = if self.tools.is_empty() {
                SessionState::Initialized
            } else {
                SessionState::Scaffolded
            };
            self.last_error = None;
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Workspace-relative artifact paths across all scaffolded tools.
    pub fn artifact_paths(&self) -> Vec<&Path> {
        self.tools
            .iter()
            .flat_map(|t| t.artifacts.iter().map(|p| p.as_path()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
