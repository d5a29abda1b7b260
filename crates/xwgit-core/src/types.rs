use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Scaffolded,
    Finalized,
    Failed,
}

impl SessionState {
    pub fn all() -> &'static [SessionState] {
        &[
            SessionState::Uninitialized,
            SessionState::Initialized,
            SessionState::Scaffolded,
            SessionState::Finalized,
            SessionState::Failed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Scaffolded => "scaffolded",
            SessionState::Finalized => "finalized",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = crate::error::XwgitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uninitialized" => Ok(SessionState::Uninitialized),
            "initialized" => Ok(SessionState::Initialized),
            "scaffolded" => Ok(SessionState::Scaffolded),
            "finalized" => Ok(SessionState::Finalized),
            "failed" => Ok(SessionState::Failed),
            _ => Err(crate::error::XwgitError::InvalidState(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FinalizeStage
// ---------------------------------------------------------------------------

/// How far a partially-failed finalize got. Recorded in the session so
/// `status` can surface a recoverable sub-state and a re-run can resume
/// instead of repeating completed verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStage {
    Committed,
    Pushed,
}

impl FinalizeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalizeStage::Committed => "committed",
            FinalizeStage::Pushed => "pushed",
        }
    }
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ToolKind
// ---------------------------------------------------------------------------

/// Template category for a scaffolded tool. The set is extensible: unknown
/// kinds are carried as `Other` and the template engine decides the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Search,
    Api,
    Other(String),
}

impl ToolKind {
    /// Total parse: unrecognized kinds become `Other` for the template
    /// engine to resolve.
    pub fn parse(s: &str) -> Self {
        match s {
            "search" | "search-tool" => ToolKind::Search,
            "api" | "api-tool" => ToolKind::Api,
            other => ToolKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ToolKind::Search => "search-tool",
            ToolKind::Api => "api-tool",
            ToolKind::Other(s) => s.as_str(),
        }
    }

    /// Directory segment under `tools/` for generated files.
    pub fn dir_name(&self) -> &str {
        match self {
            ToolKind::Search => "search",
            ToolKind::Api => "api",
            ToolKind::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ToolKind::parse(s))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
