use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XwgitError {
    #[error("no session found: run 'xwgit init --code <CODE>'")]
    NotInitialized,

    #[error("access code has expired")]
    CodeExpired,

    #[error("access code was already used")]
    CodeConsumed,

    #[error("unknown access code")]
    CodeNotFound,

    #[error("could not generate a unique access code: {0}")]
    CodeGeneration(String),

    #[error("invalid tool name '{0}': must be lowercase alphanumeric with hyphens or underscores")]
    InvalidToolName(String),

    #[error("invalid session transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("template target already exists: {0}")]
    TemplateConflict(PathBuf),

    #[error("generated artifact is missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("unresolved placeholder marker in {path}")]
    UnresolvedPlaceholder { path: PathBuf },

    #[error("credential-shaped string in {path} (matched rule '{rule}')")]
    CredentialLeak { path: PathBuf, rule: String },

    #[error("workspace error at {path}: {reason}")]
    Workspace { path: PathBuf, reason: String },

    #[error("git clone failed: {0}")]
    GitClone(String),

    #[error("git authentication failed: {0}")]
    GitAuth(String),

    #[error("git commit failed: {0}")]
    GitCommit(String),

    #[error("git push failed: {0}")]
    GitPush(String),

    #[error("pull request creation failed: {0}")]
    GitPr(String),

    #[error("git {verb} timed out after {secs}s")]
    GitTimeout { verb: String, secs: u64 },

    #[error("git is not available in this workspace")]
    GitUnavailable,

    #[error("context cache is corrupted: {0}")]
    CacheCorruption(String),

    #[error("context cache ceiling exceeded: {have} tokens, ceiling {ceiling}")]
    CacheCeiling { have: usize, ceiling: usize },

    #[error("context cache is mounted read-only")]
    CacheReadOnly,

    #[error("store is locked by another xwgit invocation: {0}")]
    StoreLocked(PathBuf),

    #[error("invalid ttl '{0}': use forms like '30m', '24h', or '90s'")]
    InvalidTtl(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, XwgitError>;
