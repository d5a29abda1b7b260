use crate::error::{Result, XwgitError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Workspace-relative constants
// ---------------------------------------------------------------------------

pub const XWGIT_DIR: &str = ".xwgit";
pub const SESSION_FILE: &str = ".xwgit/session.yaml";
pub const CAG_DIR: &str = ".xwgit/cag";

pub const TOOLS_DIR: &str = "tools";
pub const DOCS_DIR: &str = "docs/tools";
pub const TESTS_DIR: &str = "tests";

// Operator-home file names (under ~/.xwgit)
pub const HOME_DIR_NAME: &str = ".xwgit";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const CODES_FILE_NAME: &str = "codes.yaml";
pub const CREDENTIALS_FILE_NAME: &str = "credentials.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn xwgit_dir(root: &Path) -> PathBuf {
    root.join(XWGIT_DIR)
}

pub fn session_path(root: &Path) -> PathBuf {
    root.join(SESSION_FILE)
}

pub fn cag_dir(root: &Path) -> PathBuf {
    root.join(CAG_DIR)
}

// Workspace-relative artifact locations for a scaffolded tool.

pub fn tool_impl_rel(kind_dir: &str, name: &str) -> PathBuf {
    PathBuf::from(TOOLS_DIR)
        .join(kind_dir)
        .join(format!("{name}.py"))
}

pub fn tool_doc_rel(name: &str) -> PathBuf {
    PathBuf::from(DOCS_DIR).join(format!("{name}.md"))
}

pub fn tool_test_rel(name: &str) -> PathBuf {
    PathBuf::from(TESTS_DIR).join(format!("test_{name}.py"))
}

/// Operator state directory (`~/.xwgit`), created on first use.
pub fn operator_dir() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(XwgitError::HomeNotFound)?;
    Ok(home.join(HOME_DIR_NAME))
}

pub fn operator_config_path() -> Result<PathBuf> {
    Ok(operator_dir()?.join(CONFIG_FILE_NAME))
}

pub fn operator_codes_path() -> Result<PathBuf> {
    Ok(operator_dir()?.join(CODES_FILE_NAME))
}

pub fn operator_credentials_path() -> Result<PathBuf> {
    Ok(operator_dir()?.join(CREDENTIALS_FILE_NAME))
}

// ---------------------------------------------------------------------------
// Tool-name validation and branch naming
// ---------------------------------------------------------------------------

static TOOL_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn tool_name_re() -> &'static Regex {
    TOOL_NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_\-]*$").unwrap())
}

pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !tool_name_re().is_match(name) {
        return Err(XwgitError::InvalidToolName(name.to_string()));
    }
    Ok(())
}

/// Branch name for a scaffolded tool: `feature/<name>`, or
/// `feature/issue-<n>-<name>` when an issue number is attached.
pub fn branch_for(name: &str, issue: Option<u64>) -> String {
    match issue {
        Some(n) => format!("feature/issue-{n}-{name}"),
        None => format!("feature/{name}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
