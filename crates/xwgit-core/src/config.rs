use crate::error::Result;
use crate::io;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// GitHub REST API base. Overridable for self-hosted instances and tests.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_organization() -> String {
    "xwander-dev".to_string()
}

fn default_repository() -> String {
    "XwDevTools".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            repository: default_repository(),
            default_branch: default_branch(),
            api_base: default_api_base(),
        }
    }
}

// ---------------------------------------------------------------------------
// IdentityConfig
// ---------------------------------------------------------------------------

/// How git identities are derived from an agent name. Observed deployments
/// disagree on the exact shape, so both parts are configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_email_domain")]
    pub email_domain: String,
}

fn default_name_prefix() -> String {
    "AI-".to_string()
}

fn default_email_domain() -> String {
    "ai.xwander.dev".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            email_domain: default_email_domain(),
        }
    }
}

impl IdentityConfig {
    pub fn git_name(&self, agent: &str) -> String {
        format!("{}{}", self.name_prefix, agent)
    }

    pub fn git_email(&self, agent: &str) -> String {
        format!("{}@{}", agent.to_lowercase(), self.email_domain)
    }
}

// ---------------------------------------------------------------------------
// CagConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CagConfig {
    /// Body size ceiling, in estimated tokens.
    #[serde(default = "default_ceiling_tokens")]
    pub ceiling_tokens: usize,
    /// Shared read-only global document, if mounted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_path: Option<std::path::PathBuf>,
}

fn default_ceiling_tokens() -> usize {
    50_000
}

impl Default for CagConfig {
    fn default() -> Self {
        Self {
            ceiling_tokens: default_ceiling_tokens(),
            global_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level, ~/.xwgit/config.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub cag: CagConfig,
    /// Default validity window for issued access codes, in minutes.
    /// Deployments have run with 30 and with 1440; neither is canonical.
    #[serde(default = "default_code_ttl_minutes")]
    pub code_ttl_minutes: u64,
    /// Strict mode refuses to create a missing workspace directory at init;
    /// non-strict mode creates it.
    #[serde(default)]
    pub strict_workspace: bool,
    /// Clone the configured repository into an empty workspace at init.
    /// Off by default: the usual deployment hands the agent a pre-cloned
    /// checkout.
    #[serde(default)]
    pub clone_missing: bool,
    /// Upper bound on any single git verb, in seconds.
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,
}

fn default_code_ttl_minutes() -> u64 {
    30
}

fn default_git_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            identity: IdentityConfig::default(),
            cag: CagConfig::default(),
            code_ttl_minutes: default_code_ttl_minutes(),
            strict_workspace: false,
            clone_missing: false,
            git_timeout_secs: default_git_timeout_secs(),
        }
    }
}

impl Config {
    /// Load the operator config, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = paths::operator_config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.code_ttl_minutes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "code_ttl_minutes is 0 — every issued code is born expired".to_string(),
            });
        }

        if self.code_ttl_minutes > 24 * 60 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "code_ttl_minutes={} (>24h is unusual for a single-use code)",
                    self.code_ttl_minutes
                ),
            });
        }

        if self.cag.ceiling_tokens < 1_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "cag.ceiling_tokens={} leaves almost no room for session records",
                    self.cag.ceiling_tokens
                ),
            });
        }

        if self.remote.organization.is_empty() || self.remote.repository.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "remote.organization and remote.repository must be set".to_string(),
            });
        }

        if let Some(global) = &self.cag.global_path {
            if !global.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("cag.global_path does not exist: {}", global.display()),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
