//! Credential resolution for integrated services.
//!
//! One variable per service, always named `<SERVICE>_API_KEY`, resolved
//! through an ordered list of lookup strategies tried in sequence. The
//! composition is an explicit list, not reflection, so a caller can say
//! exactly where a value came from.

use crate::error::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Environment,
    DotEnv(PathBuf),
    UserConfig(PathBuf),
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Environment => write!(f, "environment"),
            Source::DotEnv(p) => write!(f, ".env ({})", p.display()),
            Source::UserConfig(p) => write!(f, "user config ({})", p.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub value: String,
    pub source: Source,
}

/// The canonical variable name for a service.
pub fn key_var(service: &str) -> String {
    format!("{}_API_KEY", service.to_uppercase().replace('-', "_"))
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

enum Strategy {
    Environment,
    DotEnv(PathBuf),
    UserConfig(PathBuf),
}

impl Strategy {
    fn lookup(&self, var: &str) -> Option<Resolved> {
        match self {
            Strategy::Environment => std::env::var(var).ok().map(|value| Resolved {
                value,
                source: Source::Environment,
            }),
            Strategy::DotEnv(path) => {
                if !path.exists() {
                    return None;
                }
                let iter = dotenvy::from_path_iter(path).ok()?;
                for item in iter {
                    let (key, value) = item.ok()?;
                    if key == var {
                        return Some(Resolved {
                            value,
                            source: Source::DotEnv(path.clone()),
                        });
                    }
                }
                None
            }
            Strategy::UserConfig(path) => {
                if !path.exists() {
                    return None;
                }
                let data = std::fs::read_to_string(path).ok()?;
                let file: CredentialsFile = serde_yaml::from_str(&data).ok()?;
                file.keys.get(var).map(|value| Resolved {
                    value: value.clone(),
                    source: Source::UserConfig(path.clone()),
                })
            }
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct CredentialsFile {
    #[serde(default)]
    keys: HashMap<String, String>,
}

pub struct Resolver {
    strategies: Vec<Strategy>,
}

impl Resolver {
    /// Standard order: process environment, then the workspace `.env`, then
    /// the operator credentials file.
    pub fn standard(workspace: &Path) -> Result<Self> {
        Ok(Self {
            strategies: vec![
                Strategy::Environment,
                Strategy::DotEnv(workspace.join(".env")),
                Strategy::UserConfig(crate::paths::operator_credentials_path()?),
            ],
        })
    }

    /// Explicit fallback chain for tests and non-standard layouts.
    pub fn with_paths(dotenv: PathBuf, user_config: PathBuf) -> Self {
        Self {
            strategies: vec![
                Strategy::Environment,
                Strategy::DotEnv(dotenv),
                Strategy::UserConfig(user_config),
            ],
        }
    }

    /// Resolve `<SERVICE>_API_KEY`, first strategy wins.
    pub fn resolve(&self, service: &str) -> Option<Resolved> {
        let var = key_var(service);
        self.strategies.iter().find_map(|s| s.lookup(&var))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
