//! Single-use access codes binding an agent identity to one `init`.
//!
//! Codes live in `~/.xwgit/codes.yaml`. Every read-modify-write cycle runs
//! under an exclusive file lock so two concurrent invocations cannot consume
//! the same code twice. Expired codes are garbage-collected on every save.

use crate::error::{Result, XwgitError};
use crate::io;
use crate::lock::StoreLock;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 8;
const MAX_GENERATION_ATTEMPTS: usize = 64;

/// Expired entries linger this long before garbage collection, so a stale
/// code reports CodeExpired instead of CodeNotFound.
const GC_GRACE_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCode {
    pub code: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub consumed: bool,
}

impl AccessCode {
    /// A code with `ttl = 0` is born expired: `now >= expires_at` holds from
    /// the instant of issuance.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CodeFile {
    #[serde(default)]
    codes: Vec<AccessCode>,
}

// ---------------------------------------------------------------------------
// CodeStore
// ---------------------------------------------------------------------------

pub struct CodeStore {
    path: PathBuf,
}

impl CodeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the operator default location (`~/.xwgit/codes.yaml`).
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(crate::paths::operator_codes_path()?))
    }

    fn lock_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".lock");
        PathBuf::from(p)
    }

    fn load_file(&self) -> Result<CodeFile> {
        if !self.path.exists() {
            return Ok(CodeFile::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    fn save_file(&self, file: &CodeFile, now: DateTime<Utc>) -> Result<()> {
        // Consumed entries stay until expiry so a replayed code reports
        // CodeConsumed; expired entries stay through the grace window so a
        // stale code reports CodeExpired.
        let cutoff = now - Duration::hours(GC_GRACE_HOURS);
        let live = CodeFile {
            codes: file
                .codes
                .iter()
                .filter(|c| c.expires_at > cutoff)
                .cloned()
                .collect(),
        };
        let data = serde_yaml::to_string(&live)?;
        io::atomic_write(&self.path, data.as_bytes())
    }

    /// Issue a new code for `subject`, unique within the active set.
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<AccessCode> {
        let _lock = StoreLock::acquire(&self.lock_path())?;
        let mut file = self.load_file()?;
        let now = Utc::now();

        let code = generate_unique(&file.codes)?;
        let issued = AccessCode {
            code,
            subject: subject.to_string(),
            issued_at: now,
            expires_at: now + ttl,
            consumed: false,
        };
        file.codes.push(issued.clone());
        self.save_file(&file, now)?;
        Ok(issued)
    }

    /// Validate `code` and return the bound subject. The consume flag is set
    /// and persisted while the store lock is held, so success happens at most
    /// once per code.
    pub fn validate(&self, code: &str) -> Result<String> {
        let _lock = StoreLock::acquire(&self.lock_path())?;
        let mut file = self.load_file()?;
        let now = Utc::now();

        let entry = file
            .codes
            .iter_mut()
            .find(|c| c.code == code)
            .ok_or(XwgitError::CodeNotFound)?;

        if entry.consumed {
            return Err(XwgitError::CodeConsumed);
        }
        if entry.is_expired(now) {
            return Err(XwgitError::CodeExpired);
        }

        entry.consumed = true;
        let subject = entry.subject.clone();
        self.save_file(&file, now)?;
        Ok(subject)
    }

    /// Active (unconsumed, unexpired) codes, for operator inspection.
    pub fn list_active(&self) -> Result<Vec<AccessCode>> {
        let file = self.load_file()?;
        let now = Utc::now();
        Ok(file
            .codes
            .into_iter()
            .filter(|c| !c.consumed && !c.is_expired(now))
            .collect())
    }
}

fn generate_unique(existing: &[AccessCode]) -> Result<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate: String = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        if !existing.iter().any(|c| c.code == candidate) {
            return Ok(candidate);
        }
    }
    Err(XwgitError::CodeGeneration(format!(
        "no unique code after {MAX_GENERATION_ATTEMPTS} attempts"
    )))
}

/// Parse a `--ttl` value: `30m`, `24h`, `90s`, or a bare minute count.
pub fn parse_ttl(s: &str) -> Result<Duration> {
    if let Ok(minutes) = s.parse::<u64>() {
        return Ok(Duration::minutes(minutes as i64));
    }
    let std_dur =
        humantime::parse_duration(s).map_err(|_| XwgitError::InvalidTtl(s.to_string()))?;
    Duration::from_std(std_dur).map_err(|_| XwgitError::InvalidTtl(s.to_string()))
}

/// Resolve the effective TTL for a new code: explicit flag value, else the
/// configured default window.
pub fn effective_ttl(flag: Option<&str>, config_minutes: u64) -> Result<Duration> {
    match flag {
        Some(s) => parse_ttl(s),
        None => Ok(Duration::minutes(config_minutes as i64)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CodeStore {
        CodeStore::new(dir.path().join("codes.yaml"))
    }

    #[test]
    fn issue_then_validate_returns_subject() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let code = s.issue("claude", Duration::minutes(30)).unwrap();
        assert_eq!(code.code.len(), 8);
        assert!(code
            .code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let subject = s.validate(&code.code).unwrap();
        assert_eq!(subject, "claude");
    }

    #[test]
    fn second_validate_is_consumed() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let code = s.issue("claude", Duration::minutes(30)).unwrap();

        s.validate(&code.code).unwrap();
        assert!(matches!(
            s.validate(&code.code),
            Err(XwgitError::CodeConsumed)
        ));
    }

    #[test]
    fn zero_ttl_always_expired() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let code = s.issue("claude", Duration::minutes(0)).unwrap();
        assert!(matches!(
            s.validate(&code.code),
            Err(XwgitError::CodeExpired)
        ));
    }

    #[test]
    fn unknown_code_not_found() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(matches!(
            s.validate("ZZZZZZZZ"),
            Err(XwgitError::CodeNotFound)
        ));
    }

    #[test]
    fn list_active_excludes_expired() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.issue("a", Duration::minutes(0)).unwrap();
        s.issue("b", Duration::minutes(30)).unwrap();
        let active = s.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].subject, "b");
    }

    #[test]
    fn issued_codes_are_unique() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..16 {
            let code = s.issue("claude", Duration::minutes(30)).unwrap();
            assert!(seen.insert(code.code), "duplicate code issued");
        }
    }

    #[test]
    fn ttl_parsing() {
        assert_eq!(parse_ttl("30").unwrap(), Duration::minutes(30));
        assert_eq!(parse_ttl("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_ttl("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_ttl("90s").unwrap(), Duration::seconds(90));
        assert!(parse_ttl("soon").is_err());
    }

    #[test]
    fn effective_ttl_prefers_flag() {
        assert_eq!(
            effective_ttl(Some("24h"), 30).unwrap(),
            Duration::hours(24)
        );
        assert_eq!(effective_ttl(None, 30).unwrap(), Duration::minutes(30));
    }
}
