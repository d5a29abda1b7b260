//! Context-aware generation cache: a bounded knowledge document plus an
//! integrity manifest, reloaded at session start so an agent does not
//! re-explore the repository every session.
//!
//! Layout under the workspace:
//!   .xwgit/cag/
//!     context.md        — the document body
//!     manifest.yaml     — version, hash, sections, backup pointer
//!     backups/          — timestamped full copies, written before mutation

use crate::error::{Result, XwgitError};
use crate::io;
use crate::lock::StoreLock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::warn;

const DOC_FILE: &str = "context.md";
const MANIFEST_FILE: &str = "manifest.yaml";
const BACKUPS_DIR: &str = "backups";
const LOCK_FILE: &str = ".cag.lock";

/// Rough chars-per-token divisor for the body budget.
const CHARS_PER_TOKEN: usize = 4;
/// The saturation flag trips at this fraction of the ceiling.
const SATURATION_NUM: usize = 9;
const SATURATION_DEN: usize = 10;

// ---------------------------------------------------------------------------
// Manifest / document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    /// SHA-256 of the body, lowercase hex. Must always match a hash
    /// recomputed from the body; a mismatch means the pair is stale.
    pub hash: String,
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
    /// `## ` heading anchors, in document order.
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(default)]
    pub saturation_warning: bool,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone)]
pub struct CagDocument {
    pub body: String,
    pub manifest: Manifest,
}

impl CagDocument {
    fn empty() -> Self {
        let body = String::new();
        Self {
            manifest: Manifest {
                version: 1,
                updated_at: Utc::now(),
                hash: content_hash(&body),
                dependencies: Vec::new(),
                sections: Vec::new(),
                backup: None,
                saturation_warning: false,
            },
            body,
        }
    }

    pub fn token_estimate(&self) -> usize {
        estimate_tokens(&self.body)
    }
}

pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn estimate_tokens(body: &str) -> usize {
    body.chars().count() / CHARS_PER_TOKEN
}

fn parse_sections(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|l| l.strip_prefix("## "))
        .map(|s| s.trim().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// SectionPatch
// ---------------------------------------------------------------------------

/// A section-scoped edit: replaces the named `## ` section's content, or
/// appends the section if it does not exist yet.
#[derive(Debug, Clone)]
pub struct SectionPatch {
    pub section: String,
    pub content: String,
}

fn apply_patch(body: &str, patch: &SectionPatch) -> String {
    let heading = format!("## {}", patch.section);
    let mut out = String::with_capacity(body.len() + patch.content.len());
    let mut replaced = false;
    let mut skipping = false;

    for line in body.lines() {
        if line.trim_end() == heading {
            out.push_str(&heading);
            out.push('\n');
            out.push_str(patch.content.trim_end());
            out.push('\n');
            replaced = true;
            skipping = true;
            continue;
        }
        if skipping {
            if line.starts_with("## ") {
                skipping = false;
            } else {
                continue;
            }
        }
        out.push_str(line);
        out.push('\n');
    }

    if !replaced {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(&heading);
        out.push('\n');
        out.push_str(patch.content.trim_end());
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// CagStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadWrite,
    /// Shared/global mounts: loads succeed, any mutation is `CacheReadOnly`.
    ReadOnly,
}

pub struct CagStore {
    dir: PathBuf,
    mode: Mode,
    ceiling_tokens: usize,
}

impl CagStore {
    pub fn open(dir: impl Into<PathBuf>, ceiling_tokens: usize) -> Self {
        Self {
            dir: dir.into(),
            mode: Mode::ReadWrite,
            ceiling_tokens,
        }
    }

    /// Mount a shared global document. Read-only by construction; only the
    /// designated maintainer opens it read-write from its own session.
    pub fn mount_global(dir: impl Into<PathBuf>, ceiling_tokens: usize) -> Self {
        Self {
            dir: dir.into(),
            mode: Mode::ReadOnly,
            ceiling_tokens,
        }
    }

    pub fn doc_path(&self) -> PathBuf {
        self.dir.join(DOC_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn backups_dir(&self) -> PathBuf {
        self.dir.join(BACKUPS_DIR)
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    /// Load the document. A missing pair is a first run: returns an empty
    /// document with a warning. A hash mismatch tries backup recovery and
    /// only then fails with `CacheCorruption`.
    pub fn load(&self) -> Result<CagDocument> {
        let doc_path = self.doc_path();
        let manifest_path = self.manifest_path();

        if !doc_path.exists() && !manifest_path.exists() {
            warn!(dir = %self.dir.display(), "no context cache yet, starting empty");
            return Ok(CagDocument::empty());
        }

        let body = if doc_path.exists() {
            std::fs::read_to_string(&doc_path)?
        } else {
            String::new()
        };

        if !manifest_path.exists() {
            // Body without manifest: regenerate the manifest rather than
            // failing a first-run-shaped situation.
            warn!("context cache manifest missing, regenerating from body");
            return Ok(self.document_from_body(body, None));
        }

        let manifest: Manifest = serde_yaml::from_str(&std::fs::read_to_string(&manifest_path)?)?;
        if manifest.hash == content_hash(&body) {
            return Ok(CagDocument { body, manifest });
        }

        warn!("context cache hash mismatch, attempting backup recovery");
        match self.recover_from_backups()? {
            Some(doc) => Ok(doc),
            None => Err(XwgitError::CacheCorruption(format!(
                "manifest hash does not match body at {} and no backup verifies",
                doc_path.display()
            ))),
        }
    }

    /// Newest backup whose recorded hash matches its own body, if any.
    fn recover_from_backups(&self) -> Result<Option<CagDocument>> {
        let backups = self.backups_dir();
        if !backups.exists() {
            return Ok(None);
        }
        let mut stamps: Vec<String> = std::fs::read_dir(&backups)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".md").map(|s| s.to_string())
            })
            .collect();
        stamps.sort();

        for stamp in stamps.iter().rev() {
            let body_path = backups.join(format!("{stamp}.md"));
            let manifest_path = backups.join(format!("{stamp}.manifest.yaml"));
            let Ok(body) = std::fs::read_to_string(&body_path) else {
                continue;
            };
            let Ok(manifest_raw) = std::fs::read_to_string(&manifest_path) else {
                continue;
            };
            let Ok(manifest) = serde_yaml::from_str::<Manifest>(&manifest_raw) else {
                continue;
            };
            if manifest.hash == content_hash(&body) {
                warn!(backup = %stamp, "recovered context cache from backup");
                return Ok(Some(CagDocument { body, manifest }));
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Mutate
    // -----------------------------------------------------------------------

    /// Apply a section patch: backup, patch, enforce the ceiling, recompute
    /// the manifest, persist — all under the store lock. The backup is never
    /// skipped on this path.
    pub fn mutate(&self, patch: &SectionPatch) -> Result<CagDocument> {
        if self.mode == Mode::ReadOnly {
            return Err(XwgitError::CacheReadOnly);
        }

        let _lock = StoreLock::acquire(&self.dir.join(LOCK_FILE))?;
        let current = self.load()?;

        let backup = self.backup(&current)?;

        let body = apply_patch(&current.body, patch);
        let tokens = estimate_tokens(&body);
        if tokens > self.ceiling_tokens {
            return Err(XwgitError::CacheCeiling {
                have: tokens,
                ceiling: self.ceiling_tokens,
            });
        }

        let mut doc = self.document_from_body(body, Some(backup));
        doc.manifest.dependencies = current.manifest.dependencies;
        self.persist(&doc)?;
        Ok(doc)
    }

    /// Replace the dependency list (file paths the document's knowledge was
    /// derived from). Manifest-only change, but the backup still runs first.
    pub fn set_dependencies(&self, dependencies: Vec<PathBuf>) -> Result<CagDocument> {
        if self.mode == Mode::ReadOnly {
            return Err(XwgitError::CacheReadOnly);
        }
        let _lock = StoreLock::acquire(&self.dir.join(LOCK_FILE))?;
        let current = self.load()?;
        let backup = self.backup(&current)?;

        let mut doc = self.document_from_body(current.body, Some(backup));
        doc.manifest.dependencies = dependencies;
        self.persist(&doc)?;
        Ok(doc)
    }

    /// Timestamped full copy of the current pair. Fails loudly rather than
    /// letting a mutation proceed without one.
    fn backup(&self, doc: &CagDocument) -> Result<String> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f").to_string();
        let backups = self.backups_dir();
        io::ensure_dir(&backups)?;
        io::atomic_write(&backups.join(format!("{stamp}.md")), doc.body.as_bytes())?;
        let manifest_yaml = serde_yaml::to_string(&doc.manifest)?;
        io::atomic_write(
            &backups.join(format!("{stamp}.manifest.yaml")),
            manifest_yaml.as_bytes(),
        )?;
        Ok(stamp)
    }

    fn document_from_body(&self, body: String, backup: Option<String>) -> CagDocument {
        let tokens = estimate_tokens(&body);
        let manifest = Manifest {
            version: 1,
            updated_at: Utc::now(),
            hash: content_hash(&body),
            dependencies: Vec::new(),
            sections: parse_sections(&body),
            backup,
            saturation_warning: tokens * SATURATION_DEN >= self.ceiling_tokens * SATURATION_NUM,
        };
        CagDocument { body, manifest }
    }

    fn persist(&self, doc: &CagDocument) -> Result<()> {
        io::atomic_write(&self.doc_path(), doc.body.as_bytes())?;
        let manifest_yaml = serde_yaml::to_string(&doc.manifest)?;
        io::atomic_write(&self.manifest_path(), manifest_yaml.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CagStore {
        CagStore::open(dir.path().join("cag"), 50_000)
    }

    fn patch(section: &str, content: &str) -> SectionPatch {
        SectionPatch {
            section: section.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn load_absent_yields_empty_document() {
        let dir = TempDir::new().unwrap();
        let doc = store(&dir).load().unwrap();
        assert!(doc.body.is_empty());
        assert_eq!(doc.manifest.hash, content_hash(""));
    }

    #[test]
    fn mutate_then_load_hash_matches() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.mutate(&patch("Repository Layout", "tools/ holds one script per tool."))
            .unwrap();

        let loaded = s.load().unwrap();
        assert_eq!(loaded.manifest.hash, content_hash(&loaded.body));
        assert_eq!(loaded.manifest.sections, vec!["Repository Layout"]);
        assert!(loaded.body.contains("one script per tool"));
    }

    #[test]
    fn patch_replaces_existing_section() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.mutate(&patch("Gotchas", "old note")).unwrap();
        s.mutate(&patch("Gotchas", "new note")).unwrap();

        let doc = s.load().unwrap();
        assert!(doc.body.contains("new note"));
        assert!(!doc.body.contains("old note"));
        assert_eq!(doc.manifest.sections, vec!["Gotchas"]);
    }

    #[test]
    fn patch_appends_new_section_preserving_others() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.mutate(&patch("Layout", "body A")).unwrap();
        s.mutate(&patch("Sessions", "body B")).unwrap();

        let doc = s.load().unwrap();
        assert_eq!(doc.manifest.sections, vec!["Layout", "Sessions"]);
        assert!(doc.body.contains("body A"));
        assert!(doc.body.contains("body B"));
    }

    #[test]
    fn backup_written_before_every_mutation() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.mutate(&patch("A", "one")).unwrap();
        let doc = s.mutate(&patch("B", "two")).unwrap();

        let backups = dir.path().join("cag/backups");
        let count = std::fs::read_dir(&backups)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".md")
            })
            .count();
        assert_eq!(count, 2);
        assert!(doc.manifest.backup.is_some());
    }

    #[test]
    fn corruption_detected_and_recovered_from_backup() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.mutate(&patch("A", "good content")).unwrap();
        s.mutate(&patch("B", "more content")).unwrap();

        // Tamper with the body without updating the manifest.
        std::fs::write(s.doc_path(), "tampered").unwrap();

        let doc = s.load().unwrap();
        assert_eq!(doc.manifest.hash, content_hash(&doc.body));
        assert!(doc.body.contains("good content"));
    }

    #[test]
    fn corruption_without_backup_is_hard_failure() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.mutate(&patch("A", "content")).unwrap();

        std::fs::write(s.doc_path(), "tampered").unwrap();
        // Invalidate the only backup too.
        let backups = dir.path().join("cag/backups");
        for entry in std::fs::read_dir(&backups).unwrap() {
            let p = entry.unwrap().path();
            if p.extension().map(|e| e == "md").unwrap_or(false) {
                std::fs::write(p, "also tampered").unwrap();
            }
        }

        assert!(matches!(
            s.load(),
            Err(XwgitError::CacheCorruption(_))
        ));
    }

    #[test]
    fn ceiling_enforced() {
        let dir = TempDir::new().unwrap();
        let s = CagStore::open(dir.path().join("cag"), 10);
        let err = s
            .mutate(&patch("A", &"x".repeat(200)))
            .unwrap_err();
        assert!(matches!(err, XwgitError::CacheCeiling { .. }));
    }

    #[test]
    fn saturation_warning_near_ceiling() {
        let dir = TempDir::new().unwrap();
        // Ceiling 100 tokens = 400 chars; 95 tokens of content trips the flag.
        let s = CagStore::open(dir.path().join("cag"), 100);
        let doc = s.mutate(&patch("A", &"y".repeat(380))).unwrap();
        assert!(doc.manifest.saturation_warning);

        let small = CagStore::open(dir.path().join("cag2"), 100);
        let doc = small.mutate(&patch("A", "short")).unwrap();
        assert!(!doc.manifest.saturation_warning);
    }

    #[test]
    fn global_mount_rejects_mutation() {
        let dir = TempDir::new().unwrap();
        // Seed a document through a read-write handle first.
        let rw = store(&dir);
        rw.mutate(&patch("Shared", "global knowledge")).unwrap();

        let global = CagStore::mount_global(dir.path().join("cag"), 50_000);
        let doc = global.load().unwrap();
        assert!(doc.body.contains("global knowledge"));

        assert!(matches!(
            global.mutate(&patch("Shared", "vandalism")),
            Err(XwgitError::CacheReadOnly)
        ));
    }

    #[test]
    fn dependencies_roundtrip() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.mutate(&patch("A", "body")).unwrap();
        s.set_dependencies(vec![PathBuf::from("tools/search/t.py")])
            .unwrap();

        let doc = s.load().unwrap();
        assert_eq!(
            doc.manifest.dependencies,
            vec![PathBuf::from("tools/search/t.py")]
        );
    }
}
