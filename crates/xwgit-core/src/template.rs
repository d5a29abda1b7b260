//! Artifact templates for `quickstart`.
//!
//! `render` is pure and deterministic: the same `ToolSpec` always produces
//! byte-identical content. Filesystem effects (conflict detection, writing)
//! are separate so the caller owns the conflict policy.

use crate::error::{Result, XwgitError};
use crate::io;
use crate::paths;
use crate::types::ToolKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Marker left in generated implementation bodies. `finalize` refuses to
/// ship files that still contain it.
pub const PLACEHOLDER_MARKER: &str = "XWGIT-TODO";

// ---------------------------------------------------------------------------
// ToolSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub kind: ToolKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, kind: ToolKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            api_name: None,
        }
    }

    /// Environment variable the generated code reads its credential from.
    /// Always `<SERVICE>_API_KEY`; the value itself is never rendered.
    pub fn api_key_var(&self) -> Option<String> {
        self.api_name
            .as_ref()
            .map(|api| format!("{}_API_KEY", api.to_uppercase().replace('-', "_")))
    }
}

// ---------------------------------------------------------------------------
// GeneratedArtifactSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Implementation,
    Documentation,
    Test,
}

impl std::fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactRole::Implementation => "implementation",
            ArtifactRole::Documentation => "documentation",
            ArtifactRole::Test => "test",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub role: ArtifactRole,
    /// Workspace-relative path.
    pub path: PathBuf,
    pub content: String,
    /// Set by `mark_conflicts`; a pre-existing target is never overwritten
    /// silently.
    pub exists: bool,
}

#[derive(Debug, Clone)]
pub struct GeneratedArtifactSet {
    pub files: Vec<GeneratedFile>,
}

/// What to do when a render target already exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Surface `TemplateConflict` naming the first conflicting path.
    Abort,
    /// Leave the existing file untouched, write the rest.
    Skip,
    /// Move the existing file to `<path>.bak` first.
    Backup,
}

impl GeneratedArtifactSet {
    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    /// Fill in the `exists` flags against the workspace.
    pub fn mark_conflicts(&mut self, root: &Path) {
        for file in &mut self.files {
            file.exists = root.join(&file.path).exists();
        }
    }

    /// Write all artifacts under `root` honoring `policy`. Returns the
    /// workspace-relative paths actually written.
    pub fn write(&self, root: &Path, policy: ConflictPolicy) -> Result<Vec<PathBuf>> {
        if policy == ConflictPolicy::Abort {
            if let Some(conflict) = self.files.iter().find(|f| root.join(&f.path).exists()) {
                return Err(XwgitError::TemplateConflict(conflict.path.clone()));
            }
        }

        let mut written = Vec::new();
        for file in &self.files {
            let target = root.join(&file.path);
            if target.exists() {
                match policy {
                    ConflictPolicy::Abort => {
                        return Err(XwgitError::TemplateConflict(file.path.clone()))
                    }
                    ConflictPolicy::Skip => {
                        warn!(path = %file.path.display(), "target exists, skipping");
                        continue;
                    }
                    ConflictPolicy::Backup => {
                        let mut backup = target.clone().into_os_string();
                        backup.push(".bak");
                        std::fs::rename(&target, PathBuf::from(backup))?;
                    }
                }
            }
            io::atomic_write(&target, file.content.as_bytes())?;
            written.push(file.path.clone());
        }
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the artifact set for `spec`. Unknown kinds fall back to the
/// search-tool template; that is a policy choice and is logged, not silent.
pub fn render(spec: &ToolSpec) -> Result<GeneratedArtifactSet> {
    paths::validate_tool_name(&spec.name)?;

    let kind_dir = match &spec.kind {
        ToolKind::Search => "search",
        ToolKind::Api => "api",
        ToolKind::Other(other) => {
            warn!(
                kind = %other,
                "unknown tool type, falling back to the search-tool template"
            );
            "search"
        }
    };

    let impl_template = match spec.kind {
        ToolKind::Api => API_TOOL_TEMPLATE,
        _ => SEARCH_TOOL_TEMPLATE,
    };

    let key_var = spec.api_key_var().unwrap_or_else(|| "API_KEY".to_string());
    let vars = [
        ("name", spec.name.as_str()),
        ("description", spec.description.as_str()),
        ("kind_dir", kind_dir),
        ("key_var", key_var.as_str()),
        ("marker", PLACEHOLDER_MARKER),
    ];

    let files = vec![
        GeneratedFile {
            role: ArtifactRole::Implementation,
            path: paths::tool_impl_rel(kind_dir, &spec.name),
            content: substitute(impl_template, &vars),
            exists: false,
        },
        GeneratedFile {
            role: ArtifactRole::Documentation,
            path: paths::tool_doc_rel(&spec.name),
            content: substitute(DOC_TEMPLATE, &vars),
            exists: false,
        },
        GeneratedFile {
            role: ArtifactRole::Test,
            path: paths::tool_test_rel(&spec.name),
            content: substitute(TEST_TEMPLATE, &vars),
            exists: false,
        },
    ];

    Ok(GeneratedArtifactSet { files })
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------
//
// The generated files are Python — the target repository is a Python tool
// collection. Credentials are referenced through the environment, never
// rendered into the file.

const SEARCH_TOOL_TEMPLATE: &str = r#"#!/usr/bin/env python3
"""
{{name}}.py - {{description}}
"""

import os
import sys
import argparse


def main():
    parser = argparse.ArgumentParser(description="{{description}}")
    parser.add_argument("query", nargs="+", help="Query to process")
    args = parser.parse_args()

    query = " ".join(args.query)

    # {{marker}}: implement the search behavior for this tool.
    print(f"Processing: {query}")
    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;

const API_TOOL_TEMPLATE: &str = r#"#!/usr/bin/env python3
"""
{{name}}.py - {{description}}
"""

import os
import sys
import argparse


def get_api_key():
    """Credential comes from the environment; never hardcode it here."""
    key = os.environ.get("{{key_var}}")
    if not key:
        print("error: {{key_var}} is not set", file=sys.stderr)
        sys.exit(1)
    return key


def main():
    parser = argparse.ArgumentParser(description="{{description}}")
    parser.add_argument("query", nargs="+", help="Query to process")
    args = parser.parse_args()

    query = " ".join(args.query)
    api_key = get_api_key()

    # {{marker}}: call the upstream API with `api_key` and render the result.
    print(f"Processing: {query}")
    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;

const DOC_TEMPLATE: &str = r#"# {{name}}

## Description

{{description}}

## Usage

```bash
./tools/{{kind_dir}}/{{name}}.py "your query"
```

## Configuration

Credentials are read from the environment:

```
{{key_var}}=<set in your environment or .env>
```

## Notes

- Returns a non-zero exit code on failure.
"#;

const TEST_TEMPLATE: &str = r#"#!/usr/bin/env python3
"""
Test suite for {{name}}.py
"""

import unittest
import sys
import os

sys.path.insert(0, os.path.abspath(os.path.join(os.path.dirname(__file__), "..")))


class TestTool(unittest.TestCase):
    """Test cases for {{name}}.py"""

    def test_placeholder(self):
        # {{marker}}: replace with real assertions for this tool.
        self.assertTrue(True)


if __name__ == "__main__":
    unittest.main()
"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
