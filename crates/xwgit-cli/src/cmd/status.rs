use crate::output::{print_json, print_table};
use std::path::Path;
use xwgit_core::{config::Config, workflow};

/// Read-only: always exits 0, even when the workspace has no session or the
/// state files are unreadable.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    let report = match workflow::status(root, &config) {
        Ok(report) => report,
        Err(e) => {
            println!("status unavailable: {e}");
            return Ok(());
        }
    };

    if json {
        return print_json(&report);
    }

    println!("Workspace: {}", report.workspace.display());
    println!("State: {}", report.state);
    if let Some(agent) = &report.agent {
        println!("Agent: {agent}");
    }
    if let Some(branch) = &report.branch {
        println!("Branch: {branch}");
    }
    if let Some(pending) = &report.pending {
        println!("Pending finalize stage: {pending} (re-run finalize to resume)");
    }
    if let Some(err) = &report.last_error {
        println!("Last error: {err}");
    }
    if report.degraded_git {
        println!("Git: unavailable (degraded mode, local files only)");
    }

    if !report.tools.is_empty() {
        println!("\nScaffolded tools:");
        for tool in &report.tools {
            println!("  {tool}");
        }
    }

    match &report.changes {
        Some(changes) if !changes.is_clean() => {
            println!("\nUncommitted changes:");
            let mut rows = Vec::new();
            for p in &changes.added {
                rows.push(vec!["added".to_string(), p.clone()]);
            }
            for p in &changes.modified {
                rows.push(vec!["modified".to_string(), p.clone()]);
            }
            for p in &changes.deleted {
                rows.push(vec!["deleted".to_string(), p.clone()]);
            }
            for p in &changes.untracked {
                rows.push(vec!["untracked".to_string(), p.clone()]);
            }
            print_table(&["STATUS", "PATH"], rows);
        }
        Some(_) => println!("\nWorking tree clean"),
        None => {}
    }

    if !report.recent_commits.is_empty() {
        println!("\nRecent commits:");
        for line in &report.recent_commits {
            println!("  {line}");
        }
    }

    println!(
        "\nContext cache: {} section(s), ~{} tokens{}",
        report.cag_sections.len(),
        report.cag_tokens,
        if report.cag_saturation_warning {
            " (nearing ceiling)"
        } else {
            ""
        }
    );

    Ok(())
}
