use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use xwgit_core::{config::Config, template::ToolSpec, types::ToolKind, workflow};

#[allow(clippy::too_many_arguments)]
pub fn run(
    root: &Path,
    name: &str,
    description: &str,
    kind: &str,
    api: Option<String>,
    issue: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let mut spec = ToolSpec::new(name, ToolKind::parse(kind), description);
    spec.api_name = api;

    let outcome = workflow::quickstart(root, &config, &spec, issue)?;

    if json {
        #[derive(serde::Serialize)]
        struct QuickstartOutput<'a> {
            branch: &'a str,
            written: Vec<String>,
            degraded_git: bool,
        }
        return print_json(&QuickstartOutput {
            branch: &outcome.branch,
            written: outcome
                .written
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            degraded_git: outcome.degraded_git,
        });
    }

    println!("Scaffolded tool '{name}'");
    for path in &outcome.written {
        println!("  created: {}", path.display());
    }
    if outcome.degraded_git {
        println!("  git: unavailable — no branch created");
    } else {
        println!("  branch: {}", outcome.branch);
    }
    println!("\nNext:");
    println!("1. Implement the tool and resolve its scaffolding markers");
    println!("2. Run: xwgit finalize \"<commit message>\"");

    Ok(())
}
