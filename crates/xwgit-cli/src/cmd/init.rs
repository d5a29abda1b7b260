use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use xwgit_core::{access_code::CodeStore, config::Config, workflow};

pub fn run(root: &Path, code: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let store = CodeStore::open_default()?;

    let outcome = workflow::init(root, &config, &store, code)?;

    if json {
        #[derive(serde::Serialize)]
        struct InitOutput<'a> {
            agent: &'a str,
            git_name: &'a str,
            degraded_git: bool,
            cag_sections: usize,
        }
        return print_json(&InitOutput {
            agent: &outcome.agent,
            git_name: &outcome.git_name,
            degraded_git: outcome.degraded_git,
            cag_sections: outcome.cag_sections,
        });
    }

    println!("Session initialized for {}", outcome.agent);
    println!("  workspace: {}", root.display());
    println!("  git identity: {}", outcome.git_name);
    if outcome.degraded_git {
        println!("  git: unavailable — running on local files only");
    }
    if outcome.cag_sections > 0 {
        println!(
            "  context cache: {} section(s) loaded",
            outcome.cag_sections
        );
    } else {
        println!("  context cache: empty (first run)");
    }
    println!("\nNext: xwgit quickstart <name> --description=\"...\" --type=search-tool");

    Ok(())
}
