use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use xwgit_core::{config::Config, git::CommitOutcome, workflow};

pub fn run(root: &Path, message: &str, issue: Option<u64>, json: bool) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let outcome = workflow::finalize(root, &config, message, issue)?;

    if json {
        #[derive(serde::Serialize)]
        struct FinalizeOutput {
            committed: bool,
            pushed: bool,
            pr_number: Option<u64>,
            pr_url: Option<String>,
        }
        return print_json(&FinalizeOutput {
            committed: outcome.commit == CommitOutcome::Created,
            pushed: outcome.pushed,
            pr_number: outcome.pr.as_ref().map(|pr| pr.number),
            pr_url: outcome.pr.as_ref().map(|pr| pr.html_url.clone()),
        });
    }

    match outcome.commit {
        CommitOutcome::Created => println!("Changes committed: {message}"),
        CommitOutcome::NothingToCommit => println!("Working tree already committed, no new commit"),
    }
    if outcome.pushed {
        println!("Branch pushed to origin");
    }
    match &outcome.pr {
        Some(pr) => println!("Pull request opened: {}", pr.html_url),
        None => println!("No pull request opened (no GITHUB_API_KEY resolved)"),
    }
    println!("\nSession finalized.");

    Ok(())
}
