use crate::output::print_json;
use anyhow::Context;
use xwgit_core::{
    access_code::{effective_ttl, CodeStore},
    config::Config,
};

pub fn run(subject: &str, ttl: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let ttl = effective_ttl(ttl, config.code_ttl_minutes)?;

    let store = CodeStore::open_default()?;
    let code = store.issue(subject, ttl)?;

    if json {
        return print_json(&code);
    }

    println!("Access code for {subject}");
    println!("  code:    {}", code.code);
    println!(
        "  expires: {}",
        code.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!("\nHand this to the agent:");
    println!("  xwgit init --code {}", code.code);
    println!("\nThe code is single-use and expires at the time above.");

    Ok(())
}
