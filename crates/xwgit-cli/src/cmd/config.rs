use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use xwgit_core::config::{Config, WarnLevel};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Lint the operator configuration
    Validate,
}

pub fn run(subcommand: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        ConfigSubcommand::Validate => {
            let config = Config::load().context("failed to load configuration")?;
            let warnings = config.validate();

            if json {
                return print_json(&warnings);
            }

            if warnings.is_empty() {
                println!("configuration ok");
                return Ok(());
            }
            for w in &warnings {
                let level = match w.level {
                    WarnLevel::Warning => "warning",
                    WarnLevel::Error => "error",
                };
                println!("{level}: {}", w.message);
            }
            if warnings.iter().any(|w| w.level == WarnLevel::Error) {
                anyhow::bail!("configuration has errors");
            }
            Ok(())
        }
    }
}
