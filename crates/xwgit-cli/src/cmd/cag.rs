use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use xwgit_core::{
    cag::{content_hash, CagStore, SectionPatch},
    config::Config,
    paths,
};

#[derive(Subcommand)]
pub enum CagSubcommand {
    /// Print the cache document and manifest summary
    Show,
    /// Verify the manifest hash against the body
    Check,
    /// Record a note into a section of the cache (backup runs first)
    Note {
        text: String,

        /// Section heading to write under
        #[arg(long, default_value = "Notes")]
        section: String,
    },
    /// Show the shared global document (read-only mount)
    Global,
}

pub fn run(root: &Path, subcommand: CagSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let store = CagStore::open(paths::cag_dir(root), config.cag.ceiling_tokens);

    match subcommand {
        CagSubcommand::Show => show(&store, json),
        CagSubcommand::Check => {
            let doc = store.load()?;
            let recomputed = content_hash(&doc.body);
            if json {
                #[derive(serde::Serialize)]
                struct CheckOutput<'a> {
                    ok: bool,
                    hash: &'a str,
                }
                return print_json(&CheckOutput {
                    ok: doc.manifest.hash == recomputed,
                    hash: &doc.manifest.hash,
                });
            }
            // load() already reconciles or fails on mismatch; getting here
            // means the pair is consistent.
            println!("context cache ok ({} sections)", doc.manifest.sections.len());
            Ok(())
        }
        CagSubcommand::Note { text, section } => {
            let doc = store.mutate(&SectionPatch {
                section,
                content: text,
            })?;
            if json {
                return print_json(&doc.manifest);
            }
            println!(
                "Recorded. Cache at ~{} tokens{}",
                doc.token_estimate(),
                if doc.manifest.saturation_warning {
                    " (nearing ceiling)"
                } else {
                    ""
                }
            );
            Ok(())
        }
        CagSubcommand::Global => {
            let Some(global_path) = config.cag.global_path.clone() else {
                println!("No global cache configured (cag.global_path)");
                return Ok(());
            };
            let global = CagStore::mount_global(global_path, config.cag.ceiling_tokens);
            show(&global, json)
        }
    }
}

fn show(store: &CagStore, json: bool) -> anyhow::Result<()> {
    let doc = store.load()?;
    if json {
        #[derive(serde::Serialize)]
        struct ShowOutput<'a> {
            sections: &'a [String],
            tokens: usize,
            hash: &'a str,
            saturation_warning: bool,
            updated_at: chrono::DateTime<chrono::Utc>,
        }
        return print_json(&ShowOutput {
            sections: &doc.manifest.sections,
            tokens: doc.token_estimate(),
            hash: &doc.manifest.hash,
            saturation_warning: doc.manifest.saturation_warning,
            updated_at: doc.manifest.updated_at,
        });
    }

    if doc.body.is_empty() {
        println!("(empty context cache)");
        return Ok(());
    }
    println!(
        "{} section(s), ~{} tokens, updated {}",
        doc.manifest.sections.len(),
        doc.token_estimate(),
        doc.manifest.updated_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!("---");
    println!("{}", doc.body);
    Ok(())
}
