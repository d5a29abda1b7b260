mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{cag::CagSubcommand, config::ConfigSubcommand};
use std::path::PathBuf;
use xwgit_core::XwgitError;

#[derive(Parser)]
#[command(
    name = "xwgit",
    about = "Session-authenticated contribution workflow for AI developers",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .xwgit/ or .git/)
    #[arg(long, global = true, env = "XWGIT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session with a single-use access code
    Init {
        /// Access code issued by the operator
        #[arg(long)]
        code: String,
    },

    /// Scaffold a new tool from the standard template set
    Quickstart {
        /// Tool name (lowercase, hyphens/underscores)
        name: String,

        /// One-line tool description, echoed into the generated files
        #[arg(long, default_value = "A useful tool")]
        description: String,

        /// Template kind (search-tool, api-tool)
        #[arg(long = "type", default_value = "search-tool")]
        kind: String,

        /// Service name for API-key wiring in the template
        #[arg(long)]
        api: Option<String>,

        /// Issue number to derive the branch name from
        #[arg(long)]
        issue: Option<u64>,
    },

    /// Show session state, branch, and change summary (read-only)
    Status,

    /// Validate, commit, push, and open a pull request
    Finalize {
        /// Commit message
        message: String,

        /// Issue number referenced in the commit and PR
        #[arg(long)]
        issue: Option<u64>,
    },

    /// Issue an access code for an agent (operator command)
    GenerateCode {
        /// Agent identity the code is bound to
        subject: String,

        /// Validity window (e.g. 30m, 24h); default from config
        #[arg(long)]
        ttl: Option<String>,
    },

    /// Inspect or annotate the context cache
    Cag {
        #[command(subcommand)]
        subcommand: CagSubcommand,
    },

    /// Validate the operator configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { code } => cmd::init::run(&root, &code, cli.json),
        Commands::Quickstart {
            name,
            description,
            kind,
            api,
            issue,
        } => cmd::quickstart::run(&root, &name, &description, &kind, api, issue, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Finalize { message, issue } => {
            cmd::finalize::run(&root, &message, issue, cli.json)
        }
        Commands::GenerateCode { subject, ttl } => {
            cmd::generate_code::run(&subject, ttl.as_deref(), cli.json)
        }
        Commands::Cag { subcommand } => cmd::cag::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// Map domain failures onto the documented exit codes. Everything else is 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    let Some(domain) = err.downcast_ref::<XwgitError>() else {
        return 1;
    };
    match domain {
        XwgitError::CodeExpired | XwgitError::CodeConsumed | XwgitError::CodeNotFound => 2,
        XwgitError::Workspace { .. } => 3,
        XwgitError::TemplateConflict(_) => 4,
        XwgitError::MissingArtifact(_)
        | XwgitError::UnresolvedPlaceholder { .. }
        | XwgitError::CredentialLeak { .. } => 5,
        XwgitError::GitPush(_)
        | XwgitError::GitPr(_)
        | XwgitError::GitAuth(_)
        | XwgitError::GitTimeout { .. }
        | XwgitError::GitUnavailable => 6,
        _ => 1,
    }
}
