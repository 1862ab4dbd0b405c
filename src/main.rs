use anyhow::{Context, Result};
use clap::Parser;
use rector_lens::cli::{AppContext, Cli, Commands};
use rector_lens::cli_ext::{process_cmd, review_cmd, watch_cmd};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let workspace = match &cli.workspace {
        Some(dir) => Some(
            dunce::canonicalize(dir)
                .with_context(|| format!("Workspace not found: {}", dir.display()))?,
        ),
        None => None,
    };

    // Build a context once, pass everywhere
    let ctx = AppContext { quiet: cli.quiet, no_color: cli.no_color, workspace };

    match cli.command {
        Commands::Process(args) => process_cmd::run(args, &ctx).await,
        Commands::Review(args) => review_cmd::run(args, &ctx).await,
        Commands::ClearCache => process_cmd::clear_cache(&ctx).await,
        Commands::Watch(args) => watch_cmd::run(args, &ctx).await,
        Commands::Sweep => process_cmd::sweep(&ctx).await,
        Commands::Init(args) => rector_lens::infra::config::init(args, &ctx),
        Commands::Completions(args) => rector_lens::completion::run(args, &ctx),
    }
}

/// RUST_LOG wins; otherwise warn, or debug with --verbose.
fn init_tracing(verbose: bool) {
    let default = if verbose { "rector_lens=debug,rlens=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
