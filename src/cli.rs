use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,                // global --quiet
    pub no_color: bool,             // global --no-color
    pub workspace: Option<PathBuf>, // global --workspace, canonicalized
}

#[derive(Parser)]
#[command(name = "rlens")]
#[command(about = "Run Rector, preview its diffs, and confirm before anything is written")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress spinners and informational messages
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root; defaults to the current directory
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run Rector on files or directories
    Process(ProcessArgs),

    /// Preview one file's changes and confirm before applying
    Review(ReviewArgs),

    /// Clear Rector's cache
    ClearCache,

    /// Watch PHP files and run the on-save workflow
    Watch(WatchArgs),

    /// Delete leftover scratch files
    Sweep,

    /// Initialize an rlens.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct ProcessArgs {
    /// Files or directories; defaults to the workspace root
    pub targets: Vec<PathBuf>,

    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the normalized result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ReviewArgs {
    /// PHP file to review
    pub file: PathBuf,
}

#[derive(Debug, Parser)]
pub struct WatchArgs {
    /// Directory to watch; defaults to the workspace root
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
