//! **rector-lens** - Run Rector, preview its diffs, confirm before applying
//!
//! Shells out to Rector, parses its JSON report, rebuilds the proposed file
//! from the unified diff, and drives an apply/discard confirmation through an
//! editor host.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Command handlers behind the CLI
pub mod cli_ext {
    /// `process`, `clear-cache` and `sweep`
    pub mod process_cmd;

    /// Interactive terminal review
    pub mod review_cmd;

    /// On-save workflow driven by file-system events
    pub mod watch_cmd;
}

/// Core pipeline - invocation, parsing, reconstruction, confirmation
pub mod core {
    /// Rector process invocation with timeout and tolerant exit handling
    pub mod invoke;
    pub use invoke::{InvocationError, InvocationRequest, InvocationResult, Invoker};

    /// JSON report parsing with noise tolerance
    pub mod output;
    pub use output::ParsedOutput;

    /// Unified diff reconstruction
    pub mod patch;

    /// Scratch artifact placement, atomic writes, sweeping
    pub mod scratch;
    pub use scratch::ScratchSpace;

    /// Apply/discard confirmation state machine
    pub mod session;
    pub use session::{ConfirmationController, EditorHost, Notice, SessionOutcome, SessionState, ViewEvent};

    /// Preview-then-confirm and on-save behavior
    pub mod workflow;
    pub use workflow::{ReviewOutcome, SaveOutcome, Workflow};
}

/// Editor hosts
pub mod host {
    /// Terminal comparison view and key input
    pub mod terminal;
    pub use terminal::TerminalHost;
}

/// Infrastructure - Configuration and path rules
pub mod infra {
    /// Layered configuration with TOML/YAML/JSON files and env overrides
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// User path expansion, normalization, config discovery
    pub mod paths;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, load_config};
