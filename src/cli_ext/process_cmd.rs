//! `rlens process`, `rlens clear-cache` and `rlens sweep`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tracing::instrument;

use crate::cli::{AppContext, ProcessArgs};
use crate::core::invoke::{InvocationResult, Invoker};
use crate::core::scratch::ScratchSpace;
use crate::core::session::ConfirmationController;
use crate::core::workflow::{Workflow, source_matcher};
use crate::host::terminal::TerminalHost;
use crate::infra::config::{Config, load_config};

/// Workspace root from the global flag, else the current directory
pub fn workspace_root(ctx: &AppContext) -> Result<PathBuf> {
    match &ctx.workspace {
        Some(root) => Ok(root.clone()),
        None => std::env::current_dir().context("Failed to read current directory"),
    }
}

/// Wire config, invoker, scratch space and the terminal host together.
pub fn terminal_workflow(ctx: &AppContext) -> Result<(Workflow<TerminalHost>, Arc<TerminalHost>, Config)> {
    let root = workspace_root(ctx)?;
    let config = load_config(Some(&root))?;

    let host = Arc::new(TerminalHost::new(ctx));
    let controller = ConfirmationController::new(Arc::clone(&host), ScratchSpace::new(Some(&root)));
    let invoker = Invoker::new(config.rector.clone(), Some(root));
    let sources = source_matcher(&config.watch.patterns).context("Invalid watch pattern")?;

    let workflow = Workflow::new(invoker, config.review.clone(), controller).with_sources(sources);
    Ok((workflow, host, config))
}

/// Steady spinner unless output is quiet or machine-readable
pub fn spinner(
    ctx: &AppContext,
    hidden: bool,
    message: &str,
) -> ProgressBar {
    if ctx.quiet || hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[instrument(skip(args, ctx), fields(targets = args.targets.len()))]
pub async fn run(
    args: ProcessArgs,
    ctx: &AppContext,
) -> Result<()> {
    let (workflow, _host, _config) = terminal_workflow(ctx)?;

    let targets = if args.targets.is_empty() {
        vec![workspace_root(ctx)?]
    } else {
        args.targets
    };

    let pb = spinner(ctx, args.json, "Running Rector...");
    let result = workflow.process_targets(&targets, args.dry_run).await;
    pb.finish_and_clear();

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{json}");
    } else {
        print_summary(&result, args.dry_run, ctx);
    }

    match result.error() {
        Some(e) if !result.success() => Err(anyhow::Error::new(e.clone())),
        _ => Ok(()),
    }
}

fn print_summary(
    result: &InvocationResult,
    dry_run: bool,
    ctx: &AppContext,
) {
    if !result.success() {
        return;
    }

    if let Some(diff) = result.diff() {
        println!("{diff}");
    }

    if let Some(e) = result.error() {
        if ctx.no_color {
            eprintln!("warning: {e}");
        } else {
            eprintln!("{}", e.to_string().yellow());
        }
    }

    if ctx.quiet {
        return;
    }

    let n = result.changed_files();
    let line = match (n, dry_run) {
        (0, _) => "No changes".to_string(),
        (n, true) => format!("Rector would change {n} file(s)"),
        (n, false) => format!("Rector changed {n} file(s)"),
    };
    if ctx.no_color {
        println!("{line}");
    } else {
        println!("{}", line.green());
    }

    if let Some(rules) = result.applied_rectors().filter(|r| !r.is_empty()) {
        for rule in rules {
            println!("  {rule}");
        }
    }
}

pub async fn clear_cache(ctx: &AppContext) -> Result<()> {
    let (workflow, _host, _config) = terminal_workflow(ctx)?;

    let pb = spinner(ctx, false, "Clearing Rector cache...");
    let cleared = workflow.clear_cache().await;
    pb.finish_and_clear();

    cleared.map_err(anyhow::Error::new)
}

pub async fn sweep(ctx: &AppContext) -> Result<()> {
    let root = workspace_root(ctx)?;
    let removed = ScratchSpace::new(Some(&root)).sweep().await;

    if !ctx.quiet {
        println!("Removed {removed} scratch file(s)");
    }
    Ok(())
}
