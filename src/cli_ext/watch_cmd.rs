//! `rlens watch`: run the on-save workflow for modified source files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::cli::{AppContext, WatchArgs};
use crate::cli_ext::process_cmd::{terminal_workflow, workspace_root};
use crate::cli_ext::review_cmd::{KeyRouting, drive_with_keys};
use crate::core::scratch::WORKSPACE_DIR;
use crate::core::session::{EditorHost, Notice};
use crate::core::workflow::{ReviewOutcome, SaveOutcome};
use crate::host::terminal::spawn_key_reader;

/// Per-path debounce; also swallows the write Rector itself makes
#[derive(Debug)]
pub struct SaveDebounce {
    window: Duration,
    last: HashMap<PathBuf, Instant>,
}

impl SaveDebounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: HashMap::new() }
    }

    /// True if `path` has not been handled within the window
    pub fn ready(
        &self,
        path: &Path,
        now: Instant,
    ) -> bool {
        match self.last.get(path) {
            Some(at) => now.duration_since(*at) >= self.window,
            None => true,
        }
    }

    pub fn mark(
        &mut self,
        path: &Path,
        now: Instant,
    ) {
        self.last.insert(path.to_path_buf(), now);
    }
}

/// Paths from a write event that are candidates for the on-save workflow
pub fn saved_paths(event: &Event) -> Vec<PathBuf> {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|p| !is_scratch(p))
        .cloned()
        .collect()
}

fn is_scratch(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == WORKSPACE_DIR)
}

#[instrument(skip(args, ctx))]
pub async fn run(
    args: WatchArgs,
    ctx: &AppContext,
) -> Result<()> {
    let (workflow, host, config) = terminal_workflow(ctx)?;
    let dir = match args.dir {
        Some(d) => d,
        None => workspace_root(ctx)?,
    };
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    if !config.review.enable_autofix {
        host.notify(Notice::Warning(
            "review.enable_autofix is off; saved files will be ignored".to_string(),
        ));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!(error = %e, "watch error"),
        },
        notify::Config::default(),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(&dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;

    let swept = workflow.dispose().await;
    debug!(swept, "startup sweep");

    host.notify(Notice::Info(format!("Watching {} (Ctrl+C to stop)", dir.display())));

    let controller = workflow.controller().clone();
    let mut keys = spawn_key_reader();
    let mut debounce = SaveDebounce::new(Duration::from_millis(config.watch.debounce_ms));

    loop {
        let event = tokio::select! {
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        for path in saved_paths(&event) {
            if !debounce.ready(&path, Instant::now()) || !workflow.is_source(&path) {
                continue;
            }
            info!(path = %path.display(), "file saved");

            let outcome = drive_with_keys(
                workflow.on_save(&path),
                &controller,
                &mut keys,
                KeyRouting::LiveOnly,
            )
            .await;
            // Rector's own write lands inside this window
            debounce.mark(&path, Instant::now());

            match outcome {
                Ok(SaveOutcome::Reviewed(ReviewOutcome::Failed(e))) => {
                    host.notify(Notice::Error(e.to_string()))
                }
                Ok(other) => debug!(?other, "save handled"),
                Err(e) => host.notify(Notice::Error(format!("{e:#}"))),
            }
        }
    }

    workflow.dispose().await;
    host.notify(Notice::Info("Watch mode stopped".to_string()));
    Ok(())
}
