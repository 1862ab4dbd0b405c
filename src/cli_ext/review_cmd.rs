//! `rlens review`: interactive apply/discard in the terminal.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::cli::{AppContext, ReviewArgs};
use crate::cli_ext::process_cmd::{spinner, terminal_workflow};
use crate::core::session::{
    ConfirmationController, EditorHost, Notice, SessionOutcome, SessionState, ViewEvent,
};
use crate::core::workflow::ReviewOutcome;
use crate::host::terminal::{Key, TerminalHost, spawn_key_reader};

const KEY_POLL: Duration = Duration::from_millis(50);

/// Route one key press to the live session.
pub fn dispatch_key<H: EditorHost>(
    key: Key,
    controller: &ConfirmationController<H>,
    close_view: impl FnOnce() -> Vec<std::path::PathBuf>,
) {
    match key {
        Key::Apply => {
            if !controller.apply() {
                debug!("apply ignored: no pending decision");
            }
        }
        Key::Discard => {
            controller.discard();
        }
        Key::Close => {
            for doc in close_view() {
                controller.view_event(ViewEvent::DocumentClosed(doc));
            }
            controller.view_event(ViewEvent::VisibleEditorsChanged);
        }
        Key::Unknown => {
            controller
                .host()
                .notify(Notice::Info("Type a, d or q".to_string()));
        }
    }
}

/// Which queued keys a session may receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRouting {
    /// Keys typed before the first session appears are kept for it
    TypeAhead,
    /// Only keys typed while a session is presenting reach it
    LiveOnly,
}

/// Drop every key already queued; returns how many were dropped.
pub fn discard_pending_keys(keys: &mut mpsc::UnboundedReceiver<Key>) -> usize {
    let mut dropped = 0;
    while let Ok(key) = keys.try_recv() {
        debug!(?key, "dropping key typed outside a session");
        dropped += 1;
    }
    dropped
}

/// Poll `work` while feeding keys into the session it may open.
///
/// A key only ever decides the session it was typed for: once a session has
/// been presented, keys typed while none is presenting are dropped.
pub async fn drive_with_keys<T>(
    work: impl Future<Output = T>,
    controller: &ConfirmationController<TerminalHost>,
    keys: &mut mpsc::UnboundedReceiver<Key>,
    routing: KeyRouting,
) -> T {
    tokio::pin!(work);
    let mut keys_open = true;
    let mut presented = false;
    let mut was_presenting = false;
    loop {
        let presenting = controller.state() == SessionState::Presenting;
        let hold = routing == KeyRouting::TypeAhead && !presented;
        if keys_open && !hold && (!presenting || !was_presenting) {
            discard_pending_keys(keys);
        }
        presented |= presenting;
        was_presenting = presenting;

        tokio::select! {
            out = &mut work => {
                discard_pending_keys(keys);
                return out;
            }
            _ = tokio::time::sleep(KEY_POLL), if keys_open && !presenting => {}
            key = keys.recv(), if keys_open && presenting => {
                // end of input closes the view
                let key = key.unwrap_or(Key::Close);
                keys_open = key != Key::Close || !keys.is_closed();
                let host = controller.host();
                dispatch_key(key, controller, || host.close_view());
            }
        }
    }
}

#[instrument(skip(args, ctx), fields(file = %args.file.display()))]
pub async fn run(
    args: ReviewArgs,
    ctx: &AppContext,
) -> Result<()> {
    if !args.file.is_file() {
        anyhow::bail!("Not a file: {}", args.file.display());
    }
    let file = dunce::canonicalize(&args.file)?;

    let (workflow, host, _config) = terminal_workflow(ctx)?;
    let controller = workflow.controller().clone();

    host.show_busy(spinner(ctx, false, "Running Rector in dry-run mode..."));
    let mut keys = spawn_key_reader();
    let outcome = drive_with_keys(
        workflow.review_file(&file),
        &controller,
        &mut keys,
        KeyRouting::TypeAhead,
    )
    .await;
    host.clear_busy();
    workflow.dispose().await;

    match outcome? {
        ReviewOutcome::Failed(e) => Err(anyhow::Error::new(e)),
        ReviewOutcome::Session(SessionOutcome::Unreconstructable) => {
            anyhow::bail!("Rector's diff could not be applied to {}", file.display())
        }
        _ => Ok(()),
    }
}
