//! Apply/discard confirmation for a proposed diff.
//!
//! A [`ConfirmationController`] owns at most one live session. A session
//! writes the proposed content to a scratch artifact, asks the
//! [`EditorHost`] to show it next to the original, and waits for exactly one
//! decision: an explicit Apply or Discard, or a Discard inferred after the
//! comparison was closed. Every exit path runs the same idempotent cleanup,
//! and starting a new session always finishes the previous one's cleanup
//! before anything new is written.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::patch;
use crate::core::scratch::ScratchSpace;

/// Quiet period after close/focus events before visibility is checked
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Editor-side primitives a session drives
pub trait EditorHost: Send + Sync + 'static {
    /// Show `original` and `proposed` side by side
    fn open_comparison(
        &self,
        original: &Path,
        proposed: &Path,
        title: &str,
    ) -> Result<()>;

    /// Documents currently open anywhere in the editor
    fn open_documents(&self) -> Vec<PathBuf>;

    /// Documents shown in a visible editor
    fn visible_documents(&self) -> Vec<PathBuf>;

    /// Show or hide the Apply / Discard affordances
    fn set_choices_visible(
        &self,
        visible: bool,
    );

    fn notify(
        &self,
        notice: Notice,
    );
}

/// Editor events that may mean the comparison was abandoned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    DocumentClosed(PathBuf),
    VisibleEditorsChanged,
}

/// How a discard came about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardOrigin {
    Explicit,
    ViewClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Discard(DiscardOrigin),
}

/// What a `show_diff` call ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Applied,
    Discarded(DiscardOrigin),
    /// The diff did not apply to the current content; nothing was shown
    Unreconstructable,
    /// A newer session or disposal ended this one first
    Superseded,
}

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Presenting,
    Applying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-facing messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Applied { file: PathBuf },
    Discarded { file: PathBuf },
    DiscardedOnClose { file: PathBuf },
    ReconstructionFailed { file: PathBuf },
    Info(String),
    Warning(String),
    Error(String),
}

impl Notice {
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::Applied { .. }
            | Notice::Discarded { .. }
            | Notice::DiscardedOnClose { .. }
            | Notice::Info(_) => NoticeLevel::Info,
            Notice::ReconstructionFailed { .. } | Notice::Warning(_) => NoticeLevel::Warning,
            Notice::Error(_) => NoticeLevel::Error,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Notice::Applied { file } => write!(f, "Rector changes applied to {}", display_name(file)),
            Notice::Discarded { file } => {
                write!(f, "Rector changes discarded for {}", display_name(file))
            }
            Notice::DiscardedOnClose { file } => write!(
                f,
                "Rector changes for {} discarded because the diff view was closed",
                display_name(file)
            ),
            Notice::ReconstructionFailed { file } => write!(
                f,
                "Could not rebuild Rector's proposal for {}; the file may have changed",
                display_name(file)
            ),
            Notice::Info(msg) | Notice::Warning(msg) | Notice::Error(msg) => f.write_str(msg),
        }
    }
}

fn display_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

/// The one live session's owned resources
struct LiveSession {
    id: u64,
    original: PathBuf,
    scratch: PathBuf,
    // taking the sender claims the decision
    decision: Option<oneshot::Sender<Decision>>,
    applying: bool,
    events: mpsc::UnboundedSender<ViewEvent>,
    settle: Option<JoinHandle<()>>,
}

struct Shared<H: EditorHost> {
    host: Arc<H>,
    scratch: ScratchSpace,
    settle_delay: Duration,
    next_id: AtomicU64,
    live: Mutex<Option<LiveSession>>,
    // held from teardown until the new session is registered and shown
    entry: tokio::sync::Mutex<()>,
}

impl<H: EditorHost> Shared<H> {
    fn live(&self) -> MutexGuard<'_, Option<LiveSession>> {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve session `id`'s decision if nobody has yet.
    fn claim(
        &self,
        id: u64,
        decision: Decision,
    ) -> bool {
        let mut live = self.live();
        let Some(session) = live.as_mut().filter(|s| s.id == id) else {
            return false;
        };
        claim_session(session, decision)
    }

    /// Tear down session `id`; no-op if it is already gone.
    fn cleanup(
        &self,
        id: u64,
    ) {
        let taken = {
            let mut live = self.live();
            if live.as_ref().is_some_and(|s| s.id == id) { live.take() } else { None }
        };
        if let Some(session) = taken {
            self.release(session);
        }
    }

    /// Tear down whatever session is live.
    fn teardown_current(&self) {
        let taken = self.live().take();
        if let Some(session) = taken {
            debug!(id = session.id, "tearing down previous session");
            self.release(session);
        }
    }

    fn release(
        &self,
        mut session: LiveSession,
    ) {
        if let Some(task) = session.settle.take() {
            task.abort();
        }
        // dropping the sender wakes a waiting show_diff with "superseded"
        session.decision = None;
        drop(session.events);
        self.scratch.remove(&session.scratch);
        self.host.set_choices_visible(false);
        debug!(id = session.id, original = %session.original.display(), "session released");
    }
}

fn claim_session(
    session: &mut LiveSession,
    decision: Decision,
) -> bool {
    if session.applying {
        return false;
    }
    let Some(tx) = session.decision.take() else {
        return false;
    };
    if decision == Decision::Apply {
        session.applying = true;
    }
    // the receiver may already be gone; the claim still stands
    let _ = tx.send(decision);
    true
}

/// Cleans up session `id` when dropped, covering cancellation and panics
struct SessionGuard<'a, H: EditorHost> {
    shared: &'a Shared<H>,
    id: u64,
}

impl<H: EditorHost> SessionGuard<'_, H> {
    fn release(&self) {
        self.shared.cleanup(self.id);
    }
}

impl<H: EditorHost> Drop for SessionGuard<'_, H> {
    fn drop(&mut self) {
        self.shared.cleanup(self.id);
    }
}

/// Owner of the single live confirmation session
pub struct ConfirmationController<H: EditorHost> {
    shared: Arc<Shared<H>>,
}

impl<H: EditorHost> Clone for ConfirmationController<H> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<H: EditorHost> ConfirmationController<H> {
    pub fn new(
        host: Arc<H>,
        scratch: ScratchSpace,
    ) -> Self {
        Self::with_settle_delay(host, scratch, SETTLE_DELAY)
    }

    pub fn with_settle_delay(
        host: Arc<H>,
        scratch: ScratchSpace,
        settle_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                host,
                scratch,
                settle_delay,
                next_id: AtomicU64::new(1),
                live: Mutex::new(None),
                entry: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.shared.host
    }

    pub fn state(&self) -> SessionState {
        match self.shared.live().as_ref() {
            None => SessionState::Idle,
            Some(s) if s.applying => SessionState::Applying,
            Some(_) => SessionState::Presenting,
        }
    }

    /// Scratch artifact of the live session, if any
    pub fn scratch_path(&self) -> Option<PathBuf> {
        self.shared
            .live()
            .as_ref()
            .map(|s| s.scratch.clone())
    }

    /// Present `diff` against `original` and wait for a decision.
    ///
    /// `on_apply` runs only on an explicit Apply; its error is returned after
    /// the session has been cleaned up.
    #[instrument(skip(self, diff, on_apply), fields(original = %original.display()))]
    pub async fn show_diff<F, Fut>(
        &self,
        original: &Path,
        diff: &str,
        on_apply: F,
    ) -> Result<SessionOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let shared = &*self.shared;
        let entry = shared.entry.lock().await;
        shared.teardown_current();

        let text = tokio::fs::read_to_string(original)
            .await
            .with_context(|| format!("read original: {}", original.display()))?;

        let Some(mut proposed) = patch::apply_to_text(&text, diff) else {
            warn!("diff does not apply to current content");
            shared.host.notify(Notice::ReconstructionFailed { file: original.to_path_buf() });
            return Ok(SessionOutcome::Unreconstructable);
        };
        // keep the original's final newline so the comparison shows no phantom change
        if text.ends_with('\n') && !proposed.is_empty() {
            proposed.push('\n');
        }

        let scratch_path = shared.scratch.path_for(original);
        shared.scratch.write(&scratch_path, &proposed).await?;

        let (decision_tx, decision_rx) = oneshot::channel();
        let id = self.register(original, &scratch_path, decision_tx);
        let guard = SessionGuard { shared, id };

        let title = format!("{} (original ↔ Rector proposal)", display_name(original));
        if let Err(e) = shared.host.open_comparison(original, &scratch_path, &title) {
            guard.release();
            return Err(e.context("open comparison view"));
        }
        shared.host.set_choices_visible(true);
        drop(entry);
        info!(id, "waiting for apply/discard decision");

        let Ok(decision) = decision_rx.await else {
            debug!(id, "session ended before a decision");
            return Ok(SessionOutcome::Superseded);
        };

        match decision {
            Decision::Apply => {
                let result = on_apply().await;
                if result.is_ok() {
                    shared.host.notify(Notice::Applied { file: original.to_path_buf() });
                }
                guard.release();
                result.map(|()| SessionOutcome::Applied)
            }
            Decision::Discard(origin) => {
                guard.release();
                let notice = match origin {
                    DiscardOrigin::Explicit => Notice::Discarded { file: original.to_path_buf() },
                    DiscardOrigin::ViewClosed => {
                        Notice::DiscardedOnClose { file: original.to_path_buf() }
                    }
                };
                shared.host.notify(notice);
                Ok(SessionOutcome::Discarded(origin))
            }
        }
    }

    fn register(
        &self,
        original: &Path,
        scratch: &Path,
        decision: oneshot::Sender<Decision>,
    ) -> u64 {
        let id = self
            .shared
            .next_id
            .fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let settle = tokio::spawn(settle_loop(
            Arc::clone(&self.shared),
            id,
            original.to_path_buf(),
            scratch.to_path_buf(),
            events_rx,
        ));

        let session = LiveSession {
            id,
            original: original.to_path_buf(),
            scratch: scratch.to_path_buf(),
            decision: Some(decision),
            applying: false,
            events: events_tx,
            settle: Some(settle),
        };

        // entry lock is held and teardown ran, so nothing is live here
        let previous = self.shared.live().replace(session);
        if let Some(previous) = previous {
            warn!(id = previous.id, "session registered over a live one");
            self.shared.release(previous);
        }
        id
    }

    /// Explicit Apply; false if there is nothing to apply or one is running.
    pub fn apply(&self) -> bool {
        let mut live = self.shared.live();
        let claimed = live
            .as_mut()
            .is_some_and(|s| claim_session(s, Decision::Apply));
        if claimed {
            debug!("apply claimed");
        }
        claimed
    }

    /// Explicit Discard; false if there is no pending decision.
    pub fn discard(&self) -> bool {
        let mut live = self.shared.live();
        live.as_mut()
            .is_some_and(|s| claim_session(s, Decision::Discard(DiscardOrigin::Explicit)))
    }

    /// Feed a close/focus event to the live session's settle step.
    pub fn view_event(
        &self,
        event: ViewEvent,
    ) {
        if let Some(session) = self.shared.live().as_ref() {
            let _ = session.events.send(event);
        }
    }

    /// End any live session and sweep leftover artifacts from earlier crashes.
    pub async fn dispose(&self) -> usize {
        let _entry = self.shared.entry.lock().await;
        self.shared.teardown_current();
        self.shared.scratch.sweep().await
    }
}

/// Debounce close/focus events, then discard if the comparison is gone.
async fn settle_loop<H: EditorHost>(
    shared: Arc<Shared<H>>,
    id: u64,
    original: PathBuf,
    scratch: PathBuf,
    mut events: mpsc::UnboundedReceiver<ViewEvent>,
) {
    while events.recv().await.is_some() {
        // every further event restarts the window
        loop {
            tokio::select! {
                next = events.recv() => {
                    if next.is_none() {
                        return;
                    }
                }
                _ = tokio::time::sleep(shared.settle_delay) => break,
            }
        }

        if comparison_abandoned(&*shared.host, &original, &scratch) {
            debug!(id, "comparison closed, inferring discard");
            shared.claim(id, Decision::Discard(DiscardOrigin::ViewClosed));
            return;
        }
    }
}

/// Both documents closed, or neither visible any more.
pub fn comparison_abandoned<H: EditorHost + ?Sized>(
    host: &H,
    original: &Path,
    scratch: &Path,
) -> bool {
    let open = host.open_documents();
    let both_closed = !contains(&open, original) && !contains(&open, scratch);

    let visible = host.visible_documents();
    let none_visible = !contains(&visible, original) && !contains(&visible, scratch);

    both_closed || none_visible
}

fn contains(
    docs: &[PathBuf],
    path: &Path,
) -> bool {
    docs.iter().any(|d| d == path)
}
