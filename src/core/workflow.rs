//! Preview, confirm, and apply.
//!
//! Ties the invoker to the confirmation controller: a single file is run in
//! dry-run mode first and its diff goes through a confirmation session; the
//! Apply choice re-runs Rector for real. Multi-target runs skip the preview
//! since there is no single file to compare against.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, instrument};

use crate::core::invoke::{InvocationError, InvocationResult, Invoker};
use crate::core::session::{ConfirmationController, EditorHost, Notice, SessionOutcome};
use crate::infra::config::ReviewConfig;

/// How one file review ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Preview run failed; nothing was shown or reported
    Failed(InvocationError),
    /// Rector had nothing to change
    NoChanges,
    /// Changes were reported but no per-file diff came back
    NoDiff { changed_files: usize },
    /// A confirmation session ran
    Session(SessionOutcome),
}

/// What a save event led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Autofix disabled or the file is not a source file
    Skipped,
    Reviewed(ReviewOutcome),
    Applied(InvocationResult),
}

pub struct Workflow<H: EditorHost> {
    invoker: Invoker,
    review: ReviewConfig,
    controller: ConfirmationController<H>,
    sources: GlobSet,
}

impl<H: EditorHost> Workflow<H> {
    pub fn new(
        invoker: Invoker,
        review: ReviewConfig,
        controller: ConfirmationController<H>,
    ) -> Self {
        Self { invoker, review, controller, sources: php_sources() }
    }

    /// Replace the patterns that decide which saved files trigger a run
    pub fn with_sources(
        mut self,
        sources: GlobSet,
    ) -> Self {
        self.sources = sources;
        self
    }

    pub fn controller(&self) -> &ConfirmationController<H> {
        &self.controller
    }

    fn notify(
        &self,
        notice: Notice,
    ) {
        self.controller.host().notify(notice);
    }

    /// Dry-run one file and confirm its diff before applying.
    #[instrument(skip(self), fields(file = %file.display()))]
    pub async fn review_file(
        &self,
        file: &Path,
    ) -> Result<ReviewOutcome> {
        let target = [file.to_path_buf()];
        let preview = self.invoker.process(&target, true).await;

        if !preview.success() {
            let err = preview.error().cloned().unwrap_or(InvocationError::ParseFailure);
            return Ok(ReviewOutcome::Failed(err));
        }

        if let Some(e) = preview.error() {
            self.notify(Notice::Warning(e.to_string()));
        }

        if preview.changed_files() == 0 {
            self.notify(Notice::Info(format!(
                "Rector found nothing to change in {}",
                file.display()
            )));
            return Ok(ReviewOutcome::NoChanges);
        }

        let Some(diff) = preview.diff() else {
            self.notify(Notice::Warning(format!(
                "Rector reported {} change(s) but returned no diff",
                preview.changed_files()
            )));
            return Ok(ReviewOutcome::NoDiff { changed_files: preview.changed_files() });
        };

        if let Some(rules) = preview.applied_rectors() {
            debug!(rules = ?rules, "rules proposed changes");
        }

        let invoker = &self.invoker;
        let outcome = self
            .controller
            .show_diff(file, diff, || async move {
                let applied = invoker.process(&target, false).await;
                match applied.error() {
                    Some(e) if !applied.success() => anyhow::bail!("{e}"),
                    _ => Ok(()),
                }
            })
            .await?;

        info!(?outcome, "review finished");
        Ok(ReviewOutcome::Session(outcome))
    }

    /// Run Rector on any number of targets without confirmation.
    ///
    /// Failures are left to the caller to report.
    pub async fn process_targets(
        &self,
        targets: &[PathBuf],
        preview: bool,
    ) -> InvocationResult {
        self.invoker.process(targets, preview).await
    }

    /// Whether a saved path should trigger the on-save workflow
    pub fn is_source(
        &self,
        path: &Path,
    ) -> bool {
        self.sources.is_match(path)
    }

    /// React to a saved file according to the review settings.
    #[instrument(skip(self), fields(file = %file.display()))]
    pub async fn on_save(
        &self,
        file: &Path,
    ) -> Result<SaveOutcome> {
        if !self.review.enable_autofix || !self.is_source(file) {
            return Ok(SaveOutcome::Skipped);
        }

        if self.review.show_diff_on_save {
            return self.review_file(file).await.map(SaveOutcome::Reviewed);
        }

        let result = self.process_targets(&[file.to_path_buf()], false).await;
        match result.error() {
            Some(e) if !result.success() => self.notify(Notice::Error(e.to_string())),
            Some(e) => self.notify(Notice::Warning(e.to_string())),
            None => {}
        }
        if result.success() && result.changed_files() > 0 {
            self.notify(Notice::Applied { file: file.to_path_buf() });
        }
        Ok(SaveOutcome::Applied(result))
    }

    /// Best-effort cache clear; only a missing executable is an error.
    pub async fn clear_cache(&self) -> Result<(), InvocationError> {
        self.invoker.clear_cache().await?;
        self.notify(Notice::Info("Rector cache cleared".to_string()));
        Ok(())
    }

    /// End any open session and sweep stale artifacts.
    pub async fn dispose(&self) -> usize {
        self.controller.dispose().await
    }
}

/// Build a matcher from glob patterns.
pub fn source_matcher<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p.as_ref())?);
    }
    Ok(builder.build()?)
}

fn php_sources() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    if let Ok(glob) = Glob::new("**/*.php") {
        builder.add(glob);
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}
