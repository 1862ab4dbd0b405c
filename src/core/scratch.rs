//! Scratch artifacts holding proposed file content.
//!
//! One artifact per original file stem lives under `<workspace>/.rector-tmp/`
//! (or `<tmp>/rector-vscode/` without a workspace). Writes go through a
//! same-directory temp file and are renamed into place, so a reader never
//! sees half-written content.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Directory name used inside a workspace
pub const WORKSPACE_DIR: &str = ".rector-tmp";

/// Directory name used under the system temp dir
pub const SYSTEM_DIR: &str = "rector-vscode";

/// Suffix every artifact carries; also the sweep pattern
pub const SUFFIX: &str = ".rector.tmp.php";

/// Location rules for scratch artifacts
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    pub fn new(workspace_root: Option<&Path>) -> Self {
        let dir = match workspace_root {
            Some(root) => root.join(WORKSPACE_DIR),
            None => std::env::temp_dir().join(SYSTEM_DIR),
        };
        Self { dir }
    }

    /// Use an explicit directory
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact path for an original file: `<stem>.rector.tmp.php`
    pub fn path_for(
        &self,
        original: &Path,
    ) -> PathBuf {
        let stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "untitled".to_string());
        self.dir.join(format!("{stem}{SUFFIX}"))
    }

    /// Write `content` atomically, creating the directory on demand.
    pub async fn write(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create scratch dir: {}", self.dir.display()))?;

        let dir = self.dir.clone();
        let path_owned = path.to_path_buf();
        let body = content.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .with_context(|| format!("create temp file in {}", dir.display()))?;
            tmp.write_all(body.as_bytes())
                .context("write scratch content")?;
            tmp.persist(&path_owned)
                .with_context(|| format!("persist scratch: {}", path_owned.display()))?;
            Ok(())
        })
        .await
        .context("scratch writer task panicked")??;

        debug!(path = %path.display(), bytes = content.len(), "scratch artifact written");
        Ok(())
    }

    /// Delete one artifact; missing files and errors are ignored.
    ///
    /// Synchronous so it can run from drop guards.
    pub fn remove(
        &self,
        path: &Path,
    ) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "scratch artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove scratch artifact"),
        }
    }

    /// Delete every artifact matching the naming pattern; returns the count.
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(_) => return 0,
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "scratch sweep aborted");
                    break;
                }
            };

            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(SUFFIX) {
                continue;
            }
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, dir = %self.dir.display(), "swept leftover scratch artifacts");
        }
        removed
    }
}
