//! Shared fixtures: fake Rector executables and a recording editor host.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rector_lens::core::session::{EditorHost, Notice};

/// Write an executable `/bin/sh` script named `rector` into `dir`.
#[cfg(unix)]
pub fn fake_rector(
    dir: &Path,
    body: &str,
) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("rector");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Poll `cond` until it holds; panics after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Default)]
pub struct HostState {
    pub open: Vec<PathBuf>,
    pub visible: Vec<PathBuf>,
    pub choices_visible: bool,
    pub notices: Vec<Notice>,
    /// (original, scratch, scratch content at open time)
    pub comparisons: Vec<(PathBuf, PathBuf, String)>,
    /// Paths checked for existence whenever a comparison opens
    pub watch_missing: Vec<PathBuf>,
    pub missing_at_open: Vec<bool>,
}

/// Editor host double that records everything it is asked to do
#[derive(Default)]
pub struct FakeHost {
    pub state: Mutex<HostState>,
}

impl FakeHost {
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut HostState) -> R,
    ) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.with(|s| s.notices.clone())
    }

    /// User closes every document of the comparison
    pub fn close_all(&self) -> Vec<PathBuf> {
        self.with(|s| {
            s.visible.clear();
            std::mem::take(&mut s.open)
        })
    }

    /// Focus moves elsewhere while the documents stay open
    pub fn hide_all(&self) {
        self.with(|s| s.visible = vec![PathBuf::from("/elsewhere/Other.php")]);
    }
}

impl EditorHost for FakeHost {
    fn open_comparison(
        &self,
        original: &Path,
        proposed: &Path,
        _title: &str,
    ) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(proposed)?;
        self.with(|s| {
            s.open = vec![original.to_path_buf(), proposed.to_path_buf()];
            s.visible = s.open.clone();
            s.comparisons
                .push((original.to_path_buf(), proposed.to_path_buf(), content));
            let missing = s.watch_missing.iter().all(|p| !p.exists());
            s.missing_at_open.push(missing);
        });
        Ok(())
    }

    fn open_documents(&self) -> Vec<PathBuf> {
        self.with(|s| s.open.clone())
    }

    fn visible_documents(&self) -> Vec<PathBuf> {
        self.with(|s| s.visible.clone())
    }

    fn set_choices_visible(
        &self,
        visible: bool,
    ) {
        self.with(|s| s.choices_visible = visible);
    }

    fn notify(
        &self,
        notice: Notice,
    ) {
        self.with(|s| s.notices.push(notice));
    }
}
