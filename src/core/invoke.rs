//! Rector process invocation
//!
//! Builds the command line, runs Rector with a timeout, and folds every
//! expected failure (missing executable, missing config, timeout, bad
//! output) into an [`InvocationResult`]. Rector exits non-zero when it finds
//! changes, so a failing exit status is only a failure once its stdout has
//! been given the chance to parse as a normal report.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::core::output::{self, ParsedOutput};
use crate::infra::config::RectorConfig;
use crate::infra::paths::{discover_config, discovery_start, normalize_lexically, resolve_user_path};

/// Subcommand every invocation starts with
pub const SUBCOMMAND: &str = "process";

/// Flags that are always present
pub const FIXED_FLAGS: [&str; 2] = ["--output-format=json", "--no-progress-bar"];

/// Expected ways an invocation can fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    #[error("Rector config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Rector executable not found: {}. Set rector.executable or install Rector.", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Rector timed out after {0} ms")]
    Timeout(u64),

    #[error("Failed to parse Rector output")]
    ParseFailure,

    #[error("{0}")]
    ToolReported(String),

    #[error("Rector failed: {0}")]
    Failed(String),

    #[error("Failed to run Rector: {0}")]
    Spawn(String),

    #[error("No files or directories to process")]
    NoTargets,
}

/// Everything needed to run Rector once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub targets: Vec<PathBuf>,
    pub preview: bool,
    pub executable: PathBuf,
    pub config_path: Option<PathBuf>,
    pub clear_cache: bool,
    pub timeout: Duration,
    pub workspace_root: Option<PathBuf>,
}

/// Normalized outcome of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    success: bool,
    changed_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied_rectors: Option<Vec<String>>,
    #[serde(serialize_with = "error_message", skip_serializing_if = "Option::is_none")]
    error: Option<InvocationError>,
}

fn error_message<S: Serializer>(
    error: &Option<InvocationError>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl InvocationResult {
    /// A failed invocation; nothing changed
    pub fn failed(error: InvocationError) -> Self {
        Self {
            success: false,
            changed_files: 0,
            diff: None,
            applied_rectors: None,
            error: Some(error),
        }
    }

    /// Map a parsed report onto the result shape.
    ///
    /// The per-file record is only surfaced for single-target runs; the diff
    /// itself only for previews.
    pub fn from_output(
        parsed: &ParsedOutput,
        single_target: bool,
        preview: bool,
    ) -> Self {
        let changed_files = parsed.totals.changed_files;
        let reported = parsed.error_summary().map(InvocationError::ToolReported);

        if changed_files == 0 {
            if let Some(err) = reported {
                return Self::failed(err);
            }
            return Self {
                success: true,
                changed_files: 0,
                diff: None,
                applied_rectors: None,
                error: None,
            };
        }

        let first = parsed.first_diff().filter(|_| single_target);
        let diff = first
            .filter(|_| preview)
            .map(|d| d.diff.clone())
            .filter(|d| !d.trim().is_empty());
        let applied_rectors = first.map(|d| d.applied_rectors.clone());

        Self {
            success: true,
            changed_files,
            diff,
            applied_rectors,
            error: reported,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn changed_files(&self) -> usize {
        self.changed_files
    }

    pub fn diff(&self) -> Option<&str> {
        self.diff.as_deref()
    }

    pub fn applied_rectors(&self) -> Option<&[String]> {
        self.applied_rectors.as_deref()
    }

    pub fn error(&self) -> Option<&InvocationError> {
        self.error.as_ref()
    }
}

/// Argument vector, in the fixed order Rector is always called with.
pub fn build_args(req: &InvocationRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(req.targets.len() + 6);
    args.push(SUBCOMMAND.into());
    args.extend(req.targets.iter().map(|t| t.as_os_str().to_os_string()));

    if req.preview {
        args.push("--dry-run".into());
    }

    args.extend(FIXED_FLAGS.iter().map(OsString::from));

    if req.clear_cache {
        args.push("--clear-cache".into());
    }

    if let Some(config) = &req.config_path {
        let mut flag = OsString::from("--config=");
        flag.push(config.as_os_str());
        args.push(flag);
    }

    args
}

/// Arguments for the standalone cache-clear run
pub fn cache_clear_args(config_path: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![SUBCOMMAND.into(), "--dry-run".into(), "--clear-cache".into()];
    args.extend(FIXED_FLAGS.iter().map(OsString::from));
    if let Some(config) = config_path {
        let mut flag = OsString::from("--config=");
        flag.push(config.as_os_str());
        args.push(flag);
    }
    args
}

/// Directory the process runs in.
///
/// One target: the target itself when it is a directory, else its parent.
/// Several: the workspace root, else a directory first target, else our cwd.
pub fn working_dir(req: &InvocationRequest) -> PathBuf {
    let Some(first) = req.targets.first() else {
        return fallback_cwd(req.workspace_root.as_deref());
    };

    if req.targets.len() == 1 {
        if first.is_dir() {
            return first.clone();
        }
        return match first.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => fallback_cwd(req.workspace_root.as_deref()),
        };
    }

    if let Some(root) = &req.workspace_root {
        return root.clone();
    }
    if first.is_dir() {
        return first.clone();
    }
    fallback_cwd(None)
}

fn fallback_cwd(workspace_root: Option<&Path>) -> PathBuf {
    if let Some(root) = workspace_root {
        return root.to_path_buf();
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Shell-like rendering for logs
pub fn display_command(
    executable: &Path,
    args: &[OsString],
) -> String {
    let mut out = executable.display().to_string();
    for a in args {
        out.push(' ');
        out.push_str(&a.to_string_lossy());
    }
    out
}

/// Settings-bound entry point that builds requests and runs them
#[derive(Debug, Clone)]
pub struct Invoker {
    settings: RectorConfig,
    workspace_root: Option<PathBuf>,
}

impl Invoker {
    pub fn new(
        settings: RectorConfig,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        Self { settings, workspace_root }
    }

    pub fn executable(&self) -> PathBuf {
        resolve_user_path(&self.settings.executable, self.workspace_root.as_deref())
    }

    /// Resolve the explicit config path, or discover one from `start`.
    fn config_for(
        &self,
        start: Option<&Path>,
    ) -> Result<Option<PathBuf>, InvocationError> {
        if let Some(raw) = self.settings.explicit_config() {
            let resolved = resolve_user_path(raw, self.workspace_root.as_deref());
            if !resolved.exists() {
                return Err(InvocationError::ConfigNotFound(resolved));
            }
            return Ok(Some(resolved));
        }

        Ok(start.and_then(discover_config))
    }

    /// Build a request for `targets`; fails on configuration errors only.
    pub fn request(
        &self,
        targets: &[PathBuf],
        preview: bool,
    ) -> Result<InvocationRequest, InvocationError> {
        if targets.is_empty() {
            return Err(InvocationError::NoTargets);
        }

        let targets: Vec<PathBuf> = targets.iter().map(|t| absolutize(t)).collect();
        let start = discovery_start(&targets[0]);
        let config_path = self.config_for(Some(&start))?;

        Ok(InvocationRequest {
            targets,
            preview,
            executable: self.executable(),
            config_path,
            clear_cache: self.settings.clear_cache,
            timeout: self.settings.timeout(),
            workspace_root: self.workspace_root.clone(),
        })
    }

    /// Build and run; configuration errors come back as failed results.
    #[instrument(skip(self), fields(targets = targets.len()))]
    pub async fn process(
        &self,
        targets: &[PathBuf],
        preview: bool,
    ) -> InvocationResult {
        match self.request(targets, preview) {
            Ok(req) => run(&req).await,
            Err(e) => {
                warn!(error = %e, "invocation rejected before spawn");
                InvocationResult::failed(e)
            }
        }
    }

    /// Best-effort cache clear; only a missing executable is reported.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<(), InvocationError> {
        let start = self
            .workspace_root
            .clone()
            .unwrap_or_else(|| fallback_cwd(None));

        let config_path = match self.config_for(Some(&start)) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "skipping cache clear");
                return Ok(());
            }
        };

        let executable = self.executable();
        let args = cache_clear_args(config_path.as_deref());
        debug!(command = %display_command(&executable, &args), "clearing rector cache");

        let output = execute(&executable, &args, &start, self.settings.timeout()).await;
        match output {
            Ok(out) if out.status.success() => {
                info!("rector cache cleared");
                Ok(())
            }
            Ok(out) => {
                warn!(status = %out.status, "cache clear exited unsuccessfully");
                Ok(())
            }
            Err(e @ InvocationError::ExecutableNotFound(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "cache clear failed");
                Ok(())
            }
        }
    }
}

fn absolutize(p: &Path) -> PathBuf {
    if p.is_absolute() {
        return normalize_lexically(p);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_lexically(&cwd.join(p)),
        Err(_) => p.to_path_buf(),
    }
}

/// Run one request to completion.
#[instrument(skip(req), fields(preview = req.preview))]
pub async fn run(req: &InvocationRequest) -> InvocationResult {
    let args = build_args(req);
    let cwd = working_dir(req);
    debug!(command = %display_command(&req.executable, &args), cwd = %cwd.display(), "running rector");

    let output = match execute(&req.executable, &args, &cwd, req.timeout).await {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, "rector did not complete");
            return InvocationResult::failed(e);
        }
    };

    let result = interpret(req, &output);
    match result.error() {
        Some(e) if !result.success() => warn!(error = %e, "rector invocation failed"),
        _ => info!(changed = result.changed_files(), "rector invocation finished"),
    }
    result
}

/// Spawn, buffer all output, and enforce the timeout.
async fn execute(
    executable: &Path,
    args: &[OsString],
    cwd: &Path,
    timeout: Duration,
) -> Result<std::process::Output, InvocationError> {
    if !cwd.is_dir() {
        return Err(InvocationError::Spawn(format!(
            "working directory does not exist: {}",
            cwd.display()
        )));
    }

    let mut cmd = Command::new(executable);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => InvocationError::ExecutableNotFound(executable.to_path_buf()),
        _ => InvocationError::Spawn(e.to_string()),
    })?;

    // dropping the wait future drops the child, which kills it
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(InvocationError::Spawn(e.to_string())),
        Err(_) => Err(InvocationError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Fold exit status and stdout into a result.
fn interpret(
    req: &InvocationRequest,
    output: &std::process::Output,
) -> InvocationResult {
    let single = req.targets.len() == 1;
    let stdout = String::from_utf8_lossy(&output.stdout);

    if output.status.success() {
        return match output::parse(&stdout) {
            Some(parsed) => InvocationResult::from_output(&parsed, single, req.preview),
            None => InvocationResult::failed(InvocationError::ParseFailure),
        };
    }

    // non-zero exit also means "changes found"
    if !stdout.trim().is_empty() {
        if let Some(parsed) = output::parse(&stdout) {
            debug!(status = %output.status, "non-zero exit carried a valid report");
            return InvocationResult::from_output(&parsed, single, req.preview);
        }
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("exited with {}", output.status));
    InvocationResult::failed(InvocationError::Failed(detail))
}
