//! Unified diff reconstruction
//!
//! Rebuilds the proposed file content from the original lines and the
//! per-file unified diff Rector prints in dry-run mode. The walk is a single
//! forward pass: hunks must appear in order, and every context or removed
//! line must match the original at the cursor. Anything else fails the whole
//! reconstruction rather than producing partial content.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// `@@ -old_start[,old_count] +new_start[,new_count] @@`
static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
});

/// A hunk header's ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize, // 1-based line number in old file
    pub old_count: usize, // Number of lines in old version
    pub new_start: usize, // 1-based line number in new file
    pub new_count: usize, // Number of lines in new version
}

/// A line in a hunk with its change type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine<'a> {
    Context(&'a str), // Unchanged line (starts with ' ')
    Remove(&'a str),  // Removed line (starts with '-')
    Add(&'a str),     // Added line (starts with '+')
    Blank,            // Empty line; context only if the original is blank too
}

/// Why a diff could not be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconstructError {
    #[error("malformed hunk header: {0}")]
    BadHeader(String),
    #[error("hunk at line {old_start} starts before line {cursor} already consumed")]
    OutOfOrder { old_start: usize, cursor: usize },
    #[error("diff references line {0} past the end of the original")]
    PastEnd(usize),
    #[error("line {line} does not match the original")]
    Mismatch { line: usize },
    #[error("unrecognized line inside hunk: {0:?}")]
    Unrecognized(String),
}

impl HunkHeader {
    /// Parse a header line; `None` if the line is not a hunk header
    pub fn parse(line: &str) -> Option<Self> {
        let caps = HUNK_HEADER.captures(line)?;
        let num = |i: usize, default: usize| -> Option<usize> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(default),
            }
        };

        Some(Self {
            old_start: num(1, 0)?,
            old_count: num(2, 1)?,
            new_start: num(3, 0)?,
            new_count: num(4, 1)?,
        })
    }

    /// Number of original lines that precede this hunk's first old line
    fn lines_before(&self) -> usize {
        // an empty old range names the line after which the insertion lands
        if self.old_count == 0 {
            self.old_start
        } else {
            self.old_start.saturating_sub(1)
        }
    }
}

impl<'a> HunkLine<'a> {
    fn classify(line: &'a str) -> Option<Self> {
        if line.is_empty() {
            return Some(Self::Blank);
        }
        match line.as_bytes()[0] {
            b' ' => Some(Self::Context(&line[1..])),
            b'-' => Some(Self::Remove(&line[1..])),
            b'+' => Some(Self::Add(&line[1..])),
            _ => None,
        }
    }
}

/// Apply `diff` to `original`, returning the new content joined with `\n`.
///
/// `None` on any malformed or mismatching input.
pub fn apply<S: AsRef<str>>(
    original: &[S],
    diff: &str,
) -> Option<String> {
    match try_apply(original, diff) {
        Ok(lines) => Some(lines.join("\n")),
        Err(e) => {
            debug!(error = %e, "diff reconstruction failed");
            None
        }
    }
}

/// Convenience for whole-file text; lines are split like `str::lines`.
pub fn apply_to_text(
    original: &str,
    diff: &str,
) -> Option<String> {
    let lines: Vec<&str> = original.lines().collect();
    apply(&lines, diff)
}

/// Same walk as [`apply`], with the failure reason kept.
pub fn try_apply<S: AsRef<str>>(
    original: &[S],
    diff: &str,
) -> Result<Vec<String>, ReconstructError> {
    let mut out: Vec<String> = Vec::with_capacity(original.len());
    let mut cursor = 0usize; // 0-based index of next unconsumed original line
    let mut in_hunk = false;
    let mut old_left = 0usize; // remaining old-side lines announced by the header
    let mut new_left = 0usize;

    let at = |idx: usize| original.get(idx).map(|s| s.as_ref());

    for line in diff.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let body_open = in_hunk && (old_left > 0 || new_left > 0);

        if line.starts_with("@@") {
            let header =
                HunkHeader::parse(line).ok_or_else(|| ReconstructError::BadHeader(line.into()))?;
            let target = header.lines_before();

            if target < cursor {
                return Err(ReconstructError::OutOfOrder { old_start: header.old_start, cursor });
            }
            if target > original.len() {
                return Err(ReconstructError::PastEnd(target));
            }

            out.extend(original[cursor..target].iter().map(|s| s.as_ref().to_string()));
            cursor = target;
            in_hunk = true;
            old_left = header.old_count;
            new_left = header.new_count;
            continue;
        }

        if !body_open && (line.starts_with("--- ") || line.starts_with("+++ ")) {
            continue;
        }

        // lines before the first hunk carry no position
        if !in_hunk {
            continue;
        }

        // "\ No newline at end of file"
        if line.starts_with('\\') {
            continue;
        }

        let Some(kind) = HunkLine::classify(line) else {
            if body_open {
                return Err(ReconstructError::Unrecognized(line.into()));
            }
            continue;
        };

        match kind {
            HunkLine::Remove(text) => {
                match at(cursor) {
                    Some(orig) if orig == text => {}
                    Some(_) => return Err(ReconstructError::Mismatch { line: cursor + 1 }),
                    None => return Err(ReconstructError::PastEnd(cursor + 1)),
                }
                cursor += 1;
                old_left = old_left.saturating_sub(1);
            }
            HunkLine::Add(text) => {
                out.push(text.to_string());
                new_left = new_left.saturating_sub(1);
            }
            HunkLine::Context(text) => {
                match at(cursor) {
                    Some(orig) if orig == text => out.push(orig.to_string()),
                    Some(_) => return Err(ReconstructError::Mismatch { line: cursor + 1 }),
                    None => return Err(ReconstructError::PastEnd(cursor + 1)),
                }
                cursor += 1;
                old_left = old_left.saturating_sub(1);
                new_left = new_left.saturating_sub(1);
            }
            HunkLine::Blank => {
                // a stripped " " prefix; only trusted when the original agrees
                if body_open && at(cursor) == Some("") {
                    out.push(String::new());
                    cursor += 1;
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                }
            }
        }
    }

    out.extend(original[cursor..].iter().map(|s| s.as_ref().to_string()));
    Ok(out)
}
