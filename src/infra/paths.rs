//! User-path resolution and Rector config discovery.
//!
//! Paths typed by users into settings (`~/bin/rector`, `./vendor/bin/rector`)
//! are resolved the same way for the executable and for an explicit config
//! file: tilde expansion, then workspace-relative anchoring, then lexical
//! normalization.

use std::path::{Component, Path, PathBuf};

use tracing::trace;

/// Config file names searched during auto-discovery, in priority order.
pub const CONFIG_CANDIDATES: [&str; 2] = ["rector.php", "rector.php.dist"];

/// Resolve a user-supplied path against the home directory and workspace.
pub fn resolve_user_path(
    raw: &str,
    workspace_root: Option<&Path>,
) -> PathBuf {
    // (a) "~" and "~/..." expand to the home directory
    let expanded = shellexpand::tilde(raw).into_owned();

    // (b) explicit relative forms anchor at the workspace root when present
    let anchored = match workspace_root {
        Some(root) if is_explicitly_relative(&expanded) => root.join(&expanded),
        _ => PathBuf::from(&expanded),
    };

    // (c) collapse "." / ".." / duplicate separators
    let resolved = normalize_lexically(&anchored);
    trace!(raw, resolved = %resolved.display(), "resolved user path");
    resolved
}

/// True for paths spelled `./x`, `../x`, `.` or `..`.
fn is_explicitly_relative(p: &str) -> bool {
    p == "."
        || p == ".."
        || p.starts_with("./")
        || p.starts_with("../")
        || p.starts_with(".\\")
        || p.starts_with("..\\")
}

/// Lexically normalize a path without touching the filesystem.
///
/// `..` pops a preceding normal segment; leading `..` segments on relative
/// paths are kept, and `..` directly under the root is dropped.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize; // normal segments that ".." may pop

    for c in path.components() {
        match c {
            Component::Prefix(_) | Component::RootDir => out.push(c.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(seg) => {
                out.push(seg);
                depth += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Search upward from `start` for the first Rector config file.
///
/// Within one directory `rector.php` wins over `rector.php.dist`; the walk
/// stops at the filesystem root.
pub fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();

    loop {
        for name in CONFIG_CANDIDATES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        match dir.parent() {
            Some(parent) if parent != dir && !parent.as_os_str().is_empty() => {
                dir = parent.to_path_buf();
            }
            _ => return None,
        }
    }
}

/// Directory a discovery walk starts from for a given target.
pub fn discovery_start(target: &Path) -> PathBuf {
    if target.is_dir() {
        return target.to_path_buf();
    }

    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalizes_dots_and_separators() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b//c/../d")),
            PathBuf::from("/a/b/d")
        );
        assert_eq!(normalize_lexically(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_lexically(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn dot_relative_paths_anchor_at_workspace() {
        let root = Path::new("/work/project");

        assert_eq!(
            resolve_user_path("./vendor/bin/rector", Some(root)),
            PathBuf::from("/work/project/vendor/bin/rector")
        );
        assert_eq!(
            resolve_user_path("../shared/rector.php", Some(root)),
            PathBuf::from("/work/shared/rector.php")
        );
    }

    #[test]
    fn dot_relative_paths_without_workspace_stay_relative() {
        assert_eq!(
            resolve_user_path("./vendor/bin/rector", None),
            PathBuf::from("vendor/bin/rector")
        );
    }

    #[test]
    fn bare_names_are_not_anchored() {
        let root = Path::new("/work/project");
        assert_eq!(resolve_user_path("rector", Some(root)), PathBuf::from("rector"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        let resolved = resolve_user_path("~/tools/rector", None);
        assert_eq!(resolved, normalize_lexically(&PathBuf::from(home).join("tools/rector")));
    }

    #[test]
    fn discovery_prefers_nearest_directory_and_primary_name() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let nested = root.join("src/Domain");
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(root.join("rector.php"), "<?php").unwrap();
        std::fs::write(root.join("src/rector.php.dist"), "<?php").unwrap();

        // nearest ancestor wins even with the secondary name
        assert_eq!(discover_config(&nested), Some(root.join("src/rector.php.dist")));

        // primary name wins within the same directory
        std::fs::write(root.join("src/rector.php"), "<?php").unwrap();
        assert_eq!(discover_config(&nested), Some(root.join("src/rector.php")));
    }

    #[test]
    fn discovery_start_uses_parent_for_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("Foo.php");
        std::fs::write(&file, "<?php").unwrap();

        assert_eq!(discovery_start(&file), tmp.path().to_path_buf());
        assert_eq!(discovery_start(tmp.path()), tmp.path().to_path_buf());
    }
}
