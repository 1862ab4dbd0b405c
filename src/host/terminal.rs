//! Terminal implementation of the editor host.
//!
//! The "comparison view" is a colored unified diff printed once; the view
//! stays open until the user closes it with `q`. Keys are read on a plain
//! thread so a pending read never keeps the runtime alive.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::AppContext;
use crate::core::session::{EditorHost, Notice, NoticeLevel};

/// A line of user input mapped to an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Apply,
    Discard,
    Close,
    Unknown,
}

impl Key {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "a" | "apply" => Key::Apply,
            "d" | "discard" => Key::Discard,
            "q" | "quit" | "close" => Key::Close,
            _ => Key::Unknown,
        }
    }
}

#[derive(Default)]
struct View {
    documents: Vec<PathBuf>,
    shown: bool,
    prompting: bool,
}

pub struct TerminalHost {
    quiet: bool,
    color: bool,
    view: Mutex<View>,
    busy: Mutex<Option<ProgressBar>>,
}

impl TerminalHost {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            quiet: ctx.quiet,
            color: !ctx.no_color,
            view: Mutex::new(View::default()),
            busy: Mutex::new(None),
        }
    }

    /// Keep `pb` ticking until the next view or message is printed
    pub fn show_busy(
        &self,
        pb: ProgressBar,
    ) {
        let previous = self
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(pb);
        if let Some(previous) = previous {
            previous.finish_and_clear();
        }
    }

    pub fn clear_busy(&self) {
        let pb = self
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
    }

    fn view(&self) -> MutexGuard<'_, View> {
        self.view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the comparison; returns the documents that were open.
    pub fn close_view(&self) -> Vec<PathBuf> {
        let mut view = self.view();
        view.shown = false;
        std::mem::take(&mut view.documents)
    }

    fn paint(
        &self,
        text: &str,
        tag: ChangeTag,
    ) -> String {
        if !self.color {
            return text.to_string();
        }
        match tag {
            ChangeTag::Delete => text.red().to_string(),
            ChangeTag::Insert => text.green().to_string(),
            ChangeTag::Equal => text.dimmed().to_string(),
        }
    }

    /// Render the comparison as a unified diff with three lines of context.
    pub fn render_comparison(
        &self,
        original: &str,
        proposed: &str,
        title: &str,
    ) -> String {
        let mut out = String::new();
        if self.color {
            out.push_str(&title.bold().to_string());
        } else {
            out.push_str(title);
        }
        out.push('\n');

        let diff = TextDiff::from_lines(original, proposed);
        for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
            if idx > 0 {
                out.push_str(&self.paint("...\n", ChangeTag::Equal));
            }
            for op in group {
                for change in diff.iter_changes(op) {
                    let sign = match change.tag() {
                        ChangeTag::Delete => '-',
                        ChangeTag::Insert => '+',
                        ChangeTag::Equal => ' ',
                    };
                    let line = format!("{sign}{}", change.value().trim_end_matches('\n'));
                    out.push_str(&self.paint(&line, change.tag()));
                    out.push('\n');
                }
            }
        }
        out
    }
}

impl EditorHost for TerminalHost {
    fn open_comparison(
        &self,
        original: &Path,
        proposed: &Path,
        title: &str,
    ) -> Result<()> {
        let before = std::fs::read_to_string(original)
            .with_context(|| format!("read {}", original.display()))?;
        let after = std::fs::read_to_string(proposed)
            .with_context(|| format!("read {}", proposed.display()))?;

        self.clear_busy();
        {
            let mut view = self.view();
            view.documents = vec![original.to_path_buf(), proposed.to_path_buf()];
            view.shown = true;
        }

        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{}", self.render_comparison(&before, &after, title))?;
        stdout.flush()?;
        Ok(())
    }

    fn open_documents(&self) -> Vec<PathBuf> {
        self.view().documents.clone()
    }

    fn visible_documents(&self) -> Vec<PathBuf> {
        let view = self.view();
        if view.shown { view.documents.clone() } else { Vec::new() }
    }

    fn set_choices_visible(
        &self,
        visible: bool,
    ) {
        let was_prompting = std::mem::replace(&mut self.view().prompting, visible);
        if !visible {
            if was_prompting && !self.quiet {
                let line = "Review closed; keys are ignored until the next diff";
                println!("{}", self.paint(line, ChangeTag::Equal));
                let _ = std::io::stdout().flush();
            }
            return;
        }
        let prompt = "[a] apply  [d] discard  [q] close view";
        if self.color {
            println!("{}", prompt.cyan());
        } else {
            println!("{prompt}");
        }
        let _ = std::io::stdout().flush();
    }

    fn notify(
        &self,
        notice: Notice,
    ) {
        self.clear_busy();
        let level = notice.level();
        let text = notice.to_string();
        match level {
            NoticeLevel::Info if self.quiet => {}
            NoticeLevel::Info if self.color => println!("{}", text.green()),
            NoticeLevel::Info => println!("{text}"),
            NoticeLevel::Warning if self.color => eprintln!("{}", text.yellow()),
            NoticeLevel::Warning => eprintln!("warning: {text}"),
            NoticeLevel::Error if self.color => eprintln!("{}", text.red()),
            NoticeLevel::Error => eprintln!("error: {text}"),
        }
    }
}

/// Forward stdin lines as keys until stdin closes or the receiver is gone.
pub fn spawn_key_reader() -> mpsc::UnboundedReceiver<Key> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Key::parse(&line)).is_err() {
                break;
            }
        }
        debug!("key reader finished");
    });
    rx
}
