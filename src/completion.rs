//! `rlens completions`: shell completion scripts for the `rlens` binary.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell as CompletionShell, generate, generate_to};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};

const BIN_NAME: &str = "rlens";

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Completion script for `shell` as bytes
pub fn render(shell: Shell) -> Vec<u8> {
    let mut buf = Vec::new();
    generate(CompletionShell::from(shell), &mut Cli::command(), BIN_NAME, &mut buf);
    buf
}

fn write_to_dir(
    shell: Shell,
    dir: PathBuf,
) -> Result<PathBuf> {
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create completion directory: {}", dir.display()))?;
    generate_to(CompletionShell::from(shell), &mut Cli::command(), BIN_NAME, &dir)
        .with_context(|| format!("Failed to write {shell:?} completions"))
}

pub fn run(
    args: CompletionsArgs,
    ctx: &AppContext,
) -> Result<()> {
    if args.stdout {
        std::io::stdout()
            .lock()
            .write_all(&render(args.shell))
            .context("write completions to stdout")?;
        return Ok(());
    }

    let Some(dir) = args.out_dir else {
        anyhow::bail!("--out-dir is required unless --stdout is set");
    };
    let path = write_to_dir(args.shell, dir)?;

    if !ctx.quiet {
        eprintln!("Wrote {:?} completions to {}", args.shell, path.display());
    }
    Ok(())
}
