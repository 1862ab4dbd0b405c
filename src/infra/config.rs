use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

/// Config file names probed in the workspace root, first hit wins
pub const CONFIG_FILES: [&str; 4] = ["rlens.toml", "rlens.yaml", "rlens.json", ".rlens.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// How Rector itself is invoked
    pub rector: RectorConfig,

    /// Confirmation and on-save behavior
    pub review: ReviewConfig,

    /// File watching for the on-save workflow
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RectorConfig
{
    /// Executable path or bare command name
    pub executable: String,

    /// Explicit rector config; empty means auto-discovery
    pub config: String,

    /// Pass --clear-cache on every run
    pub clear_cache: bool,

    /// Kill the process after this many milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig
{
    /// Run Rector when a PHP file is saved
    pub enable_autofix: bool,

    /// On save, preview and confirm instead of writing directly
    pub show_diff_on_save: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig
{
    /// Glob patterns of files that count as "saved sources"
    pub patterns: Vec<String>,

    /// Quiet period before a burst of writes counts as one save
    pub debounce_ms: u64,
}

impl Default for RectorConfig
{
    fn default() -> Self
    {
        Self {
            executable: "rector".to_string(),
            config: String::new(),
            clear_cache: false,
            timeout_ms: 60_000,
        }
    }
}

impl Default for ReviewConfig
{
    fn default() -> Self
    {
        Self { enable_autofix: false, show_diff_on_save: true }
    }
}

impl Default for WatchConfig
{
    fn default() -> Self
    {
        Self { patterns: vec!["**/*.php".to_string()], debounce_ms: 300 }
    }
}

impl RectorConfig
{
    pub fn timeout(&self) -> Duration
    {
        Duration::from_millis(self.timeout_ms)
    }

    /// Explicit config path, if one was configured
    pub fn explicit_config(&self) -> Option<&str>
    {
        let trimmed = self
            .config
            .trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Load layered config: first config file in `root`, then `RLENS_*` env vars.
pub fn load_config(root: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    let base = root
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    for name in &CONFIG_FILES
    {
        let path = base.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // RLENS_RECTOR__TIMEOUT_MS=1000 style overrides
    builder = builder.add_source(
        config::Environment::with_prefix("RLENS")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("rlens.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
