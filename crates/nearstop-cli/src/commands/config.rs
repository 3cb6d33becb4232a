//! `nearstop config` subcommands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use nearstop_core::{default_config_path, Config};
use tracing::info;

/// Resolve the config file in use: the `--config` override or the default.
pub fn resolve_path(override_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(default_config_path()?),
    }
}

/// Print the effective configuration as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

/// Print where the config file is read from.
pub fn path(override_path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", resolve_path(override_path)?.display());
    Ok(())
}

/// Write the default configuration, refusing to clobber an existing file
/// unless `force` is set.
pub fn init(override_path: Option<&Path>, force: bool) -> anyhow::Result<PathBuf> {
    let path = resolve_path(override_path)?;
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(&path)?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(path)
}
