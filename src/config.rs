use crate::constants::{CONFIG_FILE, DEFAULT_POOL_SIZE, ERK_DIR, POOL_SIZE_ENV};
use crate::error::PoolError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
struct PartialConfig {
    pool_size: Option<usize>,
    trunk_branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Config {
    /// `None` means "whatever pool.json says, else the default".
    pub(crate) pool_size: Option<usize>,
    pub(crate) trunk_branch: Option<String>,
}

impl Config {
    pub(crate) fn load(repo_root: &Path) -> Result<Self> {
        let mut config = Self::default();
        for path in config_paths(repo_root) {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            config = Self::from_toml(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            break;
        }

        if let Ok(raw) = env::var(POOL_SIZE_ENV)
            && !raw.trim().is_empty()
        {
            config.pool_size = Some(parse_pool_size(&raw)?);
        }
        Ok(config)
    }

    pub(crate) fn from_toml(raw: &str) -> Result<Self> {
        let parsed: PartialConfig = toml::from_str(raw)?;
        if parsed.pool_size == Some(0) {
            return Err(PoolError::InvalidPoolSize {
                value: "0".to_string(),
            }
            .into());
        }
        Ok(Self {
            pool_size: parsed.pool_size,
            trunk_branch: parsed
                .trunk_branch
                .filter(|trunk| !trunk.trim().is_empty()),
        })
    }

    /// Configured size wins over the persisted one so a pool can be resized.
    pub(crate) fn effective_pool_size(&self, persisted: Option<usize>) -> usize {
        self.pool_size.or(persisted).unwrap_or(DEFAULT_POOL_SIZE)
    }
}

pub(crate) fn parse_pool_size(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(PoolError::InvalidPoolSize {
            value: raw.trim().to_string(),
        }
        .into()),
    }
}

fn config_paths(repo_root: &Path) -> Vec<PathBuf> {
    let mut paths = vec![repo_root.join(ERK_DIR).join(CONFIG_FILE)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("erk").join(CONFIG_FILE));
    }
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".erk.toml"));
    }
    paths
}
