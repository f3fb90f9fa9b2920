//! Config file loading
//!
//! Settings live in `$XDG_CONFIG_HOME/runscope/config.toml` unless `--config`
//! points elsewhere. Command line flags override the file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use runscope_loki::LokiConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub loki: LokiConfig,
}

/// Flags that take precedence over the config file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub tenant: Option<String>,
    pub page_size: Option<usize>,
    pub max_queries: Option<u32>,
}

impl Overrides {
    pub fn apply(&self, config: &mut LokiConfig) {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(tenant) = &self.tenant {
            config.tenant_id = Some(tenant.clone());
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(max_queries) = self.max_queries {
            config.max_queries = max_queries;
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("runscope").join("config.toml"))
}

impl Settings {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path`, or the default location when none is given.
    ///
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }
}
