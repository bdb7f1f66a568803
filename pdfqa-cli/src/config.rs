use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use pdfqa_client::ClientConfig;
use pdfqa_core::DEFAULT_MAX_QUERY_CHARS;
use serde::{Deserialize, Serialize};

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Zoom applied to reported bounding boxes.
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_max_query_chars() -> usize {
    DEFAULT_MAX_QUERY_CHARS
}
fn default_max_results() -> u32 {
    5
}
fn default_scale() -> f32 {
    1.0
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            max_query_chars: default_max_query_chars(),
            max_results: default_max_results(),
            scale: default_scale(),
        }
    }
}

impl CliConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {:?}", path))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.max_query_chars > 0, "max_query_chars must be at least 1");
        ensure!(self.max_results > 0, "max_results must be at least 1");
        Ok(())
    }
}
