//! Configuration Management
//!
//! Persisted defaults for the target environment. Precedence, highest
//! first: command line, stack file, this config, `AWS_REGION` /
//! `AWS_DEFAULT_REGION`, built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Account used when nothing else names one
pub const DEFAULT_ACCOUNT: &str = "000000000000";
/// Region used when nothing else names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default target account
    #[serde(default)]
    pub account: Option<String>,
    /// Default target region
    #[serde(default)]
    pub region: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sitestack").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`, falling back to defaults when missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get effective account (CLI > stack file > config > default)
    pub fn effective_account(&self, cli: Option<&str>, stack: Option<&str>) -> String {
        cli.or(stack)
            .map(str::to_string)
            .or_else(|| self.account.clone())
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string())
    }

    /// Get effective region (CLI > stack file > config > environment > default)
    pub fn effective_region(&self, cli: Option<&str>, stack: Option<&str>) -> String {
        cli.or(stack)
            .map(str::to_string)
            .or_else(|| self.region.clone())
            .or_else(env_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Set account and save
    pub fn set_account(&mut self, account: &str) -> Result<()> {
        self.account = Some(account.to_string());
        self.save()
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.region = Some(region.to_string());
        self.save()
    }
}

fn env_region() -> Option<String> {
    ["AWS_REGION", "AWS_DEFAULT_REGION"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|v| !v.is_empty())
}
