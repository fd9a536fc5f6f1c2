//! TOML configuration for the reliability layer.
//!
//! Callers resolve settings however they like (CLI flag > env var > file >
//! default is the usual chain); this module covers the file and the
//! defaults, and converts the seconds-based sections into the validated
//! duration configs the components take.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::guard::GuardConfig;
use crate::supervisor::SupervisorConfig;

/// On-disk configuration. Every field has a default, so an empty file
/// (or no file) is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Override for the sessions directory; defaults to
    /// `<project>/.tether/sessions` when unset.
    pub sessions_dir: Option<PathBuf>,
    pub guard: GuardSection,
    pub supervisor: SupervisorSection,
}

/// `[guard]` section, in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSection {
    /// Overall wall-clock ceiling per attempt. Default: 1800.
    pub overall_timeout_secs: u64,
    /// Activity staleness limit; omit to disable the watchdog.
    /// Default: 120.
    pub activity_timeout_secs: Option<u64>,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            overall_timeout_secs: 1800,
            activity_timeout_secs: Some(120),
        }
    }
}

/// `[supervisor]` section, in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    /// Grace period after the polite termination signal. Default: 2.
    pub graceful_wait_secs: u64,
    /// Wait after the forced kill before giving up. Default: 1.
    pub kill_wait_secs: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            graceful_wait_secs: 2,
            kill_wait_secs: 1,
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both sections without building the component configs.
    pub fn validate(&self) -> Result<()> {
        self.guard_config().context("invalid [guard] section")?;
        self.supervisor_config()
            .context("invalid [supervisor] section")?;
        Ok(())
    }

    /// The guard configuration this file describes.
    pub fn guard_config(&self) -> Result<GuardConfig, crate::guard::InvalidGuardConfig> {
        let mut config = GuardConfig::new(Duration::from_secs(self.guard.overall_timeout_secs));
        if let Some(secs) = self.guard.activity_timeout_secs {
            config = config.with_activity_timeout(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    /// The supervisor configuration this file describes.
    pub fn supervisor_config(
        &self,
    ) -> Result<SupervisorConfig, crate::supervisor::InvalidSupervisorConfig> {
        let config = SupervisorConfig {
            graceful_wait: Duration::from_secs(self.supervisor.graceful_wait_secs),
            kill_wait: Duration::from_secs(self.supervisor.kill_wait_secs),
        };
        config.validate()?;
        Ok(config)
    }
}
