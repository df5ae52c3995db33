use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{gflog_debug, Error, Result};

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_concurrency() -> usize {
    4
}

/// Run configuration for the scheduler.
///
/// Constructed once by the caller and passed by reference into the scheduler
/// at run start; there is no global mutable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    /// Deadline for a single worker invocation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub invocation_timeout_secs: u64,
    /// Attempts per node before it fails and the run aborts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound on concurrently running invocations.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl RunConfig {
    pub fn graphflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".graphflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::graphflow_dir()?.join("graphflow.toml"))
    }

    /// Per-invocation deadline as a [`Duration`].
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    /// Load configuration from ~/.graphflow/graphflow.toml, then apply
    /// environment overrides. Missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        gflog_debug!("RunConfig::load path={}", path.display());
        let mut config = if path.exists() {
            toml::from_str(&fs::read_to_string(&path)?)?
        } else {
            gflog_debug!("Config file not found, using defaults");
            Self::default()
        };
        config.apply_env();
        gflog_debug!(
            "RunConfig loaded: timeout={}s, attempts={}, concurrency={}",
            config.invocation_timeout_secs,
            config.max_attempts,
            config.max_concurrency
        );
        Ok(config)
    }

    /// Apply environment variable overrides. Unparsable values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse::<u64>("GRAPHFLOW_TIMEOUT_SECS") {
            self.invocation_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u32>("GRAPHFLOW_MAX_ATTEMPTS") {
            self.max_attempts = v;
        }
        if let Some(v) = env_parse::<usize>("GRAPHFLOW_MAX_CONCURRENCY") {
            self.max_concurrency = v;
        }
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::graphflow_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        gflog_debug!("RunConfig saved to {}", path.display());
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
