use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

fn default_max_concurrency() -> usize {
    4
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_time_scale_ms() -> u64 {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Executor program. Tasks are simulated when unset.
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Directory the executor runs in.
    pub working_dir: Option<String>,
    /// Simulated milliseconds per minute of estimated effort.
    #[serde(default = "default_time_scale_ms")]
    pub time_scale_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_secs: default_task_timeout_secs(),
            command: None,
            args: Vec::new(),
            working_dir: None,
            time_scale_ms: default_time_scale_ms(),
        }
    }
}

impl Config {
    pub fn atelier_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".atelier"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::atelier_dir()?.join("atelier.toml"))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn time_scale(&self) -> Duration {
        Duration::from_millis(self.time_scale_ms)
    }

    pub fn working_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => expand_tilde(dir),
            None => PathBuf::from("."),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            max_concurrency = config.max_concurrency,
            task_timeout_secs = config.task_timeout_secs,
            command = ?config.command,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.task_timeout_secs == 0 {
            return Err(Error::Validation(
                "task_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
