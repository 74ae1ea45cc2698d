use anyhow::{Context, Result, bail};
use devlink::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the default config file path (`~/.config/convoy/config.yaml`)
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("convoy").join("config.yaml"))
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_paths: BasePaths,
    pub transports: TransportsConfig,
    pub commit: CommitConfig,
}

/// Where the inventory and the pre-rendered candidate configs live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasePaths {
    /// Device inventory file
    pub inventory: PathBuf,
    /// Directory of per-device candidate configs (`<fqdn>.conf`)
    pub candidates: PathBuf,
}

impl Default for BasePaths {
    fn default() -> Self {
        Self {
            inventory: PathBuf::from("devices.yaml"),
            candidates: PathBuf::from("candidates"),
        }
    }
}

/// Fleet-wide session defaults; the inventory can override them per device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportsConfig {
    /// Username to authenticate as (empty = the invoking user)
    pub username: String,
    /// Password for HTTP-authenticated transports
    pub password: String,
    /// Alternative ssh_config file
    pub ssh_config: Option<String>,
    /// Per-RPC timeout on the management channel
    pub timeout_secs: u64,
}

impl Default for TransportsConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            ssh_config: None,
            timeout_secs: 30,
        }
    }
}

/// Commit policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Confirm window armed on the device by a confirmed commit
    pub confirm_timeout_secs: u64,
    /// Maximum commit attempts per device (including the first)
    pub max_attempts: u32,
    /// Delay before retrying after an RPC timeout.
    ///
    /// Must exceed `confirm_timeout_secs`: the previous attempt's rollback
    /// timer has to fire on the device before the retry re-stages. Unset
    /// derives a safe value from the confirm window.
    pub retry_backoff_secs: Option<u64>,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: 120,
            max_attempts: 3,
            retry_backoff_secs: None,
        }
    }
}

impl CommitConfig {
    /// The confirm window as a duration.
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Build the retry policy for the commit attempt loop.
    pub fn retry_config(&self) -> RetryConfig {
        match self.retry_backoff_secs {
            Some(secs) => RetryConfig {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_secs(secs),
                ..RetryConfig::default()
            },
            None => RetryConfig::for_confirm_timeout(self.confirm_timeout(), self.max_attempts),
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicitly given path must exist and parse; the default path is
    /// allowed to be absent (empty configuration).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path()?, false),
        };

        if !path.exists() {
            if required {
                bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would violate safety properties.
    pub fn validate(&self) -> Result<()> {
        if self.commit.max_attempts == 0 {
            bail!("commit.max_attempts must be at least 1");
        }
        if let Some(backoff) = self.commit.retry_backoff_secs {
            if backoff <= self.commit.confirm_timeout_secs {
                bail!(
                    "commit.retry_backoff_secs ({backoff}) must exceed \
                     commit.confirm_timeout_secs ({}): retrying before the \
                     device's rollback timer fires races a half-applied \
                     configuration",
                    self.commit.confirm_timeout_secs
                );
            }
        }
        Ok(())
    }
}
