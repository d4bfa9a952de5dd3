//! Configuration types for execd.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Command execution settings
    pub execution: ExecutionSettings,
    /// Capture file retention settings
    pub retention: RetentionSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.execution.shell.trim().is_empty() {
            return Err(Error::Config("execution.shell cannot be empty".to_string()));
        }
        if self.execution.poll_interval_ms == 0 {
            return Err(Error::Config(
                "execution.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.execution.max_record_bytes == 0 {
            return Err(Error::Config(
                "execution.max_record_bytes must be > 0".to_string(),
            ));
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "retention.sweep_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Transport type (stdio)
    pub transport: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Command execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Interpreter invoked as `<shell> -c <code>`
    pub shell: String,
    /// Directory for capture files (None = system temp dir)
    pub output_dir: Option<PathBuf>,
    /// Tailer poll period in milliseconds
    pub poll_interval_ms: u64,
    /// Largest record the tailer will emit
    pub max_record_bytes: usize,
    /// Delay after a foreground completion before returning
    pub completion_grace_ms: u64,
    /// Delay between SIGTERM and SIGKILL on interrupt (0 = never escalate)
    pub interrupt_grace_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            output_dir: None,
            poll_interval_ms: 100,
            max_record_bytes: 5 * 1024 * 1024,
            completion_grace_ms: 100,
            interrupt_grace_ms: 3000,
        }
    }
}

impl ExecutionSettings {
    /// Directory capture files are written to.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Tailer poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Foreground completion grace delay.
    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }

    /// SIGKILL escalation delay, if enabled.
    pub fn interrupt_grace(&self) -> Option<Duration> {
        (self.interrupt_grace_ms > 0).then(|| Duration::from_millis(self.interrupt_grace_ms))
    }
}

/// Capture file retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Evict consumed sessions finished longer ago than this (None = keep)
    pub max_age_secs: Option<u64>,
    /// Keep at most this many consumed finished sessions (None = unbounded)
    pub max_finished_sessions: Option<usize>,
    /// Sweep period in seconds
    pub sweep_interval_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age_secs: Some(24 * 60 * 60),
            max_finished_sessions: None,
            sweep_interval_secs: 60,
        }
    }
}

impl RetentionSettings {
    /// Sweep period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
