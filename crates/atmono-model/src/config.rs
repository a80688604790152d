//! Timeouts and polling for the command channel.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Command channel timing, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Deadline for opening the TCP connection.
    pub connection_timeout: f64,
    /// Upper bound on any single reply wait.
    pub read_timeout: f64,
    /// Default reply deadline for one command or query.
    pub command_timeout: f64,
    /// Readiness budget after a move.
    pub move_timeout: f64,
    /// Readiness budget after a grating change.
    pub move_grating_timeout: f64,
    /// Status polling interval in `wait_ready`.
    pub wait_ready_interval: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            connection_timeout: 10.0,
            read_timeout: 10.0,
            command_timeout: 2.0,
            move_timeout: 60.0,
            move_grating_timeout: 300.0,
            wait_ready_interval: 0.5,
        }
    }
}

impl ModelConfig {
    /// Parse a configuration from YAML text and validate it.
    pub fn from_yaml(text: &str) -> ModelResult<ModelConfig> {
        let config: ModelConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> ModelResult<ModelConfig> {
        let text = std::fs::read_to_string(path)?;
        ModelConfig::from_yaml(&text)
    }

    /// Check that every timeout is a positive duration and the polling
    /// interval is not negative.
    pub fn validate(&self) -> ModelResult<()> {
        let timeouts = [
            ("connection_timeout", self.connection_timeout),
            ("read_timeout", self.read_timeout),
            ("command_timeout", self.command_timeout),
            ("move_timeout", self.move_timeout),
            ("move_grating_timeout", self.move_grating_timeout),
        ];
        for (name, value) in timeouts {
            if !(value > 0.0) || Duration::try_from_secs_f64(value).is_err() {
                return Err(ModelError::InvalidConfig(format!(
                    "{} must be a positive number of seconds, got {}",
                    name, value
                )));
            }
        }
        if Duration::try_from_secs_f64(self.wait_ready_interval).is_err() {
            return Err(ModelError::InvalidConfig(format!(
                "wait_ready_interval must be a non-negative number of seconds, got {}",
                self.wait_ready_interval
            )));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        seconds(self.connection_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        seconds(self.read_timeout)
    }

    pub fn command_timeout(&self) -> Duration {
        seconds(self.command_timeout)
    }

    pub fn move_timeout(&self) -> Duration {
        seconds(self.move_timeout)
    }

    pub fn move_grating_timeout(&self) -> Duration {
        seconds(self.move_grating_timeout)
    }

    pub fn wait_ready_interval(&self) -> Duration {
        seconds(self.wait_ready_interval)
    }

    /// Readiness budget for a command, picked from its label.
    ///
    /// Grating changes are physically slower and get the longer budget.
    pub fn wait_timeout_for(&self, label: &str) -> Duration {
        if label.contains("grating") {
            self.move_grating_timeout()
        } else {
            self.move_timeout()
        }
    }
}

/// Values [`ModelConfig::validate`] rejects collapse to zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
