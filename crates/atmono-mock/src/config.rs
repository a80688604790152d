//! Simulation configuration.
//!
//! The fields mirror the controller configuration schema, so a YAML file
//! written for the real controller can be fed to the simulator unchanged.
//! Every field has a default; unknown fields are an error.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MockError, MockResult};

/// Configuration for the simulated controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Address to bind the listener to.
    pub host: String,
    /// Port to bind; 0 picks a free port.
    pub port: u16,
    /// Connection timeout (seconds).
    pub connection_timeout: f64,
    /// Timeout for receiving data from the controller (seconds).
    pub read_timeout: f64,
    /// Timeout for writing data to the controller (seconds).
    pub write_timeout: f64,
    /// Minimum wavelength to use with grating 1 (nm).
    pub wavelength_gr1: f64,
    /// Wavelength at which to change to grating 2 (nm).
    pub wavelength_gr1_gr2: f64,
    /// Maximum wavelength to use with grating 2 (nm).
    pub wavelength_gr2: f64,
    /// Minimum acceptable slit width (mm).
    pub min_slit_width: f64,
    /// Maximum acceptable slit width (mm).
    pub max_slit_width: f64,
    /// Minimum acceptable wavelength (nm).
    pub min_wavelength: f64,
    /// Maximum acceptable wavelength (nm).
    pub max_wavelength: f64,
    /// Controller internal heartbeat period (seconds).
    pub period: f64,
    /// Heartbeat timeout (seconds).
    pub timeout: f64,
    /// Simulated time of one actuation step (seconds).
    pub actuation_delay: f64,
    /// Selectable grating indices. The first one is the reset position.
    pub grating_options: Vec<i32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            connection_timeout: 10.0,
            read_timeout: 10.0,
            write_timeout: 10.0,
            wavelength_gr1: 320.0,
            wavelength_gr1_gr2: 800.0,
            wavelength_gr2: 1130.0,
            min_slit_width: 0.0,
            max_slit_width: 7.0,
            min_wavelength: 320.0,
            max_wavelength: 1130.0,
            period: 1.0,
            timeout: 5.0,
            actuation_delay: 0.1,
            grating_options: vec![0, 1, 2],
        }
    }
}

impl SimulationConfig {
    /// Parse a configuration from YAML text and validate it.
    pub fn from_yaml(text: &str) -> MockResult<SimulationConfig> {
        let config: SimulationConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> MockResult<SimulationConfig> {
        let text = std::fs::read_to_string(path)?;
        SimulationConfig::from_yaml(&text)
    }

    /// Check that ranges are ordered and delays are usable.
    pub fn validate(&self) -> MockResult<()> {
        if !(self.min_wavelength <= self.max_wavelength) {
            return Err(MockError::InvalidConfig(format!(
                "min_wavelength {} is above max_wavelength {}",
                self.min_wavelength, self.max_wavelength
            )));
        }
        if !(self.min_slit_width <= self.max_slit_width) {
            return Err(MockError::InvalidConfig(format!(
                "min_slit_width {} is above max_slit_width {}",
                self.min_slit_width, self.max_slit_width
            )));
        }
        if self.grating_options.is_empty() {
            return Err(MockError::InvalidConfig(
                "grating_options must not be empty".to_string(),
            ));
        }
        if Duration::try_from_secs_f64(self.actuation_delay).is_err() {
            return Err(MockError::InvalidConfig(format!(
                "actuation_delay must be a non-negative number of seconds, got {}",
                self.actuation_delay
            )));
        }
        Ok(())
    }

    /// Accepted wavelength range (nm).
    pub fn wavelength_range(&self) -> (f64, f64) {
        (self.min_wavelength, self.max_wavelength)
    }

    /// Accepted entrance slit range (mm).
    pub fn entrance_slit_range(&self) -> (f64, f64) {
        (self.min_slit_width, self.max_slit_width)
    }

    /// Accepted exit slit range (mm).
    pub fn exit_slit_range(&self) -> (f64, f64) {
        (self.min_slit_width, self.max_slit_width)
    }

    /// Simulated duration of one actuation step.
    ///
    /// A value [`validate`](Self::validate) would reject reads as zero.
    pub fn actuation_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.actuation_delay).unwrap_or_default()
    }

    /// Builder-style override of the actuation delay.
    pub fn with_actuation_delay(mut self, delay: Duration) -> Self {
        self.actuation_delay = delay.as_secs_f64();
        self
    }
}
