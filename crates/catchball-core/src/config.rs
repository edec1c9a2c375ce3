//! Configuration loading and typed config structures for the Catchball
//! simulator.
//!
//! The configuration is a YAML document with one section per concern.
//! Every section and every field has a default, so an empty document is a
//! valid configuration. [`SimulationConfig::validate`] checks the
//! cross-field constraints serde cannot express.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use catchball_agents::BehaviorConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but violates a constraint.
    #[error("invalid configuration: {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings (name, seed, clock).
    #[serde(default)]
    pub world: WorldConfig,

    /// Message, escalation and consultation timing.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Background maintenance of persona state.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Persona response behaviour.
    #[serde(default)]
    pub behavior: BehaviorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Simulation boundary parameters.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,
}

impl SimulationConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a constraint is violated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a constraint is violated.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check constraints across fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.acceleration_factor == 0 {
            return Err(ConfigError::invalid(
                "world.acceleration_factor",
                "must be at least 1",
            ));
        }

        let m = &self.messaging;
        check_range(
            "messaging.response_delay",
            m.response_delay_min_secs,
            m.response_delay_max_secs,
        )?;
        check_range(
            "messaging.escalation_delay",
            m.escalation_delay_min_secs,
            m.escalation_delay_max_secs,
        )?;
        check_range(
            "messaging.consultation_delay",
            m.consultation_delay_min_secs,
            m.consultation_delay_max_secs,
        )?;
        check_probability(
            "messaging.consultation_participation",
            m.consultation_participation,
        )?;

        let maint = &self.maintenance;
        check_probability("maintenance.probability", maint.probability)?;
        for (field, value) in [
            ("maintenance.stress_decay", maint.stress_decay),
            ("maintenance.workload_decay", maint.workload_decay),
            ("maintenance.workload_floor", maint.workload_floor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, "must be a non-negative number"));
            }
        }
        for (field, hour) in [
            ("maintenance.morning_hour", maint.morning_hour),
            ("maintenance.evening_hour", maint.evening_hour),
        ] {
            if hour > 23 {
                return Err(ConfigError::invalid(field, format!("{hour} is not an hour of day")));
            }
        }

        let gate = &self.behavior.gate;
        for (field, p) in [
            ("behavior.gate.order_probability", gate.order_probability),
            ("behavior.gate.overwhelmed_probability", gate.overwhelmed_probability),
            ("behavior.gate.busy_probability", gate.busy_probability),
            ("behavior.gate.base_probability", gate.base_probability),
        ] {
            check_probability(field, p)?;
        }

        Ok(())
    }
}

fn check_range(field: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::invalid(
            field,
            format!("minimum {min}s exceeds maximum {max}s"),
        ));
    }
    Ok(())
}

fn check_probability(field: &str, p: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(ConfigError::invalid(field, format!("{p} is outside [0, 1]")));
    }
    Ok(())
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable simulation name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Simulated seconds per wall-clock second.
    #[serde(default = "default_acceleration_factor")]
    pub acceleration_factor: u32,

    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Simulated start time; the current wall-clock time when absent.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            acceleration_factor: default_acceleration_factor(),
            tick_interval_ms: default_tick_interval_ms(),
            start_time: None,
        }
    }
}

/// Message timing configuration. Delays are simulated seconds, sampled
/// uniformly from the inclusive range.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessagingConfig {
    /// Shortest delay before recipients process a message.
    #[serde(default = "default_response_delay_min_secs")]
    pub response_delay_min_secs: u64,

    /// Longest delay before recipients process a message.
    #[serde(default = "default_response_delay_max_secs")]
    pub response_delay_max_secs: u64,

    /// Shortest delay before an escalated order is processed.
    #[serde(default = "default_escalation_delay_min_secs")]
    pub escalation_delay_min_secs: u64,

    /// Longest delay before an escalated order is processed.
    #[serde(default = "default_escalation_delay_max_secs")]
    pub escalation_delay_max_secs: u64,

    /// Shortest delay before consultation feedback is gathered.
    #[serde(default = "default_consultation_delay_min_secs")]
    pub consultation_delay_min_secs: u64,

    /// Longest delay before consultation feedback is gathered.
    #[serde(default = "default_consultation_delay_max_secs")]
    pub consultation_delay_max_secs: u64,

    /// Probability that an invited persona takes part in a consultation.
    #[serde(default = "default_consultation_participation")]
    pub consultation_participation: f64,

    /// Escalation threshold for messages that do not set one.
    #[serde(default = "default_escalation_threshold")]
    pub default_escalation_threshold: u32,

    /// Days messages and consultations are retained.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            response_delay_min_secs: default_response_delay_min_secs(),
            response_delay_max_secs: default_response_delay_max_secs(),
            escalation_delay_min_secs: default_escalation_delay_min_secs(),
            escalation_delay_max_secs: default_escalation_delay_max_secs(),
            consultation_delay_min_secs: default_consultation_delay_min_secs(),
            consultation_delay_max_secs: default_consultation_delay_max_secs(),
            consultation_participation: default_consultation_participation(),
            default_escalation_threshold: default_escalation_threshold(),
            retention_days: default_retention_days(),
        }
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MaintenanceConfig {
    /// Probability that maintenance runs on a given tick.
    #[serde(default = "default_maintenance_probability")]
    pub probability: f64,

    /// Stress removed per maintenance pass.
    #[serde(default = "default_stress_decay")]
    pub stress_decay: f64,

    /// Workload removed per maintenance pass.
    #[serde(default = "default_workload_decay")]
    pub workload_decay: f64,

    /// Workload never decays below this.
    #[serde(default = "default_workload_floor")]
    pub workload_floor: f64,

    /// Hour (UTC) of the daily cleanup.
    #[serde(default = "default_morning_hour")]
    pub morning_hour: u32,

    /// Hour (UTC) of the daily metrics snapshot.
    #[serde(default = "default_evening_hour")]
    pub evening_hour: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            probability: default_maintenance_probability(),
            stress_decay: default_stress_decay(),
            workload_decay: default_workload_decay(),
            workload_floor: default_workload_floor(),
            morning_hour: default_morning_hour(),
            evening_hour: default_evening_hour(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Simulation boundary configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Maximum number of ticks before the run ends (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Maximum wall-clock seconds before the run ends (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,
}

fn default_world_name() -> String {
    String::from("Catchball")
}

const fn default_seed() -> u64 {
    42
}

const fn default_acceleration_factor() -> u32 {
    144
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_response_delay_min_secs() -> u64 {
    300
}

const fn default_response_delay_max_secs() -> u64 {
    3600
}

const fn default_escalation_delay_min_secs() -> u64 {
    600
}

const fn default_escalation_delay_max_secs() -> u64 {
    1800
}

const fn default_consultation_delay_min_secs() -> u64 {
    1800
}

const fn default_consultation_delay_max_secs() -> u64 {
    7200
}

const fn default_consultation_participation() -> f64 {
    0.7
}

const fn default_escalation_threshold() -> u32 {
    5
}

const fn default_retention_days() -> u32 {
    7
}

const fn default_maintenance_probability() -> f64 {
    0.1
}

const fn default_stress_decay() -> f64 {
    0.01
}

const fn default_workload_decay() -> f64 {
    0.05
}

const fn default_workload_floor() -> f64 {
    0.1
}

const fn default_morning_hour() -> u32 {
    9
}

const fn default_evening_hour() -> u32 {
    17
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("text")
}
