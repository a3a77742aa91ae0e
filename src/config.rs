// src/config.rs - Engine configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for the simulation engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub vehicle: VehicleConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub motion: MotionConfig,

    #[serde(default)]
    pub drift: DriftConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Vehicle identity
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VehicleConfig {
    #[serde(default = "default_vehicle_name")]
    pub name: String,
}

/// Tick cadence and command sequencing knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Tick interval of the engine loop (ms).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Pause between a command's finalization and starting the next one (ms).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Pause between the exact-snap at progress 1.0 and signaling completion (ms).
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Hard deadline past the requested duration before a motion is
    /// force-finalized (ms).
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Maximum number of archived command records kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

/// Nominal speeds and completion thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Nominal translation speed (units/s) used when a command carries no
    /// explicit duration.
    #[serde(default = "default_move_speed")]
    pub move_speed: f64,

    /// Nominal rotation speed (deg/s) used when a command carries no
    /// explicit duration.
    #[serde(default = "default_turn_speed")]
    pub turn_speed: f64,

    /// Floor applied to derived durations (ms).
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    /// Minimum dwell in Stopping before Idle is permitted (ms).
    #[serde(default = "default_stopping_cooldown_ms")]
    pub stopping_cooldown_ms: u64,

    /// Window over which a preempted motion's velocity decays to zero (ms).
    #[serde(default = "default_stopping_decay_ms")]
    pub stopping_decay_ms: u64,

    /// Speed below which the vehicle counts as stationary (units/s).
    #[serde(default = "default_velocity_epsilon")]
    pub velocity_epsilon: f64,
}

/// DriftGuard thresholds. Too aggressive causes visible snapping, too lax
/// allows visible creep.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriftConfig {
    /// Residual speed while Idle that triggers a correction (units/s).
    #[serde(default = "default_drift_velocity_threshold")]
    pub velocity_threshold: f64,

    /// Positional deviation from the idle snapshot that triggers a
    /// correction (units).
    #[serde(default = "default_drift_position_threshold")]
    pub position_threshold: f64,

    /// Minimum spacing between corrections (ms).
    #[serde(default = "default_drift_cooldown_ms")]
    pub cooldown_ms: u64,
}

/// Rangefinder simulation parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Maximum detection range (units); empty cones report this value.
    #[serde(default = "default_sensor_range")]
    pub range: f64,

    /// Half-angle of the detection cone around each sensor direction (deg).
    #[serde(default = "default_sensor_cone_deg")]
    pub cone_deg: f64,

    /// Uniform measurement noise amplitude (units).
    #[serde(default = "default_sensor_noise")]
    pub noise: f64,

    /// Floor applied to noisy readings (units).
    #[serde(default = "default_sensor_min_reading")]
    pub min_reading: f64,
}

/// Battery drain bookkeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Battery percentage drained per unit of distance moved.
    #[serde(default = "default_move_cost_per_unit")]
    pub move_cost_per_unit: f64,

    /// Battery percentage drained per completed turn.
    #[serde(default = "default_turn_cost")]
    pub turn_cost: f64,
}

// Default value functions
fn default_vehicle_name() -> String { "obo-1".to_string() }
fn default_tick_ms() -> u64 { 16 }
fn default_debounce_ms() -> u64 { 75 }
fn default_settle_ms() -> u64 { 40 }
fn default_stall_timeout_ms() -> u64 { 2000 }
fn default_history_limit() -> usize { 256 }
fn default_move_speed() -> f64 { 2.0 }
fn default_turn_speed() -> f64 { 90.0 }
fn default_min_duration_ms() -> u64 { 50 }
fn default_stopping_cooldown_ms() -> u64 { 400 }
fn default_stopping_decay_ms() -> u64 { 300 }
fn default_velocity_epsilon() -> f64 { 1e-3 }
fn default_drift_velocity_threshold() -> f64 { 1e-3 }
fn default_drift_position_threshold() -> f64 { 1e-2 }
fn default_drift_cooldown_ms() -> u64 { 250 }
fn default_sensor_range() -> f64 { 20.0 }
fn default_sensor_cone_deg() -> f64 { 30.0 }
fn default_sensor_noise() -> f64 { 0.2 }
fn default_sensor_min_reading() -> f64 { 0.1 }
fn default_move_cost_per_unit() -> f64 { 1.0 }
fn default_turn_cost() -> f64 { 0.5 }

impl Default for VehicleConfig {
    fn default() -> Self {
        Self { name: default_vehicle_name() }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            move_speed: default_move_speed(),
            turn_speed: default_turn_speed(),
            min_duration_ms: default_min_duration_ms(),
            stopping_cooldown_ms: default_stopping_cooldown_ms(),
            stopping_decay_ms: default_stopping_decay_ms(),
            velocity_epsilon: default_velocity_epsilon(),
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: default_drift_velocity_threshold(),
            position_threshold: default_drift_position_threshold(),
            cooldown_ms: default_drift_cooldown_ms(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            range: default_sensor_range(),
            cone_deg: default_sensor_cone_deg(),
            noise: default_sensor_noise(),
            min_reading: default_sensor_min_reading(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            move_cost_per_unit: default_move_cost_per_unit(),
            turn_cost: default_turn_cost(),
        }
    }
}

impl MotionConfig {
    /// Derive a translation duration from the nominal speed, clamped to the
    /// configured floor.
    pub fn move_duration(&self, distance: f64) -> Duration {
        let ms = (distance.abs() / self.move_speed * 1000.0) as u64;
        Duration::from_millis(ms.max(self.min_duration_ms))
    }

    /// Derive a rotation duration from the nominal rate, clamped to the
    /// configured floor.
    pub fn turn_duration(&self, degrees: f64) -> Duration {
        let ms = (degrees.abs() / self.turn_speed * 1000.0) as u64;
        Duration::from_millis(ms.max(self.min_duration_ms))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }

        if self.scheduler.stall_timeout_ms <= self.scheduler.settle_ms {
            return Err(ConfigError::Invalid(
                "stall_timeout_ms must exceed settle_ms".into(),
            ));
        }

        if self.motion.move_speed <= 0.0 {
            return Err(ConfigError::Invalid("move_speed must be positive".into()));
        }

        if self.motion.turn_speed <= 0.0 {
            return Err(ConfigError::Invalid("turn_speed must be positive".into()));
        }

        if self.motion.velocity_epsilon <= 0.0 {
            return Err(ConfigError::Invalid(
                "velocity_epsilon must be positive".into(),
            ));
        }

        if self.motion.stopping_decay_ms > self.motion.stopping_cooldown_ms {
            return Err(ConfigError::Invalid(
                "stopping_decay_ms must not exceed stopping_cooldown_ms".into(),
            ));
        }

        if self.drift.velocity_threshold <= 0.0 || self.drift.position_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "drift thresholds must be positive".into(),
            ));
        }

        if self.sensors.range <= 0.0 {
            return Err(ConfigError::Invalid("sensor range must be positive".into()));
        }

        if !(0.0..=90.0).contains(&self.sensors.cone_deg) {
            return Err(ConfigError::Invalid(
                "sensor cone_deg must lie in [0, 90]".into(),
            ));
        }

        if self.sensors.noise < 0.0 {
            return Err(ConfigError::Invalid(
                "sensor noise must be non-negative".into(),
            ));
        }

        if self.telemetry.move_cost_per_unit < 0.0 || self.telemetry.turn_cost < 0.0 {
            return Err(ConfigError::Invalid(
                "battery costs must be non-negative".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.tick_ms, 16);
        assert_eq!(config.scheduler.debounce_ms, 75);
        assert_eq!(config.motion.stopping_cooldown_ms, 400);
        assert_eq!(config.sensors.range, 20.0);
        assert_eq!(config.telemetry.move_cost_per_unit, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_config = r#"
[vehicle]
name = "obo-test"

[scheduler]
tick_ms = 10
debounce_ms = 50

[motion]
move_speed = 4.0
turn_speed = 180.0

[sensors]
range = 15.0
noise = 0.0
        "#;

        let config: Config = toml::from_str(toml_config).unwrap();

        assert_eq!(config.vehicle.name, "obo-test");
        assert_eq!(config.scheduler.tick_ms, 10);
        assert_eq!(config.scheduler.debounce_ms, 50);
        // Unset fields fall back to their defaults.
        assert_eq!(config.scheduler.settle_ms, 40);
        assert_eq!(config.motion.move_speed, 4.0);
        assert_eq!(config.motion.stopping_cooldown_ms, 400);
        assert_eq!(config.sensors.range, 15.0);
        assert_eq!(config.sensors.noise, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.motion.move_speed = -1.0;
        assert!(config.validate().is_err());
        config.motion.move_speed = 2.0;

        config.scheduler.tick_ms = 0;
        assert!(config.validate().is_err());
        config.scheduler.tick_ms = 16;

        config.sensors.cone_deg = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_durations() {
        let motion = MotionConfig::default();
        // 5 units at 2 units/s
        assert_eq!(motion.move_duration(5.0), Duration::from_millis(2500));
        // 90 degrees at 90 deg/s
        assert_eq!(motion.turn_duration(90.0), Duration::from_millis(1000));
        // Tiny magnitudes clamp to the floor.
        assert_eq!(motion.move_duration(0.001), Duration::from_millis(50));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicle.toml");

        let mut config = Config::default();
        config.vehicle.name = "round-trip".to_string();
        config.motion.turn_speed = 45.0;
        config.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.vehicle.name, "round-trip");
        assert_eq!(reloaded.motion.turn_speed, 45.0);
    }
}
