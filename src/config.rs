// ==============================================================================
// config.rs — SIMULATION CONFIGURATION
// ------------------------------------------------------------------------------
// Every section deserializes with #[serde(default)], so a JSON file only needs
// to name the values it overrides. Defaults reproduce the stock arena tuning.
//
// validate() runs before anything is built; bad values fail fast instead of
// being clamped.
// ==============================================================================

use std::path::Path;

use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SandboxError};
use crate::input::DriveConfig;
use crate::vehicle::VehicleConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: [Real; 3],
    pub fixed_dt: Real,            // seconds per substep
    pub max_substeps: u32,         // per frame
    pub solver_iterations: usize,
    pub sleep_linear_sq: Real,     // |v|² threshold
    pub sleep_angular_sq: Real,    // |ω|² threshold
    pub sleep_time_limit: Real,    // seconds slow before SLEEPING
    pub world_bound: Real,         // runaway guard, per axis
    pub respawn_point: [Real; 3],
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.82, 0.0],
            fixed_dt: 1.0 / 60.0,
            max_substeps: 3,
            solver_iterations: 10,
            sleep_linear_sq: 0.1,
            sleep_angular_sq: 0.1,
            sleep_time_limit: 0.2,
            world_bound: 1_000.0,
            respawn_point: [0.0, 1.0, 0.0],
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fixed_dt.is_finite() || self.fixed_dt <= 0.0 {
            return Err(SandboxError::invalid_config(format!(
                "fixed_dt must be positive, got {}",
                self.fixed_dt
            )));
        }
        if self.max_substeps == 0 {
            return Err(SandboxError::invalid_config("max_substeps must be at least 1"));
        }
        if self.solver_iterations == 0 {
            return Err(SandboxError::invalid_config("solver_iterations must be at least 1"));
        }
        let sleep = [self.sleep_linear_sq, self.sleep_angular_sq, self.sleep_time_limit];
        if sleep.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(SandboxError::invalid_config(format!(
                "sleep thresholds must be finite and non-negative, got {sleep:?}"
            )));
        }
        if self.world_bound.is_nan() || self.world_bound <= 0.0 {
            return Err(SandboxError::invalid_config("world_bound must be positive"));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(SandboxError::invalid_config("gravity must be finite"));
        }
        Ok(())
    }
}

/// Scene population knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub seed: u64,
    pub brick_jitter: bool,
    pub car_spawn: [Real; 3],
    pub trees: bool,
    pub rocks: bool,
    pub bricks: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            brick_jitter: true,
            car_spawn: [0.0, 1.0, 0.0],
            trees: true,
            rocks: true,
            bricks: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub tick_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:9001".to_string(), tick_ms: 16 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub world: WorldConfig,
    pub vehicle: VehicleConfig,
    pub drive: DriveConfig,
    pub arena: ArenaConfig,
    pub server: ServerConfig,
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!(path = %path.display(), "loaded simulation config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.world.validate()?;
        self.vehicle.validate()?;
        self.drive.validate()?;
        if self.server.tick_ms == 0 {
            return Err(SandboxError::invalid_config("tick_ms must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg = SimulationConfig::from_json(r#"{"world":{"max_substeps":5},"arena":{"seed":42}}"#).unwrap();
        assert_eq!(cfg.world.max_substeps, 5);
        assert_eq!(cfg.arena.seed, 42);
        assert_eq!(cfg.world.fixed_dt, 1.0 / 60.0);
        assert_eq!(cfg.vehicle.wheels.len(), 4);
    }

    #[test]
    fn zero_substeps_rejected() {
        let err = SimulationConfig::from_json(r#"{"world":{"max_substeps":0}}"#).unwrap_err();
        assert!(err.to_string().contains("max_substeps"));
    }

    #[test]
    fn nan_sleep_threshold_rejected() {
        let mut cfg = SimulationConfig::default();
        cfg.world.sleep_time_limit = Real::NAN;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("sleep thresholds"));

        let mut cfg = SimulationConfig::default();
        cfg.world.sleep_linear_sq = Real::INFINITY;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_rest_length_rejected_from_file() {
        let mut cfg = SimulationConfig::default();
        cfg.vehicle.wheels[1].suspension_rest_length = -0.1;
        let text = serde_json::to_string(&cfg).unwrap();
        let err = SimulationConfig::from_json(&text).unwrap_err();
        assert!(matches!(err, SandboxError::InvalidWheel { index: 1, .. }));
    }
}
