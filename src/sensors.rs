// src/sensors.rs - Rangefinder simulation behind a provider trait
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::SensorConfig;
use crate::pose::{PoseSnapshot, wrap_deg};

/// Distance readings relative to the current compass heading: front looks
/// along the heading, right at +90°, back at +180°, left at +270°.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub front: f64,
    pub right: f64,
    pub back: f64,
    pub left: f64,
}

/// Geometry seam for `get_sensors`. The engine does not care where readings
/// come from; an external raycasting collaborator implements this the same
/// way the built-in [`ObstacleField`] does.
pub trait SensorProvider: Send {
    fn sample(&mut self, pose: &PoseSnapshot) -> SensorReadings;
}

/// Planar obstacle field: point obstacles on the ground plane, a detection
/// cone around each sensor direction, uniform measurement noise, and a floor
/// on the reported reading. An empty cone reports max range.
#[derive(Debug)]
pub struct ObstacleField {
    config: SensorConfig,
    obstacles: Vec<DVec3>,
    rng: StdRng,
}

impl ObstacleField {
    pub fn new(config: SensorConfig, obstacles: Vec<DVec3>, seed: u64) -> Self {
        Self {
            config,
            obstacles,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn empty(config: SensorConfig) -> Self {
        Self::new(config, Vec::new(), 0)
    }

    /// Obstacles scattered uniformly in a square of the given half-extent.
    pub fn scatter(config: SensorConfig, count: usize, extent: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let obstacles = (0..count)
            .map(|_| {
                DVec3::new(
                    rng.random_range(-extent..=extent),
                    0.0,
                    rng.random_range(-extent..=extent),
                )
            })
            .collect();
        Self {
            config,
            obstacles,
            rng,
        }
    }

    /// A wall crossing +Z at the given distance from the origin.
    pub fn wall(config: SensorConfig, distance: f64, half_width: f64) -> Self {
        let mut obstacles = Vec::new();
        let mut x = -half_width;
        while x <= half_width {
            obstacles.push(DVec3::new(x, 0.0, distance));
            x += 0.5;
        }
        Self::new(config, obstacles, 0)
    }

    /// A ring of obstacles around the origin.
    pub fn circle(config: SensorConfig, radius: f64, count: usize) -> Self {
        let obstacles = (0..count)
            .map(|i| {
                let theta = i as f64 / count as f64 * std::f64::consts::TAU;
                DVec3::new(radius * theta.sin(), 0.0, radius * theta.cos())
            })
            .collect();
        Self::new(config, obstacles, 0)
    }

    fn reading_along(&mut self, position: DVec3, bearing_deg: f64) -> f64 {
        let mut nearest = self.config.range;
        for obstacle in &self.obstacles {
            let delta = *obstacle - position;
            let distance = DVec3::new(delta.x, 0.0, delta.z).length();
            if distance > self.config.range || distance < f64::EPSILON {
                continue;
            }
            let obstacle_bearing = delta.x.atan2(delta.z).to_degrees();
            if wrap_deg(obstacle_bearing - bearing_deg).abs() > self.config.cone_deg {
                continue;
            }
            nearest = nearest.min(distance);
        }
        if self.config.noise > 0.0 {
            nearest += self.rng.random_range(-self.config.noise..=self.config.noise);
        }
        nearest.max(self.config.min_reading)
    }
}

impl SensorProvider for ObstacleField {
    fn sample(&mut self, pose: &PoseSnapshot) -> SensorReadings {
        let heading = pose.heading_deg;
        SensorReadings {
            front: self.reading_along(pose.position, heading),
            right: self.reading_along(pose.position, heading + 90.0),
            back: self.reading_along(pose.position, heading + 180.0),
            left: self.reading_along(pose.position, heading + 270.0),
        }
    }
}
