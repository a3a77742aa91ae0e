// src/motion/drift.rs - Idle drift detection and snapback
use glam::DVec3;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DriftConfig;
use crate::pose::PoseStore;

/// Corrective pass for a nominally resting vehicle.
///
/// While the machine is Idle, rounding error or a stray write can leave a
/// residual velocity or nudge the position away from the last idle snapshot.
/// When either exceeds its threshold and the cooldown has elapsed, the guard
/// zeroes both velocities and repositions to the snapshot, preserving the
/// current orientation.
#[derive(Debug)]
pub struct DriftGuard {
    config: DriftConfig,
    last_correction: Option<Instant>,
}

impl DriftGuard {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            last_correction: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_correction = None;
    }

    /// Inspect the pose against the idle snapshot; returns true when a
    /// correction was applied.
    pub(crate) fn check(&mut self, store: &mut PoseStore, now: Instant) -> bool {
        let pose = *store.pose();
        let snapshot = *store.idle_snapshot();

        let residual_speed = pose
            .velocity
            .length()
            .max(pose.angular_velocity.length());
        let deviation = (pose.position - snapshot.position).length();

        if residual_speed <= self.config.velocity_threshold
            && deviation <= self.config.position_threshold
        {
            return false;
        }

        if let Some(last) = self.last_correction {
            if now.duration_since(last) < Duration::from_millis(self.config.cooldown_ms) {
                return false;
            }
        }

        tracing::debug!(
            residual_speed,
            deviation,
            "drift detected while idle, snapping back to the idle snapshot"
        );

        let mut corrected = pose;
        corrected.position = snapshot.position;
        corrected.velocity = DVec3::ZERO;
        corrected.angular_velocity = DVec3::ZERO;
        store.apply(corrected);

        self.last_correction = Some(now);
        true
    }
}
