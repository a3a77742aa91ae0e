// src/pose.rs - Authoritative vehicle pose and heading bookkeeping
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::events::{EventBus, VehicleEvent};

/// Position plus orientation of the simulated vehicle, with the velocities
/// the interpolator is currently commanding.
///
/// Orientation is stored exclusively as a quaternion; degrees exist only at
/// the interface boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub orientation: DQuat,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
        }
    }
}

impl Pose {
    /// Unit vector the vehicle is facing. At identity orientation this is +Z.
    pub fn forward(&self) -> DVec3 {
        self.orientation * DVec3::Z
    }

    /// Compass heading in [0°, 360°) derived from the orientation.
    pub fn heading_deg(&self) -> f64 {
        yaw_of(self.orientation)
    }

    /// Linear speed (units/s).
    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }

    /// True when every component is finite and the quaternion is unit length.
    pub fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.angular_velocity.is_finite()
            && self.orientation.is_finite()
            && (self.orientation.length() - 1.0).abs() < 1e-6
    }
}

/// Wrap an angle into (−180°, 180°].
pub fn wrap_deg(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Compass heading in [0°, 360°) for a cumulative (left-positive) total.
/// Compass runs the other way: right turns increase it.
pub fn compass_deg(cumulative_deg: f64) -> f64 {
    (-cumulative_deg).rem_euclid(360.0)
}

/// Compass yaw in [0°, 360°) extracted from a yaw-only quaternion.
pub fn yaw_of(orientation: DQuat) -> f64 {
    let f = orientation * DVec3::Z;
    f.x.atan2(f.z).to_degrees().rem_euclid(360.0)
}

/// Quaternion for a compass heading in degrees.
pub fn quat_for_compass(heading_deg: f64) -> DQuat {
    DQuat::from_rotation_y(heading_deg.to_radians())
}

/// Read-only copy of the pose handed to observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub position: DVec3,
    pub orientation: DQuat,
    pub velocity: DVec3,
    /// Compass heading in [0°, 360°); 0 faces +Z, 90 faces +X.
    pub heading_deg: f64,
    /// Unwrapped signed total rotation; left turns add, right turns subtract.
    pub cumulative_heading_deg: f64,
}

/// Pose recorded on every Idle entry; the reference DriftGuard snaps back to.
#[derive(Debug, Clone, Copy)]
pub struct IdleSnapshot {
    pub position: DVec3,
    pub orientation: DQuat,
    pub taken_at: Instant,
}

/// Single authoritative pose store.
///
/// Mutation is crate-internal: only the interpolator, the drift guard, and
/// reset write here. Observers receive [`PoseSnapshot`] clones through the
/// event bus.
#[derive(Debug)]
pub struct PoseStore {
    pose: Pose,
    cumulative_heading_deg: f64,
    idle_snapshot: IdleSnapshot,
    events: EventBus,
}

impl PoseStore {
    pub fn new(events: EventBus, now: Instant) -> Self {
        Self {
            pose: Pose::default(),
            cumulative_heading_deg: 0.0,
            idle_snapshot: IdleSnapshot {
                position: DVec3::ZERO,
                orientation: DQuat::IDENTITY,
                taken_at: now,
            },
            events,
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn cumulative_heading_deg(&self) -> f64 {
        self.cumulative_heading_deg
    }

    pub fn idle_snapshot(&self) -> &IdleSnapshot {
        &self.idle_snapshot
    }

    pub fn snapshot(&self) -> PoseSnapshot {
        PoseSnapshot {
            position: self.pose.position,
            orientation: self.pose.orientation,
            velocity: self.pose.velocity,
            heading_deg: self.pose.heading_deg(),
            cumulative_heading_deg: self.cumulative_heading_deg,
        }
    }

    /// Write a new pose. The orientation is re-normalized so accumulated
    /// interpolation error can never leave a non-unit quaternion behind.
    pub(crate) fn apply(&mut self, mut pose: Pose) {
        pose.orientation = pose.orientation.normalize();
        debug_assert!(pose.is_valid(), "pose writes must stay finite");
        self.pose = pose;
        self.events.publish(VehicleEvent::PoseChanged(self.snapshot()));
    }

    /// Credit a completed turn to the unwrapped total.
    pub(crate) fn add_cumulative_heading(&mut self, deg: f64) {
        self.cumulative_heading_deg += deg;
    }

    /// Record the reference pose DriftGuard corrects back to. Called on every
    /// Idle entry and nowhere else.
    pub(crate) fn record_idle_snapshot(&mut self, now: Instant) {
        self.idle_snapshot = IdleSnapshot {
            position: self.pose.position,
            orientation: self.pose.orientation,
            taken_at: now,
        };
    }

    /// Restore the origin pose. Velocities, cumulative heading, and the idle
    /// snapshot all return to their initial values.
    pub(crate) fn reset(&mut self, now: Instant) {
        self.pose = Pose::default();
        self.cumulative_heading_deg = 0.0;
        self.idle_snapshot = IdleSnapshot {
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            taken_at: now,
        };
        self.events.publish(VehicleEvent::PoseChanged(self.snapshot()));
    }

    /// Consistency check between the quaternion and the unwrapped total:
    /// they must agree modulo 360° within epsilon.
    pub fn heading_consistent(&self, epsilon_deg: f64) -> bool {
        let from_quat = self.pose.heading_deg();
        let from_total = compass_deg(self.cumulative_heading_deg);
        let diff = wrap_deg(from_quat - from_total).abs();
        diff <= epsilon_deg
    }
}
