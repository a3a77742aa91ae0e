// src/motion/interpolator.rs - Per-tick pose stepping: lerp translation, slerp rotation
use glam::{DQuat, DVec3};
use std::time::Duration;
use tokio::time::Instant;

use crate::pose::{Pose, PoseStore, yaw_of};

/// Which way a turn command rotates. Right turns increase the compass
/// heading (positive rotation about +Y), left turns decrease it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

/// Slerp between two orientations with explicit arc selection.
///
/// Naive slerp always takes the shortest arc, which would silently render
/// "turn right 270°" as "turn left 90°". Callers set `long_path` when the
/// requested turn exceeds 180°; the quaternion pair is then forced into the
/// hemisphere that yields the long rotation path.
pub fn slerp_arc(from: DQuat, to: DQuat, long_path: bool, t: f64) -> DQuat {
    let mut to = to;
    let mut dot = from.dot(to);
    if (dot < 0.0) != long_path {
        to = -to;
        dot = -dot;
    }
    let dot = dot.clamp(-1.0, 1.0);
    // Nearly identical orientations: slerp degenerates, nlerp is exact enough.
    if dot > 0.9995 {
        return (from * (1.0 - t) + to * t).normalize();
    }
    let theta = dot.acos();
    let sin_theta = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;
    (from * wa + to * wb).normalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanKind {
    Translate,
    Rotate,
    Stop,
    Wait,
}

/// One in-flight motion: fixed start/target endpoints plus the wall-clock
/// window over which the pose is interpolated between them.
#[derive(Debug, Clone)]
struct MotionPlan {
    kind: PlanKind,
    start_position: DVec3,
    target_position: DVec3,
    start_orientation: DQuat,
    target_orientation: DQuat,
    long_path: bool,
    /// Visual arc in degrees, signed positive for right turns; already
    /// reduced modulo 360.
    signed_arc_deg: f64,
    /// Full requested magnitude credited to the cumulative heading on
    /// completion (left positive), independent of the modulo-360 arc.
    heading_credit_deg: f64,
    initial_velocity: DVec3,
    initial_angular: DVec3,
    nominal_velocity: DVec3,
    started: Instant,
    last_step: Instant,
    duration: Duration,
}

/// Outcome of a single interpolation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepResult {
    /// No plan loaded.
    Idle,
    /// Plan advanced; progress is the clamped wall-clock fraction.
    InFlight { progress: f64 },
    /// The plan reached progress 1.0 this step: the exact target pose was
    /// written, velocities zeroed, and any heading credit applied.
    Completed,
}

/// Wall-clock driven stepper. Progress is elapsed time over the requested
/// duration, never a physics step count, so it is resilient to frame-rate
/// variance. One plan at a time: translation and rotation are exclusive
/// phases.
#[derive(Debug, Default)]
pub struct MotionInterpolator {
    plan: Option<MotionPlan>,
}

impl MotionInterpolator {
    pub fn new() -> Self {
        Self { plan: None }
    }

    pub fn is_active(&self) -> bool {
        self.plan.is_some()
    }

    pub fn clear(&mut self) {
        self.plan = None;
    }

    /// Load a translation along the current forward vector. Negative
    /// distances move backward.
    pub fn begin_translation(
        &mut self,
        pose: &Pose,
        signed_distance: f64,
        duration: Duration,
        now: Instant,
    ) {
        let duration = duration.max(Duration::from_millis(1));
        let start = pose.position;
        let target = start + pose.forward() * signed_distance;
        self.plan = Some(MotionPlan {
            kind: PlanKind::Translate,
            start_position: start,
            target_position: target,
            start_orientation: pose.orientation,
            target_orientation: pose.orientation,
            long_path: false,
            signed_arc_deg: 0.0,
            heading_credit_deg: 0.0,
            initial_velocity: DVec3::ZERO,
            initial_angular: DVec3::ZERO,
            nominal_velocity: (target - start) / duration.as_secs_f64(),
            started: now,
            last_step: now,
            duration,
        });
    }

    /// Load a rotation in place. The visual arc is the magnitude modulo 360
    /// under the long/short-path rule; the cumulative heading is credited the
    /// full magnitude on completion.
    pub fn begin_rotation(
        &mut self,
        pose: &Pose,
        direction: TurnDirection,
        magnitude_deg: f64,
        duration: Duration,
        now: Instant,
    ) {
        let duration = duration.max(Duration::from_millis(1));
        let arc = magnitude_deg.rem_euclid(360.0);
        let (signed_arc, heading_credit) = match direction {
            TurnDirection::Right => (arc, -magnitude_deg),
            TurnDirection::Left => (-arc, magnitude_deg),
        };
        let target_orientation =
            (pose.orientation * DQuat::from_rotation_y(signed_arc.to_radians())).normalize();
        self.plan = Some(MotionPlan {
            kind: PlanKind::Rotate,
            start_position: pose.position,
            target_position: pose.position,
            start_orientation: pose.orientation,
            target_orientation,
            long_path: arc > 180.0,
            signed_arc_deg: signed_arc,
            heading_credit_deg: heading_credit,
            initial_velocity: DVec3::ZERO,
            initial_angular: DVec3::ZERO,
            nominal_velocity: DVec3::ZERO,
            started: now,
            last_step: now,
            duration,
        });
    }

    /// Load a stop: current velocities decay linearly to zero over the decay
    /// window while the position coasts. There is no positional target.
    pub fn begin_stop(&mut self, pose: &Pose, decay: Duration, now: Instant) {
        let decay = decay.max(Duration::from_millis(1));
        self.plan = Some(MotionPlan {
            kind: PlanKind::Stop,
            start_position: pose.position,
            target_position: pose.position,
            start_orientation: pose.orientation,
            target_orientation: pose.orientation,
            long_path: false,
            signed_arc_deg: 0.0,
            heading_credit_deg: 0.0,
            initial_velocity: pose.velocity,
            initial_angular: pose.angular_velocity,
            nominal_velocity: DVec3::ZERO,
            started: now,
            last_step: now,
            duration: decay,
        });
    }

    /// Load a wait: the pose is left alone until the duration elapses.
    pub fn begin_wait(&mut self, duration: Duration, now: Instant) {
        let duration = duration.max(Duration::from_millis(1));
        self.plan = Some(MotionPlan {
            kind: PlanKind::Wait,
            start_position: DVec3::ZERO,
            target_position: DVec3::ZERO,
            start_orientation: DQuat::IDENTITY,
            target_orientation: DQuat::IDENTITY,
            long_path: false,
            signed_arc_deg: 0.0,
            heading_credit_deg: 0.0,
            initial_velocity: DVec3::ZERO,
            initial_angular: DVec3::ZERO,
            nominal_velocity: DVec3::ZERO,
            started: now,
            last_step: now,
            duration,
        });
    }

    /// Advance the loaded plan one tick.
    pub fn step(&mut self, store: &mut PoseStore, now: Instant) -> StepResult {
        let Some(plan) = self.plan.as_mut() else {
            return StepResult::Idle;
        };
        let elapsed = now.duration_since(plan.started).as_secs_f64();
        let t = (elapsed / plan.duration.as_secs_f64()).clamp(0.0, 1.0);
        let dt = now.duration_since(plan.last_step).as_secs_f64();
        plan.last_step = now;

        if t >= 1.0 {
            if let Some(plan) = self.plan.take() {
                Self::finalize(&plan, store);
            }
            return StepResult::Completed;
        }

        let mut pose = *store.pose();
        match plan.kind {
            PlanKind::Translate => {
                pose.position = plan.start_position.lerp(plan.target_position, t);
                pose.velocity = plan.nominal_velocity;
                pose.angular_velocity = DVec3::ZERO;
            }
            PlanKind::Rotate => {
                pose.orientation = slerp_arc(
                    plan.start_orientation,
                    plan.target_orientation,
                    plan.long_path,
                    t,
                );
                pose.velocity = DVec3::ZERO;
                pose.angular_velocity =
                    DVec3::Y * (plan.signed_arc_deg.to_radians() / plan.duration.as_secs_f64());
            }
            PlanKind::Stop => {
                pose.velocity = plan.initial_velocity * (1.0 - t);
                pose.angular_velocity = plan.initial_angular * (1.0 - t);
                pose.position += pose.velocity * dt;
            }
            PlanKind::Wait => return StepResult::InFlight { progress: t },
        }
        store.apply(pose);
        StepResult::InFlight { progress: t }
    }

    /// Drop the loaded plan without snapping to its target. A cancelled
    /// rotation credits the arc already swept, so the cumulative heading
    /// stays consistent with the quaternion the vehicle was left holding.
    pub fn cancel(&mut self, store: &mut PoseStore) {
        let Some(plan) = self.plan.take() else {
            return;
        };
        if plan.kind != PlanKind::Rotate {
            return;
        }
        let start_yaw = yaw_of(plan.start_orientation);
        let current_yaw = yaw_of(store.pose().orientation);
        // Unwrap the swept arc in the plan's direction; it never exceeds the
        // planned arc (< 360°), so one modulo recovers it exactly.
        let swept = if plan.signed_arc_deg >= 0.0 {
            (current_yaw - start_yaw).rem_euclid(360.0)
        } else {
            -((start_yaw - current_yaw).rem_euclid(360.0))
        };
        if swept != 0.0 {
            // Positive (right) sweeps subtract from the cumulative total.
            store.add_cumulative_heading(-swept);
        }
    }

    /// Snap the loaded plan straight to its end state, regardless of elapsed
    /// time. Used by stall recovery and no-op when no plan is loaded.
    pub fn force_finalize(&mut self, store: &mut PoseStore) {
        if let Some(plan) = self.plan.take() {
            Self::finalize(&plan, store);
        }
    }

    /// Exact completion: force the target pose, zero both velocities, credit
    /// the cumulative heading.
    fn finalize(plan: &MotionPlan, store: &mut PoseStore) {
        let mut pose = *store.pose();
        match plan.kind {
            PlanKind::Translate => pose.position = plan.target_position,
            PlanKind::Rotate => pose.orientation = plan.target_orientation,
            PlanKind::Stop | PlanKind::Wait => {}
        }
        pose.velocity = DVec3::ZERO;
        pose.angular_velocity = DVec3::ZERO;
        store.apply(pose);
        if plan.heading_credit_deg != 0.0 {
            store.add_cumulative_heading(plan.heading_credit_deg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::pose::{quat_for_compass, yaw_of};

    fn store() -> PoseStore {
        PoseStore::new(EventBus::new(64), Instant::now())
    }

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_short_path_slerp_midpoint() {
        let from = DQuat::IDENTITY;
        let to = quat_for_compass(90.0);
        let mid = slerp_arc(from, to, false, 0.5);
        assert!((yaw_of(mid) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_path_slerp_takes_the_long_arc() {
        // Right 270° ends where left 90° would, but must pass through 135°,
        // not through 315°.
        let from = DQuat::IDENTITY;
        let to = (from * DQuat::from_rotation_y(270f64.to_radians())).normalize();
        let mid = slerp_arc(from, to, true, 0.5);
        assert!((yaw_of(mid) - 135.0).abs() < 1e-6);

        let short_mid = slerp_arc(from, to, false, 0.5);
        assert!((yaw_of(short_mid) - 315.0).abs() < 1e-6);
    }

    #[test]
    fn test_translation_lerps_and_snaps_exactly() {
        let mut store = store();
        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_translation(store.pose(), 4.0, Duration::from_millis(1000), start);

        match interp.step(&mut store, at(start, 500)) {
            StepResult::InFlight { progress } => assert!((progress - 0.5).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
        assert!((store.pose().position.z - 2.0).abs() < 1e-9);
        assert!((store.pose().velocity.z - 4.0).abs() < 1e-9);

        assert_eq!(interp.step(&mut store, at(start, 1000)), StepResult::Completed);
        assert_eq!(store.pose().position, DVec3::new(0.0, 0.0, 4.0));
        assert_eq!(store.pose().velocity, DVec3::ZERO);
        assert!(!interp.is_active());
    }

    #[test]
    fn test_rotation_credits_full_magnitude() {
        let mut store = store();
        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_rotation(
            store.pose(),
            TurnDirection::Left,
            270.0,
            Duration::from_millis(1000),
            start,
        );

        interp.step(&mut store, at(start, 500));
        // Left long path: heading runs 0 -> 359.9... -> 225 at midpoint.
        assert!((store.pose().heading_deg() - 225.0).abs() < 1e-6);

        assert_eq!(interp.step(&mut store, at(start, 1000)), StepResult::Completed);
        assert_eq!(store.cumulative_heading_deg(), 270.0);
        assert!((store.pose().heading_deg() - 90.0).abs() < 1e-6);
        assert!(store.heading_consistent(1e-6));
    }

    #[test]
    fn test_full_turn_reduces_to_zero_arc() {
        let mut store = store();
        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_rotation(
            store.pose(),
            TurnDirection::Right,
            360.0,
            Duration::from_millis(500),
            start,
        );
        interp.step(&mut store, at(start, 250));
        assert!(store.pose().heading_deg().abs() < 1e-6);

        interp.step(&mut store, at(start, 500));
        assert_eq!(store.cumulative_heading_deg(), -360.0);
        assert!(store.heading_consistent(1e-6));
    }

    #[test]
    fn test_stop_decays_velocity_while_coasting() {
        let mut store = store();
        let mut pose = *store.pose();
        pose.velocity = DVec3::new(0.0, 0.0, 2.0);
        store.apply(pose);

        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_stop(store.pose(), Duration::from_millis(300), start);

        interp.step(&mut store, at(start, 150));
        assert!((store.pose().velocity.z - 1.0).abs() < 1e-9);
        assert!(store.pose().position.z > 0.0);

        assert_eq!(interp.step(&mut store, at(start, 300)), StepResult::Completed);
        assert_eq!(store.pose().velocity, DVec3::ZERO);
    }

    #[test]
    fn test_cancelled_rotation_credits_swept_arc() {
        let mut store = store();
        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_rotation(
            store.pose(),
            TurnDirection::Right,
            90.0,
            Duration::from_millis(1000),
            start,
        );
        interp.step(&mut store, at(start, 500));
        assert!((store.pose().heading_deg() - 45.0).abs() < 1e-9);

        interp.cancel(&mut store);
        assert!(!interp.is_active());
        // Half the right turn swept: -45, matching the quaternion.
        assert!((store.cumulative_heading_deg() + 45.0).abs() < 1e-9);
        assert!(store.heading_consistent(1e-9));
    }

    #[test]
    fn test_cancelled_long_left_turn_stays_consistent() {
        let mut store = store();
        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_rotation(
            store.pose(),
            TurnDirection::Left,
            270.0,
            Duration::from_millis(1000),
            start,
        );
        interp.step(&mut store, at(start, 500));
        interp.cancel(&mut store);

        // 135° of the left arc swept; compass 225 agrees with cumulative 135.
        assert!((store.cumulative_heading_deg() - 135.0).abs() < 1e-6);
        assert!((store.pose().heading_deg() - 225.0).abs() < 1e-6);
        assert!(store.heading_consistent(1e-6));
    }

    #[test]
    fn test_cancelled_translation_credits_nothing() {
        let mut store = store();
        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_translation(store.pose(), 4.0, Duration::from_millis(1000), start);
        interp.step(&mut store, at(start, 500));

        interp.cancel(&mut store);
        assert!(!interp.is_active());
        assert_eq!(store.cumulative_heading_deg(), 0.0);
    }

    #[test]
    fn test_force_finalize_snaps_mid_flight() {
        let mut store = store();
        let mut interp = MotionInterpolator::new();
        let start = Instant::now();
        interp.begin_translation(store.pose(), 6.0, Duration::from_millis(1000), start);
        interp.step(&mut store, at(start, 200));

        interp.force_finalize(&mut store);
        assert_eq!(store.pose().position, DVec3::new(0.0, 0.0, 6.0));
        assert_eq!(store.pose().velocity, DVec3::ZERO);
        assert!(!interp.is_active());
    }
}
