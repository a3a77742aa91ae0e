// src/scheduler.rs - Command sequencing core: owns pose, queue, machine, interpolator
use chrono::Utc;
use glam::DVec3;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::command::{
    Command, CommandError, CommandKind, CommandQueue, CommandRecord, Disposition,
    validate_magnitude,
};
use crate::config::Config;
use crate::events::{EventBus, VehicleEvent};
use crate::motion::drift::DriftGuard;
use crate::motion::interpolator::{MotionInterpolator, StepResult, TurnDirection};
use crate::motion::state_machine::{AnimationState, AnimationStateMachine};
use crate::pose::{PoseSnapshot, PoseStore};

/// Where the active command currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// The interpolator is stepping the plan every tick.
    Interpolating,
    /// The exact target has been snapped; completion is signaled once the
    /// settle delay passes.
    Settling { until: Instant },
    /// Stop only: velocity has decayed, waiting on the Stopping -> Idle guard.
    AwaitingStopIdle,
}

#[derive(Debug)]
struct ActiveCommand {
    command: Command,
    phase: Phase,
    stall_deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Telemetry {
    battery_pct: f64,
    odometer: f64,
}

impl Telemetry {
    fn new() -> Self {
        Self {
            battery_pct: 100.0,
            odometer: 0.0,
        }
    }
}

/// Serializable point-in-time view of the whole engine.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub vehicle: String,
    pub pose: PoseSnapshot,
    pub animation_state: AnimationState,
    pub progress: f64,
    pub is_transitioning: bool,
    pub busy: bool,
    pub queue_depth: usize,
    pub battery_pct: f64,
    pub odometer: f64,
    pub uptime_ms: u64,
}

/// The single movement authority.
///
/// Every command source feeds this one queue; the scheduler starts at most
/// one command at a time, drives the interpolator until completion, and
/// debounces before advancing to the next. Observers never touch the owned
/// state directly; they get snapshots through the event bus.
pub struct Scheduler {
    config: Config,
    pose: PoseStore,
    queue: CommandQueue,
    machine: AnimationStateMachine,
    interpolator: MotionInterpolator,
    drift: DriftGuard,
    events: EventBus,
    active: Option<ActiveCommand>,
    debounce_until: Option<Instant>,
    running: bool,
    in_tick: bool,
    telemetry: Telemetry,
    created_at: Instant,
}

impl Scheduler {
    pub fn new(config: Config, events: EventBus, now: Instant) -> Self {
        Self {
            pose: PoseStore::new(events.clone(), now),
            queue: CommandQueue::new(config.scheduler.history_limit),
            machine: AnimationStateMachine::new(now),
            interpolator: MotionInterpolator::new(),
            drift: DriftGuard::new(config.drift.clone()),
            events,
            active: None,
            debounce_until: None,
            running: true,
            in_tick: false,
            telemetry: Telemetry::new(),
            created_at: now,
            config,
        }
    }

    /// Validate and accept a command. Stop is handled on arrival; everything
    /// else joins the FIFO tail.
    pub fn enqueue(
        &mut self,
        kind: CommandKind,
        magnitude: f64,
        duration_ms: u64,
        now: Instant,
    ) -> Result<Uuid, CommandError> {
        if let Err(error) = validate_magnitude(magnitude) {
            tracing::warn!(?kind, magnitude, %error, "rejected command");
            self.events.publish(VehicleEvent::CommandRejected {
                kind,
                error: error.clone(),
            });
            return Err(error);
        }

        let duration = self.resolve_duration(kind, magnitude, duration_ms);
        let command = Command::new(kind, magnitude, duration);
        let id = command.id;

        if kind == CommandKind::Stop {
            self.begin_stop(command, now);
        } else {
            tracing::debug!(%id, ?kind, magnitude, ?duration, "command queued");
            self.queue.push(command);
        }
        Ok(id)
    }

    /// One engine tick. Never re-enters itself: a tick that somehow fires
    /// while another is in progress is dropped, not nested.
    pub fn tick(&mut self, now: Instant) {
        if self.in_tick {
            tracing::warn!("re-entrant tick suppressed");
            return;
        }
        self.in_tick = true;
        self.step(now);
        self.in_tick = false;
    }

    /// Hard cancel. Clears the queue, nulls the active command, forces Idle,
    /// drops every pending deadline, and restores pose and telemetry to their
    /// initial values. Idempotent.
    pub fn reset(&mut self, now: Instant) {
        tracing::info!("engine reset");
        if let Some(active) = self.active.take() {
            self.finish(active.command, Disposition::Cancelled);
        }
        for command in self.queue.drain_pending() {
            self.finish(command, Disposition::Cancelled);
        }
        self.interpolator.clear();
        self.debounce_until = None;
        let from = self.machine.state();
        self.machine.force_idle(now);
        if from != AnimationState::Idle {
            self.events.publish(VehicleEvent::StateChanged {
                from,
                to: AnimationState::Idle,
            });
        }
        self.drift.reset();
        self.pose.reset(now);
        self.telemetry = Telemetry::new();
        self.events.publish(VehicleEvent::Reset);
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn animation_state(&self) -> AnimationState {
        self.machine.state()
    }

    pub fn pose_snapshot(&self) -> PoseSnapshot {
        self.pose.snapshot()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn history(&self) -> Vec<CommandRecord> {
        self.queue.history().cloned().collect()
    }

    pub fn battery_pct(&self) -> f64 {
        self.telemetry.battery_pct
    }

    pub fn odometer(&self) -> f64 {
        self.telemetry.odometer
    }

    pub fn status(&self, now: Instant) -> StatusReport {
        StatusReport {
            vehicle: self.config.vehicle.name.clone(),
            pose: self.pose.snapshot(),
            animation_state: self.machine.state(),
            progress: self.machine.progress(),
            is_transitioning: self.machine.is_transitioning(),
            busy: self.is_busy(),
            queue_depth: self.queue.len(),
            battery_pct: self.telemetry.battery_pct,
            odometer: self.telemetry.odometer,
            uptime_ms: now.duration_since(self.created_at).as_millis() as u64,
        }
    }

    /// Fault-injection hook: apply the kind of stray pose write DriftGuard
    /// exists to catch.
    pub fn inject_disturbance(&mut self, position_offset: DVec3, velocity: DVec3) {
        let mut pose = *self.pose.pose();
        pose.position += position_offset;
        pose.velocity += velocity;
        self.pose.apply(pose);
    }

    fn resolve_duration(&self, kind: CommandKind, magnitude: f64, duration_ms: u64) -> Duration {
        if duration_ms > 0 {
            return Duration::from_millis(duration_ms);
        }
        let min = Duration::from_millis(self.config.motion.min_duration_ms);
        match kind {
            CommandKind::MoveForward | CommandKind::MoveBackward => {
                self.config.motion.move_duration(magnitude)
            }
            CommandKind::TurnLeft | CommandKind::TurnRight => {
                self.config.motion.turn_duration(magnitude)
            }
            // Without an explicit duration, Wait's magnitude is seconds.
            CommandKind::Wait => Duration::from_secs_f64(magnitude).max(min),
            CommandKind::Stop => Duration::from_millis(self.config.motion.stopping_decay_ms),
        }
    }

    fn step(&mut self, now: Instant) {
        // DriftGuard is armed whenever the machine reports Idle, including
        // while a Wait command holds the scheduler busy.
        if self.machine.state() == AnimationState::Idle {
            self.drift.check(&mut self.pose, now);
        }

        if let Some(mut active) = self.active.take() {
            if now >= active.stall_deadline {
                self.stall_finalize(active, now);
                return;
            }
            match active.phase {
                Phase::Interpolating => match self.interpolator.step(&mut self.pose, now) {
                    StepResult::InFlight { progress } => {
                        self.machine.set_progress(progress);
                        self.active = Some(active);
                    }
                    StepResult::Completed => {
                        self.machine.set_progress(1.0);
                        active.phase = if active.command.kind == CommandKind::Stop {
                            Phase::AwaitingStopIdle
                        } else {
                            Phase::Settling {
                                until: now
                                    + Duration::from_millis(self.config.scheduler.settle_ms),
                            }
                        };
                        self.active = Some(active);
                    }
                    StepResult::Idle => {
                        tracing::warn!(
                            id = %active.command.id,
                            "active command lost its motion plan, finalizing"
                        );
                        self.complete(active, Disposition::ForceFinalized, now);
                    }
                },
                Phase::Settling { until } => {
                    if now >= until {
                        self.complete(active, Disposition::Completed, now);
                    } else {
                        self.active = Some(active);
                    }
                }
                Phase::AwaitingStopIdle => {
                    let speed = self.pose.pose().speed();
                    let finished = self.machine.try_finish_stopping(
                        speed,
                        self.config.motion.velocity_epsilon,
                        Duration::from_millis(self.config.motion.stopping_cooldown_ms),
                        now,
                    );
                    if finished {
                        self.events.publish(VehicleEvent::StateChanged {
                            from: AnimationState::Stopping,
                            to: AnimationState::Idle,
                        });
                        self.pose.record_idle_snapshot(now);
                        self.complete(active, Disposition::Completed, now);
                    } else {
                        self.active = Some(active);
                    }
                }
            }
            return;
        }

        // Nothing active: advance the queue once the debounce window passes.
        if let Some(until) = self.debounce_until {
            if now < until {
                return;
            }
            self.debounce_until = None;
        }
        if self.running && !self.queue.is_empty() {
            self.start_next(now);
        }
    }

    fn start_next(&mut self, now: Instant) {
        let Some(mut command) = self.queue.pop() else {
            return;
        };
        let pose = *self.pose.pose();
        let started = match command.kind {
            CommandKind::MoveForward | CommandKind::MoveBackward => {
                let forward = command.kind == CommandKind::MoveForward;
                let state = if forward {
                    AnimationState::MovingForward
                } else {
                    AnimationState::MovingBackward
                };
                if self.transition(state, now) {
                    let signed = if forward {
                        command.magnitude
                    } else {
                        -command.magnitude
                    };
                    self.interpolator
                        .begin_translation(&pose, signed, command.duration, now);
                    true
                } else {
                    false
                }
            }
            CommandKind::TurnLeft | CommandKind::TurnRight => {
                let left = command.kind == CommandKind::TurnLeft;
                let state = if left {
                    AnimationState::TurningLeft
                } else {
                    AnimationState::TurningRight
                };
                let direction = if left {
                    TurnDirection::Left
                } else {
                    TurnDirection::Right
                };
                if self.transition(state, now) {
                    self.interpolator.begin_rotation(
                        &pose,
                        direction,
                        command.magnitude,
                        command.duration,
                        now,
                    );
                    true
                } else {
                    false
                }
            }
            // Wait holds position: the machine stays Idle and DriftGuard
            // stays armed.
            CommandKind::Wait => {
                self.interpolator.begin_wait(command.duration, now);
                true
            }
            // Stop never reaches the queue; archive defensively.
            CommandKind::Stop => {
                self.finish(command, Disposition::Completed);
                return;
            }
        };

        if !started {
            self.finish(command, Disposition::Cancelled);
            return;
        }

        command.started_at = Some(Utc::now());
        tracing::debug!(
            id = %command.id,
            kind = ?command.kind,
            magnitude = command.magnitude,
            "command started"
        );
        self.events.publish(VehicleEvent::CommandStarted {
            id: command.id,
            kind: command.kind,
        });
        let stall_deadline = now
            + command.duration
            + Duration::from_millis(self.config.scheduler.stall_timeout_ms);
        self.active = Some(ActiveCommand {
            command,
            phase: Phase::Interpolating,
            stall_deadline,
        });
    }

    /// Stop does not queue behind pending work: it cancels the backlog,
    /// preempts any active motion through Stopping, and decays velocity.
    fn begin_stop(&mut self, mut command: Command, now: Instant) {
        for pending in self.queue.drain_pending() {
            self.finish(pending, Disposition::Cancelled);
        }
        if let Some(active) = self.active.take() {
            if active.command.kind == CommandKind::Stop {
                // A stop is already winding down; fold the new one into it.
                tracing::debug!(id = %command.id, "stop folded into active stop");
                self.active = Some(active);
                command.started_at = Some(Utc::now());
                self.events.publish(VehicleEvent::CommandStarted {
                    id: command.id,
                    kind: command.kind,
                });
                self.finish(command, Disposition::Completed);
                return;
            }
            if matches!(active.phase, Phase::Settling { .. }) {
                // The motion already snapped to its target; it finished, the
                // stop only shortcuts the settle delay.
                self.complete(active, Disposition::Completed, now);
            } else {
                // Genuinely in flight: drop the plan, crediting any swept
                // arc so the cumulative heading stays consistent.
                self.interpolator.cancel(&mut self.pose);
                self.finish(active.command, Disposition::Cancelled);
            }
        }

        command.started_at = Some(Utc::now());
        self.events.publish(VehicleEvent::CommandStarted {
            id: command.id,
            kind: command.kind,
        });

        if self.machine.state() == AnimationState::Idle {
            // Nothing is moving; the stop is a no-op.
            tracing::debug!(id = %command.id, "stop while idle, archiving as no-op");
            self.finish(command, Disposition::Completed);
            return;
        }

        if !self.transition(AnimationState::Stopping, now) {
            self.finish(command, Disposition::Completed);
            return;
        }

        let decay = command.duration;
        let pose = *self.pose.pose();
        self.interpolator.begin_stop(&pose, decay, now);
        let stall_deadline =
            now + decay + Duration::from_millis(self.config.scheduler.stall_timeout_ms);
        tracing::debug!(id = %command.id, "stop preempting active motion");
        self.active = Some(ActiveCommand {
            command,
            phase: Phase::Interpolating,
            stall_deadline,
        });
    }

    /// Normal completion: take the direct edge back to Idle, account the
    /// battery and odometer, archive, and arm the debounce window.
    fn complete(&mut self, active: ActiveCommand, disposition: Disposition, now: Instant) {
        if self.machine.state() != AnimationState::Idle {
            self.transition(AnimationState::Idle, now);
        } else {
            self.machine.set_progress(0.0);
        }
        self.account(&active.command);
        self.finish(active.command, disposition);
        self.debounce_until =
            Some(now + Duration::from_millis(self.config.scheduler.debounce_ms));
    }

    /// StalledCompletion recovery: the motion visibly reaches its target
    /// instead of hanging. Snap, zero velocities, advance state, archive.
    fn stall_finalize(&mut self, active: ActiveCommand, now: Instant) {
        tracing::warn!(
            id = %active.command.id,
            kind = ?active.command.kind,
            "motion stalled past its deadline, force-finalizing"
        );
        if self.interpolator.is_active() {
            self.interpolator.force_finalize(&mut self.pose);
        } else {
            let mut pose = *self.pose.pose();
            pose.velocity = DVec3::ZERO;
            pose.angular_velocity = DVec3::ZERO;
            self.pose.apply(pose);
        }
        self.complete(active, Disposition::ForceFinalized, now);
    }

    /// Table-checked transition; Idle entries also refresh the idle snapshot.
    fn transition(&mut self, to: AnimationState, now: Instant) -> bool {
        let from = self.machine.state();
        match self.machine.transition(to, now) {
            Ok(()) => {
                self.events.publish(VehicleEvent::StateChanged { from, to });
                if to == AnimationState::Idle {
                    self.pose.record_idle_snapshot(now);
                }
                true
            }
            Err(error) => {
                tracing::warn!(%error, "transition rejected");
                false
            }
        }
    }

    fn account(&mut self, command: &Command) {
        match command.kind {
            CommandKind::MoveForward | CommandKind::MoveBackward => {
                self.telemetry.battery_pct -=
                    self.config.telemetry.move_cost_per_unit * command.magnitude;
                self.telemetry.odometer += command.magnitude;
            }
            CommandKind::TurnLeft | CommandKind::TurnRight => {
                self.telemetry.battery_pct -= self.config.telemetry.turn_cost;
            }
            CommandKind::Stop | CommandKind::Wait => {}
        }
        self.telemetry.battery_pct = self.telemetry.battery_pct.max(0.0);
    }

    fn finish(&mut self, mut command: Command, disposition: Disposition) {
        command.completed_at = Some(Utc::now());
        tracing::debug!(id = %command.id, ?disposition, "command finished");
        self.events.publish(VehicleEvent::CommandFinished {
            id: command.id,
            kind: command.kind,
            disposition,
        });
        self.queue.archive(command.into_record(disposition));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(16);

    fn engine() -> Scheduler {
        Scheduler::new(Config::default(), EventBus::new(256), Instant::now())
    }

    async fn run_for(engine: &mut Scheduler, ms: u64) {
        for _ in 0..(ms / 16 + 1) {
            engine.tick(Instant::now());
            tokio::time::advance(TICK).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_idle_is_a_noop() {
        let mut engine = engine();
        engine
            .enqueue(CommandKind::Stop, 0.0, 0, Instant::now())
            .unwrap();
        assert!(!engine.is_busy());
        assert_eq!(engine.animation_state(), AnimationState::Idle);
        let history = engine.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].disposition, Disposition::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_occupies_scheduler_but_machine_stays_idle() {
        let mut engine = engine();
        engine
            .enqueue(CommandKind::Wait, 0.0, 300, Instant::now())
            .unwrap();
        run_for(&mut engine, 100).await;
        assert!(engine.is_busy());
        assert_eq!(engine.animation_state(), AnimationState::Idle);

        run_for(&mut engine, 600).await;
        assert!(!engine.is_busy());
        assert_eq!(engine.pose_snapshot().position, DVec3::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_do_not_start_during_debounce() {
        let mut engine = engine();
        let now = Instant::now();
        engine.enqueue(CommandKind::MoveForward, 1.0, 100, now).unwrap();
        engine.enqueue(CommandKind::MoveForward, 1.0, 100, now).unwrap();

        // Drive until the first command archives, then observe the gap.
        let mut saw_gap_ticks = 0;
        let mut started_second = false;
        for _ in 0..200 {
            engine.tick(Instant::now());
            if engine.history().len() == 1 && !engine.is_busy() {
                saw_gap_ticks += 1;
            }
            if engine.history().len() == 1 && engine.is_busy() {
                started_second = true;
                break;
            }
            tokio::time::advance(TICK).await;
        }
        assert!(started_second);
        // 75 ms debounce at 16 ms ticks leaves at least four idle ticks.
        assert!(saw_gap_ticks >= 4, "gap was {saw_gap_ticks} ticks");
    }

    #[tokio::test(start_paused = true)]
    async fn test_derived_duration_for_unspecified_commands() {
        let engine = engine();
        // 2 units at 2 units/s.
        assert_eq!(
            engine.resolve_duration(CommandKind::MoveForward, 2.0, 0),
            Duration::from_millis(1000)
        );
        // Explicit duration wins.
        assert_eq!(
            engine.resolve_duration(CommandKind::MoveForward, 2.0, 250),
            Duration::from_millis(250)
        );
        // Wait magnitude is seconds.
        assert_eq!(
            engine.resolve_duration(CommandKind::Wait, 1.5, 0),
            Duration::from_millis(1500)
        );
    }
}
