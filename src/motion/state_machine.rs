// src/motion/state_machine.rs - Six-state animation machine with an explicit table
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Animation states of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnimationState {
    Idle,
    MovingForward,
    MovingBackward,
    TurningLeft,
    TurningRight,
    Stopping,
}

/// Attempted state change outside the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: AnimationState,
    pub to: AnimationState,
}

/// The transition table. Everything not listed here is rejected.
fn allows(from: AnimationState, to: AnimationState) -> bool {
    use AnimationState::*;
    matches!(
        (from, to),
        (Idle, MovingForward | MovingBackward | TurningLeft | TurningRight)
            | (MovingForward | MovingBackward, Idle | Stopping | TurningLeft | TurningRight)
            | (TurningLeft | TurningRight, Idle | MovingForward | MovingBackward | Stopping)
            | (Stopping, Idle)
    )
}

/// Sole authority over the animation state.
///
/// Callers request transitions; they never write the state directly. The
/// Stopping -> Idle edge is additionally guarded by [`try_finish_stopping`]:
/// the table permits it, but the scheduler only takes it once velocity has
/// settled and the cooldown has elapsed.
///
/// [`try_finish_stopping`]: AnimationStateMachine::try_finish_stopping
#[derive(Debug)]
pub struct AnimationStateMachine {
    state: AnimationState,
    progress: f64,
    last_change: Instant,
}

impl AnimationStateMachine {
    pub fn new(now: Instant) -> Self {
        Self {
            state: AnimationState::Idle,
            progress: 0.0,
            last_change: now,
        }
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    /// Progress of the active motion in [0, 1].
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_transitioning(&self) -> bool {
        self.state != AnimationState::Idle
    }

    pub fn time_in_state(&self, now: Instant) -> Duration {
        now.duration_since(self.last_change)
    }

    pub(crate) fn set_progress(&mut self, progress: f64) {
        self.progress = progress.clamp(0.0, 1.0);
    }

    /// Request a state change. Rejected attempts leave the machine untouched.
    pub(crate) fn transition(
        &mut self,
        to: AnimationState,
        now: Instant,
    ) -> Result<(), TransitionError> {
        if !allows(self.state, to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.progress = 0.0;
        self.last_change = now;
        Ok(())
    }

    /// Guarded Stopping -> Idle edge: taken only once measured speed is within
    /// epsilon of zero and the cooldown has elapsed since entering Stopping.
    /// Suppresses state chatter from transient interpolation noise.
    pub(crate) fn try_finish_stopping(
        &mut self,
        speed: f64,
        epsilon: f64,
        cooldown: Duration,
        now: Instant,
    ) -> bool {
        if self.state != AnimationState::Stopping {
            return false;
        }
        if speed > epsilon || self.time_in_state(now) < cooldown {
            return false;
        }
        self.state = AnimationState::Idle;
        self.progress = 0.0;
        self.last_change = now;
        true
    }

    /// Cancellation path: jump straight to Idle, bypassing the table.
    pub(crate) fn force_idle(&mut self, now: Instant) {
        self.state = AnimationState::Idle;
        self.progress = 0.0;
        self.last_change = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AnimationState::*;

    fn machine() -> AnimationStateMachine {
        AnimationStateMachine::new(Instant::now())
    }

    #[test]
    fn test_idle_accepts_motion_states() {
        for to in [MovingForward, MovingBackward, TurningLeft, TurningRight] {
            let mut m = machine();
            assert!(m.transition(to, Instant::now()).is_ok());
            assert_eq!(m.state(), to);
        }
    }

    #[test]
    fn test_idle_rejects_stopping() {
        let mut m = machine();
        let err = m.transition(Stopping, Instant::now()).unwrap_err();
        assert_eq!(err.from, Idle);
        assert_eq!(err.to, Stopping);
        assert_eq!(m.state(), Idle);
    }

    #[test]
    fn test_moving_can_turn_or_stop() {
        let now = Instant::now();
        let mut m = machine();
        m.transition(MovingForward, now).unwrap();
        assert!(m.transition(TurningLeft, now).is_ok());
        assert!(m.transition(MovingBackward, now).is_ok());
        assert!(m.transition(Stopping, now).is_ok());
        // Stopping only ever leads to Idle.
        assert!(m.transition(MovingForward, now).is_err());
        assert!(m.transition(TurningRight, now).is_err());
    }

    #[test]
    fn test_rejected_transition_is_a_noop() {
        let now = Instant::now();
        let mut m = machine();
        m.transition(TurningRight, now).unwrap();
        m.set_progress(0.5);
        assert!(m.transition(TurningRight, now).is_err());
        assert_eq!(m.state(), TurningRight);
        assert_eq!(m.progress(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_guard_requires_cooldown_and_zero_speed() {
        let cooldown = Duration::from_millis(400);
        let mut m = machine();
        let now = Instant::now();
        m.transition(MovingForward, now).unwrap();
        m.transition(Stopping, now).unwrap();

        // Too early, even with zero speed.
        assert!(!m.try_finish_stopping(0.0, 1e-3, cooldown, Instant::now()));

        tokio::time::advance(Duration::from_millis(450)).await;
        // Cooldown elapsed but still moving.
        assert!(!m.try_finish_stopping(0.5, 1e-3, cooldown, Instant::now()));
        assert_eq!(m.state(), Stopping);

        assert!(m.try_finish_stopping(1e-4, 1e-3, cooldown, Instant::now()));
        assert_eq!(m.state(), Idle);
    }
}
