// src/motion/mod.rs
pub mod drift;
pub mod interpolator;
pub mod state_machine;

pub use drift::DriftGuard;
pub use interpolator::{MotionInterpolator, StepResult, TurnDirection, slerp_arc};
pub use state_machine::{AnimationState, AnimationStateMachine, TransitionError};
