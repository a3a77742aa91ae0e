// src/lib.rs - obosim: movement command execution engine for a simulated vehicle
//
// Discrete motion instructions (move, turn, stop, wait) enter one FIFO queue;
// a scheduler runs them one at a time through a six-state animation machine,
// interpolating the pose every tick (lerp for translation, quaternion slerp
// for rotation) and correcting drift whenever the idle pose is perturbed.

pub mod command;
pub mod config;
pub mod events;
pub mod motion;
pub mod pose;
pub mod scheduler;
pub mod sensors;
pub mod vehicle;

pub use command::{Command, CommandError, CommandKind, CommandRecord, Disposition};
pub use config::{Config, ConfigError};
pub use events::{EventBus, VehicleEvent};
pub use motion::state_machine::AnimationState;
pub use pose::{Pose, PoseSnapshot, PoseStore};
pub use scheduler::{Scheduler, StatusReport};
pub use sensors::{ObstacleField, SensorProvider, SensorReadings};
pub use vehicle::{Vehicle, VehicleError};
