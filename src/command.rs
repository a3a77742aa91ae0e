// src/command.rs - Motion commands, validation, FIFO queue and history
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Discrete motion instruction kinds accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    MoveForward,
    MoveBackward,
    TurnLeft,
    TurnRight,
    Stop,
    Wait,
}

impl CommandKind {
    pub fn is_move(self) -> bool {
        matches!(self, CommandKind::MoveForward | CommandKind::MoveBackward)
    }

    pub fn is_turn(self) -> bool {
        matches!(self, CommandKind::TurnLeft | CommandKind::TurnRight)
    }
}

/// Rejection reasons checked at enqueue time, before any state mutation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("magnitude must be non-negative, got {0}")]
    NegativeMagnitude(f64),

    #[error("magnitude must be finite")]
    NonFiniteMagnitude,
}

/// Enqueue-time magnitude validation. Distances and degrees must be finite
/// and non-negative; direction is carried by the command kind.
pub fn validate_magnitude(magnitude: f64) -> Result<(), CommandError> {
    if !magnitude.is_finite() {
        return Err(CommandError::NonFiniteMagnitude);
    }
    if magnitude < 0.0 {
        return Err(CommandError::NegativeMagnitude(magnitude));
    }
    Ok(())
}

/// How an archived command left the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Ran to completion and snapped to its exact target.
    Completed,
    /// Stalled past its hard deadline and was snapped to target by force.
    ForceFinalized,
    /// Cleared by a Stop or a reset before (or while) running.
    Cancelled,
}

/// A queued or in-flight motion instruction.
///
/// At most one command in the whole engine has `started_at` set and
/// `completed_at` unset; the scheduler enforces this.
#[derive(Debug, Clone)]
pub struct Command {
    pub id: Uuid,
    pub kind: CommandKind,
    pub magnitude: f64,
    pub duration: Duration,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Command {
    pub fn new(kind: CommandKind, magnitude: f64, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            magnitude,
            duration,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn into_record(self, disposition: Disposition) -> CommandRecord {
        CommandRecord {
            id: self.id,
            kind: self.kind,
            magnitude: self.magnitude,
            disposition,
            enqueued_at: self.enqueued_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Archived form of a command after it left the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: Uuid,
    pub kind: CommandKind,
    pub magnitude: f64,
    pub disposition: Disposition,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Strict FIFO of pending commands plus a capped history of archived ones.
/// No priorities, no reordering.
#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
    history: VecDeque<CommandRecord>,
    history_limit: usize,
}

impl CommandQueue {
    pub fn new(history_limit: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            history: VecDeque::new(),
            history_limit,
        }
    }

    pub fn push(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    pub fn peek(&self) -> Option<&Command> {
        self.pending.front()
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove every pending command, in queue order, for cancellation.
    pub fn drain_pending(&mut self) -> Vec<Command> {
        self.pending.drain(..).collect()
    }

    pub fn archive(&mut self, record: CommandRecord) {
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    pub fn history(&self) -> impl Iterator<Item = &CommandRecord> {
        self.history.iter()
    }
}
