// src/events.rs - Change notification for rendering and host collaborators
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::command::{CommandError, CommandKind, Disposition};
use crate::motion::state_machine::AnimationState;
use crate::pose::PoseSnapshot;

/// Everything an observer can learn about the engine, one message per change.
#[derive(Debug, Clone)]
pub enum VehicleEvent {
    /// The authoritative pose moved (every interpolation step, drift
    /// correction, or reset).
    PoseChanged(PoseSnapshot),

    /// The animation machine switched states.
    StateChanged {
        from: AnimationState,
        to: AnimationState,
    },

    /// A queued command became the active command.
    CommandStarted { id: Uuid, kind: CommandKind },

    /// The active command finished, one way or another.
    CommandFinished {
        id: Uuid,
        kind: CommandKind,
        disposition: Disposition,
    },

    /// An enqueue attempt was refused; no state changed.
    CommandRejected {
        kind: CommandKind,
        error: CommandError,
    },

    /// The engine was reset to the origin.
    Reset,
}

/// Broadcast fan-out to any number of subscribers.
///
/// Publishing never blocks and never fails: with no subscribers the message
/// is dropped, and slow subscribers observe `Lagged` on their receiver rather
/// than stalling the engine tick.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<VehicleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VehicleEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: VehicleEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(VehicleEvent::Reset);

        assert!(matches!(a.recv().await.unwrap(), VehicleEvent::Reset));
        assert!(matches!(b.recv().await.unwrap(), VehicleEvent::Reset));
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(VehicleEvent::Reset);
    }
}
