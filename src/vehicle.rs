// src/vehicle.rs - In-process API surface wrapping the scheduler
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;
use uuid::Uuid;

use crate::command::{CommandError, CommandKind, CommandRecord};
use crate::config::{Config, ConfigError};
use crate::events::{EventBus, VehicleEvent};
use crate::motion::state_machine::AnimationState;
use crate::pose::PoseSnapshot;
use crate::scheduler::{Scheduler, StatusReport};
use crate::sensors::{ObstacleField, SensorProvider, SensorReadings};

/// Facade-level error umbrella.
#[derive(Debug, Error)]
pub enum VehicleError {
    #[error("command rejected: {0}")]
    Command(#[from] CommandError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The vehicle as external collaborators see it: one command producer API,
/// one pose/sensor query API, one event stream.
///
/// All engine state lives in the [`Scheduler`]; the facade spawns its tick
/// loop on the current `LocalSet` and forwards calls.
pub struct Vehicle {
    config: Config,
    scheduler: Arc<RwLock<Scheduler>>,
    sensors: Arc<RwLock<Box<dyn SensorProvider>>>,
    events: EventBus,
    shutdown_tx: broadcast::Sender<()>,
}

impl Vehicle {
    /// Build a vehicle with an empty obstacle field (all sensors report max
    /// range).
    pub fn new(config: Config) -> Self {
        let field = ObstacleField::empty(config.sensors.clone());
        Self::with_sensors(config, Box::new(field))
    }

    pub fn with_sensors(config: Config, provider: Box<dyn SensorProvider>) -> Self {
        let events = EventBus::new(64);
        let scheduler = Scheduler::new(config.clone(), events.clone(), Instant::now());
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            scheduler: Arc::new(RwLock::new(scheduler)),
            sensors: Arc::new(RwLock::new(provider)),
            events,
            shutdown_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.vehicle.name
    }

    /// Spawn the engine tick loop. Must be called from within a `LocalSet`.
    pub fn start(&self) {
        let scheduler = self.scheduler.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let tick = Duration::from_millis(self.config.scheduler.tick_ms);
        tokio::task::spawn_local(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("tick loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        scheduler.write().await.tick(Instant::now());
                    }
                }
            }
        });
        tracing::info!(vehicle = %self.config.vehicle.name, "tick loop started");
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn enqueue_command(
        &self,
        kind: CommandKind,
        magnitude: f64,
        duration_ms: u64,
    ) -> Result<Uuid, VehicleError> {
        let id = self
            .scheduler
            .write()
            .await
            .enqueue(kind, magnitude, duration_ms, Instant::now())?;
        Ok(id)
    }

    pub async fn get_pose(&self) -> PoseSnapshot {
        self.scheduler.read().await.pose_snapshot()
    }

    pub async fn get_sensors(&self) -> SensorReadings {
        let pose = self.get_pose().await;
        self.sensors.write().await.sample(&pose)
    }

    pub async fn reset(&self) {
        self.scheduler.write().await.reset(Instant::now());
    }

    pub async fn is_busy(&self) -> bool {
        self.scheduler.read().await.is_busy()
    }

    /// Receiver of every pose change, state change, and command lifecycle
    /// event. Slow consumers observe `Lagged`, never a stalled engine.
    pub fn subscribe(&self) -> broadcast::Receiver<VehicleEvent> {
        self.events.subscribe()
    }

    pub async fn get_animation_state(&self) -> AnimationState {
        self.scheduler.read().await.animation_state()
    }

    pub async fn status(&self) -> StatusReport {
        self.scheduler.read().await.status(Instant::now())
    }

    pub async fn queue_depth(&self) -> usize {
        self.scheduler.read().await.queue_depth()
    }

    pub async fn history(&self) -> Vec<CommandRecord> {
        self.scheduler.read().await.history()
    }

    pub async fn battery_pct(&self) -> f64 {
        self.scheduler.read().await.battery_pct()
    }

    pub async fn odometer(&self) -> f64 {
        self.scheduler.read().await.odometer()
    }
}
