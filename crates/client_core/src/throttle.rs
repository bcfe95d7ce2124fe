use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::domain::ControlVector;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

use crate::error::Result;

pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(100);
pub const DEFAULT_DEAD_ZONE: f64 = 0.1;
pub const DEFAULT_JOYSTICK_SPEED: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSample {
    pub x: f64,
    pub y: f64,
    /// Usable radius of the surface in the same units as `x`/`y`.
    pub max_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleSettings {
    pub quiescence: Duration,
    pub dead_zone: f64,
    pub speed: f64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            quiescence: DEFAULT_QUIESCENCE,
            dead_zone: DEFAULT_DEAD_ZONE,
            speed: DEFAULT_JOYSTICK_SPEED,
        }
    }
}

#[async_trait]
pub trait MotorSink: Send + Sync {
    async fn send_vector(&self, vector: ControlVector) -> Result<()>;
    async fn send_stop(&self) -> Result<()>;
}

#[derive(Default)]
struct PendingSlot {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl PendingSlot {
    fn cancel(&mut self) -> bool {
        self.generation += 1;
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

pub struct ControlThrottler {
    settings: ThrottleSettings,
    slot: Arc<Mutex<PendingSlot>>,
    dispatch_gate: Arc<Mutex<()>>,
}

impl ControlThrottler {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            slot: Arc::new(Mutex::new(PendingSlot::default())),
            dispatch_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.settings
    }

    /// Feeds one drag sample. Returns the vector that was scheduled, or
    /// `None` when the sample fell inside the dead zone.
    pub async fn sample(&self, sink: Arc<dyn MotorSink>, sample: DragSample) -> Option<ControlVector> {
        let vector =
            ControlVector::from_offset(sample.x, sample.y, sample.max_distance, self.settings.speed);

        let mut slot = self.slot.lock().await;
        slot.cancel();

        if vector.magnitude < self.settings.dead_zone {
            debug!(magnitude = vector.magnitude, "joystick: sample inside dead zone");
            return None;
        }

        let generation = slot.generation;
        let quiescence = self.settings.quiescence;
        let slot_handle = Arc::clone(&self.slot);
        let gate = Arc::clone(&self.dispatch_gate);

        slot.task = Some(tokio::spawn(async move {
            tokio::time::sleep(quiescence).await;

            {
                let mut slot = slot_handle.lock().await;
                if slot.generation != generation {
                    return;
                }
                // detach so a later cancel cannot abort a send already on the wire
                slot.task.take();
            }

            let _gate = gate.lock().await;
            if slot_handle.lock().await.generation != generation {
                debug!("joystick: coalesced send superseded before dispatch");
                return;
            }

            debug!(
                angle = vector.angle,
                magnitude = vector.magnitude,
                "joystick: dispatching coalesced vector"
            );
            if let Err(err) = sink.send_vector(vector).await {
                warn!("joystick: vector command failed: {err}");
            }
        }));

        Some(vector)
    }

    pub async fn cancel_pending(&self) -> bool {
        self.slot.lock().await.cancel()
    }

    /// Ends the gesture: cancels the pending send, then stops the motor.
    pub async fn release(&self, sink: &dyn MotorSink) -> Result<()> {
        let cancelled = self.cancel_pending().await;
        debug!(cancelled, "joystick: released");

        // a send already past the slot finishes first, so the stop lands last
        let _gate = self.dispatch_gate.lock().await;
        sink.send_stop().await
    }
}

#[cfg(test)]
#[path = "tests/throttle_tests.rs"]
mod tests;
