use crate::models::{AlertEvent, AlertRule, Machine, MetricsSample};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A sample was persisted for a machine. Drives the live stream.
    SampleIngested { machine_id: i64, sample: MetricsSample },
    /// A rule's breach streak reached its trigger length. The machine id is
    /// the machine whose sample caused the fire; fan-out targets its owner.
    AlertFired {
        rule: AlertRule,
        event: AlertEvent,
        machine_id: i64,
    },
    /// Heartbeat sweep flipped the machine offline (marker recorded).
    MachineOffline(Machine),
    /// A previously notified-offline machine is back (marker cleared).
    MachineOnline(Machine),
}

pub struct EventBus {
    pub sender: broadcast::Sender<ServerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }
}
