//! Integrity events.
//!
//! The monitor never raises to a caller; it reports through health and
//! SafeMode state, the journal, and this broadcast stream.

use alliance_types::{AllianceId, HealthState, JournalEntryId};
use tokio::sync::broadcast;

/// Events emitted by the integrity engine.
#[derive(Debug, Clone)]
pub enum IntegrityEvent {
    /// Health moved between states.
    HealthChanged {
        from: HealthState,
        to: HealthState,
        reason: String,
    },

    /// SafeMode was switched on (or its reason replaced).
    SafeModeActivated { reason: String },

    /// SafeMode was switched off.
    SafeModeDeactivated,

    /// A gate mutation reached CONFIRMED.
    MutationConfirmed {
        entry_id: JournalEntryId,
        operation: String,
    },

    /// A gate mutation was ABORTED.
    MutationAborted {
        entry_id: JournalEntryId,
        operation: String,
        error: String,
    },

    /// An integrity scan finished.
    ScanCompleted {
        corrupted: Vec<AllianceId>,
        failure_count: u32,
    },

    /// A repair pass finished.
    RepairCompleted {
        repaired: Vec<AllianceId>,
        failed: Vec<AllianceId>,
    },
}

/// Cloneable handle to the event broadcaster.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IntegrityEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntegrityEvent> {
        self.tx.subscribe()
    }

    /// Send to current subscribers. Having none is not an error.
    pub fn emit(&self, event: IntegrityEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(IntegrityEvent::SafeModeDeactivated);

        assert!(matches!(
            rx.recv().await.unwrap(),
            IntegrityEvent::SafeModeDeactivated
        ));
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        EventBus::new(4).emit(IntegrityEvent::SafeModeDeactivated);
    }
}
