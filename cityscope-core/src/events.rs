use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tokio::sync::broadcast;

use crate::model::{Resource, ServiceKind, ServiceState};

#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    /// `revision` is the model revision the change produced.
    StateChanged {
        kind: ServiceKind,
        from: ServiceState,
        to: ServiceState,
        revision: u64,
    },
    StepSucceeded {
        kind: ServiceKind,
        resource: Resource,
    },
    StepFailed {
        kind: ServiceKind,
        resource: Resource,
        status: Option<u16>,
    },
}

#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub id: u64,
    pub at: SystemTime,
    pub event: LifecycleEvent,
}

/// Broadcast feed for the presentation layer.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        // no subscribers is fine
        let _ = self.tx.send(EventEnvelope {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            at: SystemTime::now(),
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.emit(LifecycleEvent::StepSucceeded {
                kind: ServiceKind::Blog,
                resource: Resource::Mysql,
            });
        }
        let ids: Vec<u64> = (0..3).map(|_| rx.try_recv().unwrap().id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(LifecycleEvent::StateChanged {
            kind: ServiceKind::Loopback,
            from: ServiceState::Unknown,
            to: ServiceState::Running,
            revision: 1,
        });
    }
}
