//! Progress bus (spec §4.7, component C7): single source of truth for the
//! state of every background operation, fanned out to subscribers.
//!
//! Publishers never block on slow subscribers: each subscriber has a
//! bounded queue that drops the oldest *non-terminal* event on overflow;
//! terminal events (`completed`/`error`/`canceled`) are always queued, even
//! past capacity, since losing one would strand a client mid-operation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;

use crate::ingest::ProgressSink;
use crate::models::{Id, OperationState, OwnerKind, ProgressOperation};

/// Per-subscriber event queue capacity before non-terminal events start
/// being dropped oldest-first.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

struct Subscriber {
    queue: Mutex<VecDeque<ProgressOperation>>,
    notify: Notify,
}

impl Subscriber {
    fn new() -> Arc<Self> {
        Arc::new(Self { queue: Mutex::new(VecDeque::new()), notify: Notify::new() })
    }

    fn push(&self, event: ProgressOperation) {
        let mut queue = self.queue.lock().unwrap();
        if !event.state.is_terminal() && queue.len() >= SUBSCRIBER_QUEUE_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    /// Waits for and returns the next queued event, in per-owner FIFO order
    /// (spec §4.7 "ordering is per-owner FIFO").
    async fn recv(&self) -> ProgressOperation {
        loop {
            if let Some(event) = self.queue.lock().unwrap().pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }
}

/// A live subscription handle returned by [`ProgressBus::subscribe`]. Drop
/// it to unsubscribe.
pub struct Subscription {
    bus: Arc<ProgressBus>,
    id: Id,
    inner: Arc<Subscriber>,
}

impl Subscription {
    pub async fn recv(&self) -> ProgressOperation {
        self.inner.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.subscribers.lock().unwrap().remove(&self.id);
    }
}

pub struct ProgressBus {
    /// Current state of every operation started since process start,
    /// queried to seed a new subscriber with the "current state of each
    /// active operation as a synthetic event" (spec §6.2).
    operations: Mutex<HashMap<Id, ProgressOperation>>,
    subscribers: Mutex<HashMap<Id, Arc<Subscriber>>>,
}

impl ProgressBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { operations: Mutex::new(HashMap::new()), subscribers: Mutex::new(HashMap::new()) })
    }

    /// Registers a new operation in the `queued` state and returns its id.
    pub fn start_operation(&self, owner_id: Id, owner_kind: OwnerKind, owner_name: String, operation_type: String) -> Id {
        let op = ProgressOperation::new(owner_id, owner_kind, owner_name, operation_type);
        let operation_id = op.operation_id;
        self.operations.lock().unwrap().insert(operation_id, op.clone());
        self.broadcast(op);
        operation_id
    }

    /// Applies a stage update to a running operation (spec §4.7 `emit`).
    pub fn emit_stage(&self, operation_id: Id, stage: &str, stage_pct: u8, overall_pct: u8) {
        self.mutate(operation_id, |op| {
            op.state = OperationState::Running;
            op.current_stage = stage.to_string();
            op.stage_pct = stage_pct;
            op.overall_pct = overall_pct;
        });
    }

    pub fn complete(&self, operation_id: Id) {
        self.mutate(operation_id, |op| {
            op.state = OperationState::Completed;
            op.overall_pct = 100;
            op.stage_pct = 100;
        });
    }

    pub fn fail(&self, operation_id: Id, error_msg: impl Into<String>) {
        let message = error_msg.into();
        self.mutate(operation_id, |op| {
            op.state = OperationState::Error;
            op.error_msg = Some(message.clone());
        });
    }

    pub fn cancel(&self, operation_id: Id) {
        self.mutate(operation_id, |op| {
            op.state = OperationState::Canceled;
        });
    }

    fn mutate(&self, operation_id: Id, f: impl FnOnce(&mut ProgressOperation)) {
        let mut operations = self.operations.lock().unwrap();
        let Some(op) = operations.get_mut(&operation_id) else {
            tracing::warn!(%operation_id, "progress update for unknown operation");
            return;
        };
        f(op);
        op.updated_at = Utc::now();
        let snapshot = op.clone();
        drop(operations);
        self.broadcast(snapshot);
    }

    fn broadcast(&self, event: ProgressOperation) {
        for subscriber in self.subscribers.lock().unwrap().values() {
            subscriber.push(event.clone());
        }
    }

    /// Subscribes to the event stream, seeded with a synthetic event for
    /// every currently non-terminal operation (spec §6.2).
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let inner = Subscriber::new();
        let id = crate::models::new_id();

        for op in self.operations.lock().unwrap().values() {
            if !op.state.is_terminal() {
                inner.push(op.clone());
            }
        }

        self.subscribers.lock().unwrap().insert(id, inner.clone());
        Subscription { bus: self.clone(), id, inner }
    }
}

/// Adapts an in-flight operation on the bus to the ingestor's synchronous
/// [`ProgressSink`] callback shape.
pub struct OperationProgress {
    bus: Arc<ProgressBus>,
    operation_id: Id,
}

impl OperationProgress {
    pub fn new(bus: Arc<ProgressBus>, operation_id: Id) -> Self {
        Self { bus, operation_id }
    }

    pub fn operation_id(&self) -> Id {
        self.operation_id
    }
}

impl ProgressSink for OperationProgress {
    fn report(&self, stage: &str, stage_pct: u8, overall_pct: u8) {
        self.bus.emit_stage(self.operation_id, stage, stage_pct, overall_pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_seeded_and_live_events() {
        let bus = ProgressBus::new();
        let owner_id = crate::models::new_id();
        let operation_id = bus.start_operation(owner_id, OwnerKind::StreamSource, "Test".to_string(), "ingest".to_string());

        let sub = bus.subscribe();
        bus.emit_stage(operation_id, "download", 50, 10);
        let first = sub.recv().await;
        assert_eq!(first.operation_id, operation_id);

        let second = sub.recv().await;
        assert_eq!(second.current_stage, "download");
        assert_eq!(second.overall_pct, 10);
    }

    #[tokio::test]
    async fn terminal_events_are_never_dropped_even_past_capacity() {
        let bus = ProgressBus::new();
        let owner_id = crate::models::new_id();
        let operation_id = bus.start_operation(owner_id, OwnerKind::StreamSource, "Test".to_string(), "ingest".to_string());
        let sub = bus.subscribe();

        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY + 50 {
            bus.emit_stage(operation_id, "download", 1, 1);
        }
        bus.complete(operation_id);

        let mut saw_completed = false;
        while let Ok(event) = tokio::time::timeout(std::time::Duration::from_millis(10), sub.recv()).await {
            if event.state == OperationState::Completed {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn new_subscriber_is_seeded_with_active_operations() {
        let bus = ProgressBus::new();
        let owner_id = crate::models::new_id();
        bus.start_operation(owner_id, OwnerKind::Proxy, "Proxy A".to_string(), "generate".to_string());

        let sub = bus.subscribe();
        let seeded = sub.recv().await;
        assert_eq!(seeded.owner_name, "Proxy A");
    }
}
