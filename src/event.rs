//! Structured events emitted by the engine as it processes its mailbox.
//!
//! Consumers subscribe to the event stream to build dashboards,
//! alerting, or audit logs. Events are the engine's voice;
//! span-scoped logs are the worker's voice.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A structured event emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number per engine. Consumers can detect gaps.
    pub seq: u64,
    /// Engine clock time when this event occurred.
    pub timestamp: DateTime<Utc>,
    /// Workflow key of the emitting engine.
    pub workflow: String,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    CycleStarted {
        anchor: DateTime<Utc>,
    },
    Resumed {
        state: String,
        next_event: Option<DateTime<Utc>>,
    },
    StateTransition {
        from: String,
        to: String,
        next_event: Option<DateTime<Utc>>,
    },
    DuplicateIgnored {
        event_id: String,
    },
    CommandRejected {
        event_id: String,
        reason: String,
    },
    DeliveryFailed {
        template: String,
        trigger: String,
        error: String,
    },
    RetryScheduled {
        at: DateTime<Utc>,
    },
    Postponed {
        minutes: i64,
        next_event: DateTime<Utc>,
    },
    SnapshotPersisted {
        bytes: usize,
    },
    SnapshotPersistFailed {
        error: String,
    },
}

/// Fan-out of engine events. Sending never blocks; slow subscribers lag.
pub struct EventBus {
    workflow: String,
    tx: broadcast::Sender<Event>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new(workflow: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            workflow: workflow.into(),
            tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, timestamp: DateTime<Utc>, kind: EventKind) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine.
        let _ = self.tx.send(Event {
            seq,
            timestamp,
            workflow: self.workflow.clone(),
            kind,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<Event> {
        self.tx.clone()
    }
}
