// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest event bus: typed session telemetry.
//!
//! The [`EventBus`] is a `tokio::sync::broadcast` channel carrying
//! [`HarvestEvent`] values. The CLI progress bar and JSON log sinks subscribe
//! independently. When no subscribers exist, events are silently dropped.

use crate::types::{Outcome, Provenance};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffer: enough for a full session at the visit cap.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Why the controller is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    /// Jittered delay before a profile visit.
    Visit,
    /// Periodic long pause.
    Long,
    /// Delay between search pages.
    SearchPage,
}

/// Every event a harvest session emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    // ── Search ────────────────────────────
    /// A search page was loaded and its hits collected.
    SearchPageCaptured {
        page: u32,
        hits: usize,
        total_hits: usize,
        provenance: Provenance,
    },
    /// Pagination ended.
    SearchFinished { pages: u32, hits: usize },

    // ── Visits ────────────────────────────
    /// The controller is about to wait.
    PauseStarted { kind: PauseKind, delay_ms: u64 },
    /// A profile visit has been granted and is starting.
    VisitStarted {
        index: usize,
        total: usize,
        public_id: String,
    },
    /// A profile visit finished and its record was kept.
    VisitFinished {
        index: usize,
        total: usize,
        public_id: String,
        outcome: Outcome,
        groups: usize,
    },

    // ── Session ───────────────────────────
    /// The rate controller halted the session.
    Halted { consecutive_failures: u32 },
    /// The session ended; `summary` is the human-readable outcome.
    SessionFinished {
        records: usize,
        requested: usize,
        summary: String,
    },
}

impl HarvestEvent {
    /// Whether this event ends a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionFinished { .. })
    }
}

/// Broadcast hub for [`HarvestEvent`]s. Cloning shares the channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<HarvestEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.sender.subscribe()
    }
}

/// Emit on an optional bus.
pub fn emit(bus: &Option<EventBus>, event: HarvestEvent) {
    if let Some(bus) = bus {
        bus.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = HarvestEvent::VisitFinished {
            index: 2,
            total: 10,
            public_id: "ada".to_string(),
            outcome: Outcome::SoftFailure,
            groups: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"VisitFinished""#));
        assert!(json.contains(r#""outcome":"soft_failure""#));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit(HarvestEvent::Halted {
            consecutive_failures: 5,
        });
        emit(&None, HarvestEvent::SearchFinished { pages: 1, hits: 0 });
    }

    #[test]
    fn test_subscribe_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        emit(
            &Some(bus.clone()),
            HarvestEvent::SessionFinished {
                records: 2,
                requested: 10,
                summary: "cancelled".to_string(),
            },
        );
        let event = rx.try_recv().unwrap();
        assert!(event.is_terminal());
    }
}
