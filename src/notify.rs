//! Notification Emitter: one domain event per exchange state transition.
//!
//! Delivery and storage belong to an external collaborator; this module only
//! defines the event shape and the sink boundary. The service emits events
//! after the store transaction commits, so a failed operation emits nothing.

use crate::types::{AccountId, ExchangeId};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ExchangeRequested,
    ExchangeAccepted,
    ExchangeRejected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ExchangeRequested => "exchange_requested",
            EventKind::ExchangeAccepted => "exchange_accepted",
            EventKind::ExchangeRejected => "exchange_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub exchange_id: ExchangeId,
    pub account_id: AccountId,
}

/// Boundary to the out-of-scope notification collaborator.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: NotificationEvent);
}

/// Default sink: log each event through `tracing` and move on.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, event: NotificationEvent) {
        tracing::info!(
            kind = event.kind.as_str(),
            exchange = %event.exchange_id,
            account = %event.account_id,
            "notification emitted"
        );
    }
}

/// Sink that records events in memory. Intended for tests asserting on the
/// emitted sequence.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    pub fn drain(&self) -> Vec<NotificationEvent> {
        std::mem::take(&mut *self.events.lock().expect("sink mutex poisoned"))
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, event: NotificationEvent) {
        self.events.lock().expect("sink mutex poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let exchange = ExchangeId::generate();
        let account = AccountId::generate();

        sink.deliver(NotificationEvent {
            kind: EventKind::ExchangeRequested,
            exchange_id: exchange.clone(),
            account_id: account.clone(),
        });
        sink.deliver(NotificationEvent {
            kind: EventKind::ExchangeRejected,
            exchange_id: exchange,
            account_id: account,
        });

        let events = sink.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::ExchangeRequested);
        assert_eq!(events[1].kind, EventKind::ExchangeRejected);
        assert!(sink.events().is_empty());
    }
}
