//! Ad event log: the read/append contract of the history store.
//!
//! The durable store is owned elsewhere; the engine only queries it through
//! `Arc<dyn EventLog>` (or a generic `L: EventLog`). `InMemoryEventLog` backs
//! single-process deployments and tests.

use crate::error::{AdsError, AdsResult};
use crate::types::{AdEvent, AdEventType, AdType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Selects events of the given types inside the half-open window `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    /// Empty means every event type.
    pub event_types: Vec<AdEventType>,
    pub creative_set_id: Option<String>,
    pub ad_type: Option<AdType>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventFilter {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            event_types: Vec::new(),
            creative_set_id: None,
            ad_type: None,
            start,
            end,
        }
    }

    pub fn event_type(mut self, event_type: AdEventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    pub fn creative_set(mut self, creative_set_id: impl Into<String>) -> Self {
        self.creative_set_id = Some(creative_set_id.into());
        self
    }

    pub fn ad_type(mut self, ad_type: AdType) -> Self {
        self.ad_type = Some(ad_type);
        self
    }

    pub fn matches(&self, event: &AdEvent) -> bool {
        if event.timestamp < self.start || event.timestamp >= self.end {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if let Some(id) = &self.creative_set_id {
            if &event.creative_set_id != id {
                return false;
            }
        }
        match self.ad_type {
            Some(ad_type) => event.ad_type == ad_type,
            None => true,
        }
    }
}

/// History store consumed by the permission rules and the bandit.
///
/// `query` returns events in non-decreasing timestamp order, ties in
/// insertion order.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn query(&self, filter: &EventFilter) -> AdsResult<Vec<AdEvent>>;

    async fn append(&self, event: AdEvent) -> AdsResult<()>;
}

#[derive(Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<AdEvent>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = AdEvent>) -> Self {
        let log = Self::new();
        for event in events {
            log.push(event);
        }
        log
    }

    /// Insert after every event with an equal or earlier timestamp.
    pub fn push(&self, event: AdEvent) {
        let mut events = self.events.write();
        let idx = events.partition_point(|e| e.timestamp <= event.timestamp);
        events.insert(idx, event);
    }

    /// Drop events older than `horizon`, as the owning store does after its
    /// retention period. Returns the number removed.
    pub fn prune_before(&self, horizon: DateTime<Utc>) -> usize {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.timestamp >= horizon);
        let pruned = before - events.len();
        if pruned > 0 {
            tracing::info!(pruned, "ad events pruned");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<AdEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn query(&self, filter: &EventFilter) -> AdsResult<Vec<AdEvent>> {
        if filter.end < filter.start {
            return Err(AdsError::EventLogUnavailable(format!(
                "query window ends ({}) before it starts ({})",
                filter.end, filter.start
            )));
        }
        let events = self.events.read();
        Ok(events.iter().filter(|e| filter.matches(e)).cloned().collect())
    }

    async fn append(&self, event: AdEvent) -> AdsResult<()> {
        self.push(event);
        Ok(())
    }
}
