use chrono::{DateTime, Utc};
use models::{Id, Priority};
use std::collections::BTreeMap;

/// A scheduled unit of work. Items are created on enqueue, mutated only by
/// queue retry bookkeeping, and destroyed when they succeed terminally or
/// exhaust their retries.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem<J> {
    pub id: Id,
    pub priority: Priority,
    pub payload: J,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Set when the item reaches a terminal result.
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    /// Zero means "use the queue default", resolved at enqueue.
    pub max_retries: u32,
    /// When set, the item must not be dispatched before this instant.
    pub next_retry: Option<DateTime<Utc>>,
}

impl<J> QueueItem<J> {
    pub fn new(priority: Priority, payload: J) -> Self {
        Self {
            id: Id::new(),
            priority,
            payload,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            processed_at: None,
            retry_count: 0,
            max_retries: 0,
            next_retry: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.next_retry {
            None => true,
            Some(at) => at <= now,
        }
    }

    /// Re-wrap this item's bookkeeping around the next stage's payload,
    /// preserving priority, metadata, and the original creation time so the
    /// document keeps its place in line.
    pub fn hand_off<K>(&self, payload: K) -> QueueItem<K> {
        QueueItem {
            id: Id::new(),
            priority: self.priority,
            payload,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            processed_at: None,
            retry_count: 0,
            max_retries: 0,
            next_retry: None,
        }
    }
}
