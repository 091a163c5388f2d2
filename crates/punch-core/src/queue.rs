//! Durable mutation queue.
//!
//! The full queue is written to storage on every change before the call
//! returns. Every read-modify-persist sequence runs under one async mutex, and
//! memory is only updated after the write succeeded, so a failed write leaves
//! both sides at the previous state.
//!
//! A sync cycle works on copies taken by [`DurableQueue::next_batch`]. Calls
//! that record a delivery outcome take that copy back and compare its
//! `revision`: when a mutation was coalesced into the item in the meantime,
//! the newer payload stays queued untouched.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{NewMutation, QueueItem, QueueItemId, QueueItemStatus};
use crate::platform::Clock;
use crate::storage::{load_json, save_json, KeyValueStore, SYNC_QUEUE_KEY};

/// Queue counts exposed to observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total: usize,
    pub pending: usize,
    pub conflicts: usize,
}

/// Result of bumping an item's retry counter
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// Item stays queued with the new count
    Retained { retry_count: u32 },
    /// Count reached the maximum; the item was removed
    Exhausted(QueueItem),
    /// A newer revision was coalesced in; its retry budget is untouched
    Superseded,
    /// No item with that id
    Missing,
}

/// Result of recording the outcome for a delivered copy of an item
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The queue was updated; carries the removed, parked or replacement item
    Recorded(QueueItem),
    /// A newer revision was coalesced in and left queued as is
    Superseded,
    /// No item with that id
    Missing,
}

enum Lookup {
    Current(usize),
    Superseded,
    Missing,
}

fn lookup(items: &[QueueItem], sent: &QueueItem) -> Lookup {
    match items.iter().position(|item| item.id == sent.id) {
        None => Lookup::Missing,
        Some(index) if items[index].revision != sent.revision => {
            tracing::debug!(
                "Queue item {} changed while in flight (revision {} -> {})",
                sent.id,
                sent.revision,
                items[index].revision
            );
            Lookup::Superseded
        }
        Some(index) => Lookup::Current(index),
    }
}

pub struct DurableQueue {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    items: Mutex<Vec<QueueItem>>,
}

impl DurableQueue {
    /// Restore the queue persisted in `store` (empty when none)
    pub async fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let items: Vec<QueueItem> = load_json(store.as_ref(), SYNC_QUEUE_KEY)
            .await?
            .unwrap_or_default();
        if !items.is_empty() {
            tracing::info!("Restored {} queued mutation(s)", items.len());
        }
        Ok(Self {
            store,
            clock,
            items: Mutex::new(items),
        })
    }

    async fn persist(&self, items: &[QueueItem]) -> Result<()> {
        save_json(self.store.as_ref(), SYNC_QUEUE_KEY, &items).await
    }

    /// Append a mutation, assigning id and timestamp when absent.
    ///
    /// With an idempotency key, an existing pending item carrying the same key
    /// is updated in place instead of appending a duplicate.
    pub async fn enqueue(&self, mutation: NewMutation) -> Result<QueueItem> {
        let mut items = self.items.lock().await;
        let mut next = items.clone();

        let coalesce_at = mutation.idempotency_key.as_ref().and_then(|key| {
            next.iter().position(|item| {
                item.is_pending() && item.idempotency_key.as_deref() == Some(key.as_str())
            })
        });

        let item = if let Some(index) = coalesce_at {
            let existing = &mut next[index];
            existing.operation = mutation.operation;
            existing.data = mutation.data;
            existing.priority = existing.priority.max(mutation.priority);
            existing.policy = mutation.policy.or(existing.policy);
            existing.force = existing.force || mutation.force;
            existing.retry_count = 0;
            existing.revision = existing.revision.wrapping_add(1);
            tracing::debug!("Coalesced mutation into queued item {}", existing.id);
            existing.clone()
        } else {
            let item = mutation.into_item(self.clock.now_millis());
            if next.iter().any(|existing| existing.id == item.id) {
                return Err(Error::InvalidInput(format!(
                    "queue item {} already exists",
                    item.id
                )));
            }
            next.push(item.clone());
            item
        };

        self.persist(&next).await?;
        *items = next;
        tracing::debug!(
            "Queued {} {} {} (priority {})",
            item.operation,
            item.entity_kind,
            item.entity_id,
            item.priority
        );
        Ok(item)
    }

    /// Up to `limit` pending items, highest priority first, ties in creation order.
    pub async fn next_batch(&self, limit: usize) -> Vec<QueueItem> {
        let items = self.items.lock().await;
        let mut pending: Vec<QueueItem> = items
            .iter()
            .filter(|item| item.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|item| (Reverse(item.priority), item.created_at));
        pending.truncate(limit);
        pending
    }

    /// Remove a delivered item unless a newer revision replaced it.
    pub async fn settle(&self, sent: &QueueItem) -> Result<Delivery> {
        let mut items = self.items.lock().await;
        let index = match lookup(&items, sent) {
            Lookup::Current(index) => index,
            Lookup::Superseded => return Ok(Delivery::Superseded),
            Lookup::Missing => return Ok(Delivery::Missing),
        };

        let mut next = items.clone();
        let removed = next.remove(index);
        self.persist(&next).await?;
        *items = next;
        Ok(Delivery::Recorded(removed))
    }

    /// Swap a delivered item for `replacement` in a single write.
    pub async fn replace(&self, sent: &QueueItem, replacement: NewMutation) -> Result<Delivery> {
        let mut items = self.items.lock().await;
        let index = match lookup(&items, sent) {
            Lookup::Current(index) => index,
            Lookup::Superseded => return Ok(Delivery::Superseded),
            Lookup::Missing => return Ok(Delivery::Missing),
        };

        let replacement = replacement.into_item(self.clock.now_millis());
        if items.iter().any(|existing| existing.id == replacement.id) {
            return Err(Error::InvalidInput(format!(
                "queue item {} already exists",
                replacement.id
            )));
        }

        let mut next = items.clone();
        next.remove(index);
        next.push(replacement.clone());
        self.persist(&next).await?;
        *items = next;
        tracing::debug!("Replaced queue item {} with {}", sent.id, replacement.id);
        Ok(Delivery::Recorded(replacement))
    }

    /// Bump the retry counter of a delivered item; at `max_retries` the item
    /// is removed instead.
    pub async fn increment_retry(
        &self,
        sent: &QueueItem,
        max_retries: u32,
    ) -> Result<RetryOutcome> {
        let mut items = self.items.lock().await;
        let index = match lookup(&items, sent) {
            Lookup::Current(index) => index,
            Lookup::Superseded => return Ok(RetryOutcome::Superseded),
            Lookup::Missing => return Ok(RetryOutcome::Missing),
        };

        let mut next = items.clone();
        let retry_count = next[index].retry_count.saturating_add(1);
        let outcome = if retry_count >= max_retries {
            let mut exhausted = next.remove(index);
            exhausted.retry_count = retry_count;
            RetryOutcome::Exhausted(exhausted)
        } else {
            next[index].retry_count = retry_count;
            RetryOutcome::Retained { retry_count }
        };

        self.persist(&next).await?;
        *items = next;
        Ok(outcome)
    }

    /// Park a delivered item until a human resolves it
    pub async fn mark_conflicted(&self, sent: &QueueItem) -> Result<Delivery> {
        let mut items = self.items.lock().await;
        let index = match lookup(&items, sent) {
            Lookup::Current(index) => index,
            Lookup::Superseded => return Ok(Delivery::Superseded),
            Lookup::Missing => return Ok(Delivery::Missing),
        };

        let mut next = items.clone();
        next[index].status = QueueItemStatus::Conflicted;
        let parked = next[index].clone();
        self.persist(&next).await?;
        *items = next;
        Ok(Delivery::Recorded(parked))
    }

    /// Replace a conflicted item's payload with the chosen version and make it
    /// eligible again; the remote must accept it unconditionally.
    pub async fn resolve_conflicted(&self, id: &QueueItemId, data: Value) -> Result<QueueItem> {
        let mut items = self.items.lock().await;
        let index = items
            .iter()
            .position(|item| &item.id == id)
            .ok_or_else(|| Error::NotFound(format!("queue item {id}")))?;
        if !items[index].is_conflicted() {
            return Err(Error::InvalidInput(format!(
                "queue item {id} is not awaiting resolution"
            )));
        }

        let mut next = items.clone();
        let item = &mut next[index];
        item.data = data;
        item.status = QueueItemStatus::Pending;
        item.force = true;
        item.retry_count = 0;
        let resolved = item.clone();

        self.persist(&next).await?;
        *items = next;
        Ok(resolved)
    }

    /// Drop a parked conflict, leaving the remote version in place.
    pub async fn discard(&self, id: &QueueItemId) -> Result<QueueItem> {
        let mut items = self.items.lock().await;
        let index = items
            .iter()
            .position(|item| &item.id == id)
            .ok_or_else(|| Error::NotFound(format!("queue item {id}")))?;
        if !items[index].is_conflicted() {
            return Err(Error::InvalidInput(format!(
                "queue item {id} is not awaiting resolution"
            )));
        }

        let mut next = items.clone();
        let discarded = next.remove(index);
        self.persist(&next).await?;
        *items = next;
        Ok(discarded)
    }

    /// Rewrite the current in-memory queue to storage
    pub async fn flush(&self) -> Result<()> {
        let items = self.items.lock().await;
        self.persist(&items).await
    }

    pub async fn get(&self, id: &QueueItemId) -> Option<QueueItem> {
        self.items
            .lock()
            .await
            .iter()
            .find(|item| &item.id == id)
            .cloned()
    }

    /// Snapshot of every queued item in insertion order
    pub async fn items(&self) -> Vec<QueueItem> {
        self.items.lock().await.clone()
    }

    /// Items parked until a human resolves them
    pub async fn conflicts(&self) -> Vec<QueueItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|item| item.is_conflicted())
            .cloned()
            .collect()
    }

    pub async fn status(&self) -> QueueStatus {
        let items = self.items.lock().await;
        let conflicts = items.iter().filter(|item| item.is_conflicted()).count();
        QueueStatus {
            total: items.len(),
            pending: items.len() - conflicts,
            conflicts,
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
