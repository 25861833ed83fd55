//! Replays transactions queued while offline.
//!
//! The page application appends records to a JSON array kept under
//! [`PENDING_TRANSACTIONS_KEY`]; a sync event drains it against the server,
//! keeping whatever could not be submitted for the next sync.

use color_eyre::{eyre::bail, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Worker;
use crate::cache::CacheStorage;

pub const PENDING_TRANSACTIONS_KEY: &str = "pending_transactions";

/// String key/value storage shared with the page application.
pub trait QueueStore: Send + Sync {
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// The stored queue is not a JSON array. Nothing was submitted and the
  /// stored value was left as is.
  #[error("pending transaction queue is malformed: {0}")]
  MalformedQueue(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub submitted: usize,
  pub failed: usize,
  /// Records still queued after this pass
  pub remaining: usize,
}

/// In-memory view of the stored queue, oldest record first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQueue {
  records: Vec<Value>,
}

impl PendingQueue {
  /// Read the queue; a missing key is an empty queue.
  pub fn load(store: &dyn QueueStore) -> Result<Self> {
    let records: Vec<Value> = match store.get_item(PENDING_TRANSACTIONS_KEY)? {
      Some(raw) => serde_json::from_str(&raw).map_err(SyncError::MalformedQueue)?,
      None => Vec::new(),
    };
    Ok(Self { records })
  }

  pub fn save(&self, store: &dyn QueueStore) -> Result<()> {
    let raw = serde_json::to_string(&self.records)?;
    store.set_item(PENDING_TRANSACTIONS_KEY, &raw)
  }

  pub fn records(&self) -> &[Value] {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn push(&mut self, record: Value) {
    self.records.push(record);
  }

  /// Append one record to the stored queue, as the page does when offline.
  pub fn enqueue(store: &dyn QueueStore, record: Value) -> Result<usize> {
    let mut queue = Self::load(store)?;
    queue.push(record);
    queue.save(store)?;
    Ok(queue.len())
  }

  /// Try every stored record in order.
  ///
  /// A record is removed, and the queue written back, right after `attempt`
  /// succeeds for it. Failed records stay where they are.
  pub async fn drain<F, Fut>(store: &dyn QueueStore, mut attempt: F) -> Result<SyncReport>
  where
    F: FnMut(Value) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    let mut queue = Self::load(store)?;
    let mut report = SyncReport::default();
    if queue.is_empty() {
      debug!("No pending transactions");
      return Ok(report);
    }

    let snapshot = queue.records.clone();

    for (index, record) in snapshot.into_iter().enumerate() {
      match attempt(record.clone()).await {
        Ok(()) => {
          // Position shifts left by one for every record removed before it
          queue.records.remove(index - report.submitted);
          queue.save(store)?;
          report.submitted += 1;
        }
        Err(err) => {
          warn!("Sync failed for transaction {}: {}", record, err);
          report.failed += 1;
        }
      }
    }

    report.remaining = queue.len();
    Ok(report)
  }
}

impl<S: CacheStorage> Worker<S> {
  /// Handle a sync event. Tags other than the configured one are ignored.
  pub async fn sync(&self, tag: &str) -> Result<Option<SyncReport>> {
    if tag != self.config.sync.tag {
      debug!("Ignoring sync event with tag {}", tag);
      return Ok(None);
    }

    let endpoint = self.resolve(&self.config.sync.endpoint)?;
    let network = Arc::clone(&self.host.network);

    let report = PendingQueue::drain(self.queue.as_ref(), |record| {
      let network = Arc::clone(&network);
      let endpoint = endpoint.clone();
      async move {
        let response = network.post_json(&endpoint, &record).await?;
        if !response.is_ok() {
          bail!("{} answered with status {}", endpoint, response.status);
        }
        Ok(())
      }
    })
    .await?;

    info!(
      "Synced transactions: {} submitted, {} failed, {} pending",
      report.submitted, report.failed, report.remaining
    );
    Ok(Some(report))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::worker::testing::{FakeNetwork, Harness};
  use serde_json::json;

  fn stored(h: &Harness) -> Vec<Value> {
    PendingQueue::load(h.local.as_ref()).unwrap().records().to_vec()
  }

  #[tokio::test]
  async fn test_success_removes_and_failure_keeps() {
    let a = json!({"id": "A", "amount": 1500});
    let b = json!({"id": "B", "amount": 200});
    let h = Harness::new(FakeNetwork::new().reject(b.clone()));
    PendingQueue::enqueue(h.local.as_ref(), a.clone()).unwrap();
    PendingQueue::enqueue(h.local.as_ref(), b.clone()).unwrap();

    let report = h.worker.sync("sync-transactions").await.unwrap().unwrap();

    assert_eq!(
      report,
      SyncReport {
        submitted: 1,
        failed: 1,
        remaining: 1
      }
    );
    assert_eq!(stored(&h), vec![b]);
  }

  #[tokio::test]
  async fn test_posts_each_record_to_endpoint_in_order() {
    let h = Harness::new(FakeNetwork::new());
    for id in ["A", "B", "C"] {
      PendingQueue::enqueue(h.local.as_ref(), json!({ "id": id })).unwrap();
    }

    h.worker.sync("sync-transactions").await.unwrap();

    let posted = h.network.posted();
    let ids: Vec<_> = posted.iter().map(|(_, body)| body["id"].clone()).collect();
    assert_eq!(ids, vec![json!("A"), json!("B"), json!("C")]);
    assert!(posted
      .iter()
      .all(|(url, _)| url.as_str() == "https://pay.example/api/transactions"));
    assert!(stored(&h).is_empty());
  }

  #[tokio::test]
  async fn test_server_error_keeps_record() {
    let bad = json!({"id": "X"});
    let h = Harness::new(FakeNetwork::new().server_error(bad.clone()));
    PendingQueue::enqueue(h.local.as_ref(), bad.clone()).unwrap();

    let report = h.worker.sync("sync-transactions").await.unwrap().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(stored(&h), vec![bad]);
  }

  #[tokio::test]
  async fn test_absent_queue_makes_no_calls() {
    let h = Harness::new(FakeNetwork::new());

    let report = h.worker.sync("sync-transactions").await.unwrap().unwrap();
    assert_eq!(report, SyncReport::default());
    assert!(h.network.posted().is_empty());
  }

  #[tokio::test]
  async fn test_empty_queue_makes_no_calls() {
    let h = Harness::new(FakeNetwork::new());
    h.local.set_item(PENDING_TRANSACTIONS_KEY, "[]").unwrap();

    let report = h.worker.sync("sync-transactions").await.unwrap().unwrap();
    assert_eq!(report.remaining, 0);
    assert!(h.network.posted().is_empty());
    assert_eq!(
      h.local.get_item(PENDING_TRANSACTIONS_KEY).unwrap().as_deref(),
      Some("[]")
    );
  }

  #[tokio::test]
  async fn test_malformed_queue_is_an_error_and_left_untouched() {
    let h = Harness::new(FakeNetwork::new());
    h.local
      .set_item(PENDING_TRANSACTIONS_KEY, "{not json")
      .unwrap();

    let err = h.worker.sync("sync-transactions").await.unwrap_err();
    assert!(matches!(
      err.downcast_ref::<SyncError>(),
      Some(SyncError::MalformedQueue(_))
    ));
    assert!(h.network.posted().is_empty());
    assert_eq!(
      h.local
        .get_item(PENDING_TRANSACTIONS_KEY)
        .unwrap()
        .as_deref(),
      Some("{not json")
    );
  }

  #[tokio::test]
  async fn test_other_tags_are_ignored() {
    let h = Harness::new(FakeNetwork::new());
    PendingQueue::enqueue(h.local.as_ref(), json!({"id": "A"})).unwrap();

    assert!(h.worker.sync("sync-profile").await.unwrap().is_none());
    assert!(h.network.posted().is_empty());
    assert_eq!(stored(&h).len(), 1);
  }

  #[tokio::test]
  async fn test_duplicate_records_are_removed_one_at_a_time() {
    let dup = json!({"id": "D"});
    let keep = json!({"id": "K"});
    let h = Harness::new(FakeNetwork::new().reject(keep.clone()));
    for record in [&dup, &keep, &dup] {
      PendingQueue::enqueue(h.local.as_ref(), record.clone()).unwrap();
    }

    let report = h.worker.sync("sync-transactions").await.unwrap().unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(stored(&h), vec![keep]);
  }

  #[tokio::test]
  async fn test_queue_is_persisted_after_each_success() {
    let h = Harness::new(FakeNetwork::new());
    for id in ["A", "B"] {
      PendingQueue::enqueue(h.local.as_ref(), json!({ "id": id })).unwrap();
    }

    let local = Arc::clone(&h.local);
    let mut seen = Vec::new();
    PendingQueue::drain(h.local.as_ref(), |_record| {
      // What is stored when each attempt starts
      seen.push(PendingQueue::load(local.as_ref()).unwrap().len());
      async { Ok(()) }
    })
    .await
    .unwrap();

    assert_eq!(seen, vec![2, 1]);
  }
}
