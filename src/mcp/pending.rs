use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Error, Result};

pub(crate) type Completion = oneshot::Sender<Result<Value>>;

/// One outbound request waiting for its response.
pub(crate) struct PendingRequest {
    created_at: Instant,
    deadline: Instant,
    completion: Completion,
}

/// In-flight requests keyed by id. Each entry resolves at most once and is
/// removed when it does.
#[derive(Default)]
pub(crate) struct PendingRequests {
    table: Mutex<HashMap<u64, PendingRequest>>,
}

impl PendingRequests {
    fn table(&self) -> MutexGuard<'_, HashMap<u64, PendingRequest>> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `id` and returns the receiving half plus the deadline.
    pub(crate) fn register(&self, id: u64, timeout: Duration) -> (oneshot::Receiver<Result<Value>>, Instant) {
        let (completion, rx) = oneshot::channel();
        let created_at = Instant::now();
        let deadline = created_at + timeout;
        let previous = self.table().insert(
            id,
            PendingRequest {
                created_at,
                deadline,
                completion,
            },
        );
        debug_assert!(previous.is_none(), "request id {} reused while outstanding", id);
        (rx, deadline)
    }

    /// Completes and removes `id`. Returns false when nothing was waiting.
    pub(crate) fn resolve(&self, id: u64, outcome: Result<Value>) -> bool {
        let Some(pending) = self.table().remove(&id) else {
            return false;
        };
        tracing::debug!(
            "request {} resolved after {:?}",
            id,
            pending.created_at.elapsed()
        );
        // the waiter may have given up already
        let _ = pending.completion.send(outcome);
        true
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        self.table().remove(&id).is_some()
    }

    /// Fails every outstanding request and returns how many there were.
    pub(crate) fn fail_all(&self, error: impl Fn() -> Error) -> usize {
        let drained: Vec<(u64, PendingRequest)> = self.table().drain().collect();
        let count = drained.len();
        for (id, pending) in drained {
            tracing::debug!("failing request {} ({:?} before deadline)", id, pending.deadline.saturating_duration_since(Instant::now()));
            let _ = pending.completion.send(Err(error()));
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: u64) -> bool {
        self.table().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_once_and_removes() {
        let pending = PendingRequests::default();
        let (rx, _) = pending.register(1, Duration::from_secs(5));
        assert!(pending.contains(1));

        assert!(pending.resolve(1, Ok(Value::Bool(true))));
        assert!(!pending.resolve(1, Ok(Value::Bool(false))));
        assert_eq!(rx.await.unwrap().unwrap(), Value::Bool(true));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn fail_all_drains_the_table() {
        let pending = PendingRequests::default();
        let (first, _) = pending.register(1, Duration::from_secs(5));
        let (second, _) = pending.register(2, Duration::from_secs(5));

        assert_eq!(pending.fail_all(|| Error::ConnectionLost), 2);
        assert!(matches!(first.await.unwrap(), Err(Error::ConnectionLost)));
        assert!(matches!(second.await.unwrap(), Err(Error::ConnectionLost)));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn deadline_follows_timeout() {
        let pending = PendingRequests::default();
        let before = Instant::now();
        let (_rx, deadline) = pending.register(9, Duration::from_millis(250));
        assert!(deadline >= before + Duration::from_millis(250));
        assert!(pending.remove(9));
        assert!(!pending.remove(9));
    }
}
