//! Single-flight upstream fetch coalescing (spec §4.6 "at most one live
//! upstream read per (proxy, channel) is coalesced").
//!
//! Concurrent requests for the same channel while a fetch is already
//! in-flight share its result instead of issuing a second upstream pull.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell};

use crate::errors::{AppError, AppResult};
use crate::models::Id;

type Key = (Id, Id);
type Cell = Arc<OnceCell<Result<Bytes, String>>>;

#[derive(Default)]
pub struct CollapsingBroadcaster {
    inflight: Mutex<HashMap<Key, Cell>>,
}

impl CollapsingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fetch` for `key`, or waits on an identical in-flight fetch
    /// started by another caller. The entry is evicted once the fetch
    /// completes so the next request gets a fresh pull.
    pub async fn fetch_once<F, Fut>(&self, key: Key, fetch: F) -> AppResult<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Bytes>>,
    {
        let cell: Cell = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = cell.get_or_init(|| async move { fetch().await.map_err(|e| e.to_string()) }).await;

        self.inflight.lock().await.remove(&key);

        match result {
            Ok(bytes) => Ok(bytes.clone()),
            Err(message) => Err(AppError::fatal_upstream("stream_gateway", message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::new_id;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn concurrent_fetches_for_same_key_share_one_upstream_call() {
        let broadcaster = Arc::new(CollapsingBroadcaster::new());
        let calls = Arc::new(AtomicU32::new(0));
        let key = (new_id(), new_id());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let broadcaster = broadcaster.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                broadcaster
                    .fetch_once(key, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(Bytes::from_static(b"payload"))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), Bytes::from_static(b"payload"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_fetches_after_completion_run_again() {
        let broadcaster = CollapsingBroadcaster::new();
        let calls = Arc::new(AtomicU32::new(0));
        let key = (new_id(), new_id());

        for _ in 0..2 {
            let calls = calls.clone();
            broadcaster
                .fetch_once(key, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Bytes::from_static(b"x"))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
