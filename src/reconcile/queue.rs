use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::time::{delay_queue, DelayQueue};

/// A rate-limited, deduplicating work queue keyed by string (spec.md §9:
/// "no raw polling; watch-driven event handlers feed per-kind rate-limited
/// work queues"). Modeled on client-go's `workqueue.RateLimitingInterface`:
/// a key already scheduled is never scheduled twice, and repeated failure
/// backs a key off exponentially instead of hot-looping.
///
/// The `DelayQueue` itself is owned by a private pump task rather than
/// shared behind a lock — holding a timer queue across an `.await` under a
/// mutex is the classic way to accidentally serialize every producer behind
/// whichever consumer is currently waiting on it, so producers and
/// consumers only ever touch it through channels.
pub struct WorkQueue {
    add_tx: mpsc::UnboundedSender<(String, Duration)>,
    ready_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    processing: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, u32>>,
    max_requeues: u32,
}

const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(120);

impl WorkQueue {
    pub fn new(max_requeues: u32) -> Self {
        let (add_tx, add_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(add_rx, ready_tx));
        Self {
            add_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            processing: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashMap::new()),
            max_requeues,
        }
    }

    /// Enqueues `key` for immediate processing.
    pub fn add(&self, key: impl Into<String>) {
        let _ = self.add_tx.send((key.into(), Duration::ZERO));
    }

    /// Requeues `key` after an exponential backoff. Returns `false` once
    /// `max_requeues` has been exceeded, at which point the caller should
    /// give up and log rather than requeue forever.
    pub fn add_rate_limited(&self, key: impl Into<String>) -> bool {
        let key = key.into();
        let mut failures = self.failures.lock().unwrap();
        let count = failures.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count > self.max_requeues {
            failures.remove(&key);
            return false;
        }
        let backoff = BASE_BACKOFF
            .saturating_mul(1 << (*count - 1).min(20))
            .min(MAX_BACKOFF);
        drop(failures);
        let _ = self.add_tx.send((key, backoff));
        true
    }

    /// Clears the failure count for `key`, called after a successful
    /// reconcile.
    pub fn forget(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    /// Waits for and returns the next ready key, marking it as in progress.
    pub async fn get(&self) -> String {
        let key = {
            let mut rx = self.ready_rx.lock().await;
            rx.recv().await.expect("work queue pump task must not exit")
        };
        self.processing.lock().unwrap().insert(key.clone());
        key
    }

    /// Marks `key` as no longer being processed by any worker.
    pub fn mark_done(&self, key: &str) {
        self.processing.lock().unwrap().remove(key);
    }
}

/// Owns the actual `DelayQueue`. Dedups pending (not-yet-fired) adds against
/// `scheduled`; a key already in flight at the consumer can still be
/// re-added here since the consumer tracks in-progress state separately.
async fn pump(
    mut add_rx: mpsc::UnboundedReceiver<(String, Duration)>,
    ready_tx: mpsc::UnboundedSender<String>,
) {
    use futures::StreamExt;

    let mut delay: DelayQueue<String> = DelayQueue::new();
    let mut scheduled: HashMap<String, delay_queue::Key> = HashMap::new();

    loop {
        tokio::select! {
            op = add_rx.recv() => {
                match op {
                    Some((key, after)) => {
                        if let Some(existing) = scheduled.get(&key) {
                            delay.reset(existing, after);
                        } else {
                            let delay_key = delay.insert(key.clone(), after);
                            scheduled.insert(key, delay_key);
                        }
                    }
                    None => return,
                }
            }
            Some(expired) = delay.next(), if !delay.is_empty() => {
                let key = expired.into_inner();
                scheduled.remove(&key);
                if ready_tx.send(key).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_add_is_deduped() {
        let queue = WorkQueue::new(5);
        queue.add("pod/default/a");
        queue.add("pod/default/a");
        let key = tokio::time::timeout(Duration::from_secs(1), queue.get())
            .await
            .expect("item should become ready");
        assert_eq!(key, "pod/default/a");
        queue.mark_done(&key);
    }

    #[tokio::test]
    async fn add_rate_limited_gives_up_past_max_requeues() {
        let queue = WorkQueue::new(2);
        assert!(queue.add_rate_limited("x"));
        assert!(queue.add_rate_limited("x"));
        assert!(!queue.add_rate_limited("x"));
    }
}
