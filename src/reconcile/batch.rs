use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Coalesces per-entity writes behind a "latest desired wins" map, so a burst
/// of informer events for the same entity produces at most one Store write
/// per flush instead of one write per event (spec.md §4.3/§5/§9: "at most
/// one in-flight Store write per entity ARN").
///
/// Flushes on whichever comes first: the ticker, the pending-count crossing
/// `threshold`, an explicit `trigger`, or cancellation — in which case a
/// final flush runs before the updater returns, bounded by
/// `shutdown_grace`.
pub struct BatchUpdater<V> {
    pending: Mutex<HashMap<String, V>>,
    notify: Notify,
    threshold: usize,
}

impl<V: Clone + Send + 'static> BatchUpdater<V> {
    pub fn new(threshold: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            threshold,
        }
    }

    /// Records the latest desired value for `key`, overwriting whatever was
    /// pending. Triggers an out-of-band flush once `threshold` distinct keys
    /// are pending.
    pub fn stage(&self, key: String, value: V) {
        let len = {
            let mut pending = self.pending.lock().unwrap();
            pending.insert(key, value);
            pending.len()
        };
        if len >= self.threshold {
            self.notify.notify_one();
        }
    }

    fn drain(&self) -> HashMap<String, V> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    /// Runs the flush loop until `cancellation` fires, then performs one
    /// final flush (spec.md §4.4 graceful shutdown: "bounded grace-window
    /// final flush") and returns.
    pub async fn run<F, Fut>(
        &self,
        flush_interval: Duration,
        shutdown_grace: Duration,
        cancellation: CancellationToken,
        mut flush: F,
    ) where
        F: FnMut(HashMap<String, V>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_if_nonempty(&mut flush).await;
                }
                _ = self.notify.notified() => {
                    self.flush_if_nonempty(&mut flush).await;
                }
                _ = cancellation.cancelled() => {
                    info!("batch updater shutting down, performing final flush");
                    let outcome = tokio::time::timeout(
                        shutdown_grace,
                        self.flush_if_nonempty(&mut flush),
                    )
                    .await;
                    if outcome.is_err() {
                        warn!("final flush did not complete within the shutdown grace window");
                    }
                    return;
                }
            }
        }
    }

    async fn flush_if_nonempty<F, Fut>(&self, flush: &mut F)
    where
        F: FnMut(HashMap<String, V>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let batch = self.drain();
        if batch.is_empty() {
            return;
        }
        debug!(count = batch.len(), "flushing batched updates");
        flush(batch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn explicit_threshold_triggers_flush_without_waiting_for_ticker() {
        let updater = Arc::new(BatchUpdater::<i32>::new(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();

        let run_updater = updater.clone();
        let run_cancellation = cancellation.clone();
        let handle = tokio::spawn(async move {
            run_updater
                .run(Duration::from_secs(3600), Duration::from_secs(1), run_cancellation, |batch| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(batch.len());
                    }
                })
                .await;
        });

        updater.stage("a".to_string(), 1);
        updater.stage("b".to_string(), 2);

        let flushed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("flush should happen promptly once threshold is hit")
            .unwrap();
        assert_eq!(flushed, 2);

        cancellation.cancel();
        handle.await.unwrap();
    }
}
