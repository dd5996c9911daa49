//! 🎬 *[a channel fills with measurements. somewhere, an aggregator waits.]*
//! *[the clock on the wall reads 2:47am.]*
//! *[nobody asked how many bytes of content there are. and yet, here we are.]*
//!
//! ➕ The Aggregator — patient, tireless, and deeply unbothered by the chaos happening
//! upstream. It receives numbers. It adds numbers. Every so often it says how many
//! numbers it has added. It is, in many ways, the most emotionally stable part of this
//! entire codebase.
//!
//! 🦆 (the duck has no comment at this time)
//!
//! ⚠️ The Aggregator never stops on its own. It stops when the channel is closed AND
//! empty, which means every measurement the paginator sent got counted. Exactly once.

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Worker;
use crate::common::{Measurement, RunningStats};
use crate::progress::{ProgressSink, ProgressSnapshot};

/// ➕ Takes measurements from a channel and folds them into `RunningStats`.
#[derive(Debug)]
pub(crate) struct Aggregator {
    rx: Receiver<Measurement>,
    stats: RunningStats,
    progress_interval: u64,
    progress: ProgressSink,
}

impl Aggregator {
    /// 🏗️ You hand it a receiver, a blank scoreboard, and a place to shout progress.
    /// It does not judge. It does not negotiate. It adds.
    pub(crate) fn new(rx: Receiver<Measurement>, stats: RunningStats, progress_interval: u64, progress: ProgressSink) -> Self {
        Self {
            rx,
            stats,
            // -- 🛡️ `% 0` panics; validation rejects 0 but embedders skip validation
            progress_interval: progress_interval.max(1),
            progress,
        }
    }
}

impl Worker for Aggregator {
    type Output = RunningStats;

    fn start(mut self) -> JoinHandle<Result<RunningStats>> {
        tokio::spawn(async move {
            debug!("📥 Aggregator started draining channel...");
            loop {
                match self.rx.recv().await {
                    Ok(measurement) => {
                        let count = self.stats.record(measurement);
                        if count % self.progress_interval == 0 {
                            self.progress.snapshot(ProgressSnapshot {
                                count,
                                total_bytes: self.stats.total_bytes,
                                elapsed: self.stats.elapsed(),
                            });
                        }
                    }
                    Err(_) => {
                        // Channel is empty and closed
                        debug!(
                            "🏁 Aggregator: channel closed after {} measurements. Shutting down.",
                            self.stats.count
                        );
                        self.progress.finish();
                        return Ok(self.stats);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn the_one_where_progress_shows_up_every_tenth_record() {
        let (tx, rx) = async_channel::bounded(64);
        let (sink, seen) = ProgressSink::collecting();
        let handle = Aggregator::new(rx, RunningStats::new(Instant::now()), 10, sink).start();

        for bytes in 1..=25u64 {
            tx.send(Measurement(bytes)).await.unwrap();
        }
        tx.close();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.count, 25);
        assert_eq!(stats.total_bytes, (1..=25u64).sum::<u64>());

        let seen = seen.lock().unwrap();
        let counts: Vec<u64> = seen.iter().map(|snapshot| snapshot.count).collect();
        assert_eq!(counts, vec![10, 20], "floor(25 / 10) snapshots, at the 10th and 20th record");
        assert_eq!(seen[0].total_bytes, (1..=10u64).sum::<u64>());
    }

    #[tokio::test]
    async fn the_one_where_nothing_arrives_and_zero_is_the_answer() {
        let (tx, rx) = async_channel::bounded::<Measurement>(4);
        let (sink, seen) = ProgressSink::collecting();
        let handle = Aggregator::new(rx, RunningStats::new(Instant::now()), 10, sink).start();
        drop(tx);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!((stats.count, stats.total_bytes), (0, 0));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn the_one_where_closing_early_still_counts_whats_queued() {
        let (tx, rx) = async_channel::bounded(8);
        for bytes in [3u64, 4, 5] {
            tx.send(Measurement(bytes)).await.unwrap();
        }
        // -- 🚪 closed before the aggregator even started. the queue still drains.
        tx.close();
        let (sink, _seen) = ProgressSink::collecting();
        let stats = Aggregator::new(rx, RunningStats::new(Instant::now()), 2, sink)
            .start()
            .await
            .unwrap()
            .unwrap();
        assert_eq!((stats.count, stats.total_bytes), (3, 12));
    }
}
