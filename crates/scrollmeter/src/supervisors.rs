//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module — part middle manager, part helicopter parent. It builds the
//! channel, hires a paginator and an aggregator, and then waits. In that order. Always.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! ⚠️ YOU HAVE BEEN WARNED
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT
//! 🔒 Like Fight Club, but for async tasks. First rule: you don't pub the workers.

mod workers;

use std::time::Instant;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app_config::AppConfig;
use crate::backends::ScrollBackend;
use crate::common::RunningStats;
use crate::progress::ProgressSink;
use workers::{Aggregator, Paginator, Worker};

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?"
pub(crate) struct Supervisor {
    /// 🔧 The sacred scrolls of configuration, passed down from main()
    /// through the ancient ritual of .clone()
    app_config: AppConfig,
}

impl Supervisor {
    /// 🚀 Birth of a Supervisor. It's like a baby, but less crying.
    /// Actually no, there's plenty of crying. Mostly from the developer.
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🧵 Build the configured backend and progress sink, then run the scan.
    pub(crate) async fn run(&self, cancel: CancellationToken, started_at: Instant) -> Result<RunningStats> {
        let backend = ScrollBackend::from_config(&self.app_config.source_config)
            .context("💀 Supervisor could not build the scroll backend. Check source_config.")?;
        let progress = ProgressSink::from_style(self.app_config.runtime.progress_style, backend.label());
        self.run_with(backend, progress, cancel, started_at).await
    }

    /// 🧵 Unleash the workers on an already-built backend.
    ///
    /// Spawns the aggregator, then the paginator, then awaits the paginator FIRST and the
    /// aggregator SECOND. The paginator closes the channel on every exit, so the second
    /// await always terminates. A paginator error wins over whatever the aggregator says,
    /// but only after the aggregator has drained and gone home.
    pub(crate) async fn run_with(
        &self,
        backend: ScrollBackend,
        progress: ProgressSink,
        cancel: CancellationToken,
        started_at: Instant,
    ) -> Result<RunningStats> {
        let runtime = &self.app_config.runtime;
        let source = backend.label();
        info!(
            source = %source,
            queue_capacity = runtime.queue_capacity,
            progress_interval = runtime.progress_interval,
            "🚀 Supervisor starting scan"
        );

        // 📬 bounded: when it's full the paginator waits. that's the whole memory budget.
        let (tx, rx) = async_channel::bounded(runtime.queue_capacity);
        let aggregator = Aggregator::new(rx, RunningStats::new(started_at), runtime.progress_interval, progress);
        let paginator = Paginator::new(
            backend,
            self.app_config.query.query_spec(),
            self.app_config.query.scroll_ttl.clone(),
            tx,
            runtime.fetch_timeout(),
            cancel,
        );

        let aggregator_handle = aggregator.start();
        let paginator_handle = paginator.start();

        let scanned = paginator_handle.await;
        let aggregated = aggregator_handle.await;

        let summary = scanned
            .context("💀 Paginator task panicked or was aborted")?
            .with_context(|| format!("💀 Scan of {source} failed"))?;
        let stats = aggregated
            .context("💀 Aggregator task panicked or was aborted")?
            .context("💀 Aggregator failed")?;

        debug!(
            fetches = summary.fetches,
            pages = summary.pages,
            measurements = summary.measurements,
            counted = stats.count,
            "🏁 Supervisor: both workers are home"
        );
        Ok(stats)
    }
}
