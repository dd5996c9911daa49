//! 📊 progress.rs — "Are we there yet?" — every scan, every time, forever.
//!
//! 🚀 The aggregator hands us a `ProgressSnapshot` every N records. We turn it into a
//! log line, and, if you asked for the fancy mode, a spinner with a table of rates.
//! Nothing in here affects the totals. It's observability, not accounting.
//!
//! ⚠️  Warning: Watching this spinner will not make the cluster go faster.
//! Neither will refreshing it. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle as BarStyle};
use tracing::info;

use crate::app_config::ProgressStyle;

// -- 📏 one mebibyte — not a megabyte, pedants. there's a difference and I will die on this hill.
pub(crate) const MIB: u64 = 1024 * 1024;

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 docs" → "1,000,000 docs" — you're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📸 Where the scan stood when the Nth record went by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub count: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

/// 📡 Throughput at a given moment. Like a speedometer, but for documents.
struct Rates {
    docs_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 The spinner + rate table. Total is unknown (scrolls don't announce their length up
/// front), so there's no percent and no ETA. Just speed and distance travelled.
///
/// Uses a sliding 5-second window for rates so one slow page doesn't look like the end
/// of the world.
pub struct ProgressMetrics {
    source_name: String,
    progress_bar: ProgressBar,
    // -- 🔄 (when, bytes so far, docs so far)
    rate_samples: VecDeque<(Instant, u64, u64)>,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("samples", &self.rate_samples.len())
            .finish()
    }
}

impl ProgressMetrics {
    pub(crate) fn new(source_name: String) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        // -- 🎨 hardcoded template; if indicatif ever rejects it we fall back to the plain spinner
        let style = BarStyle::with_template("{spinner:.cyan} {msg}").unwrap_or_else(|_| BarStyle::default_spinner());
        progress_bar.set_style(style);
        progress_bar.enable_steady_tick(Duration::from_millis(200));

        let mut rate_samples = VecDeque::new();
        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        rate_samples.push_back((Instant::now(), 0u64, 0u64));

        Self {
            source_name,
            progress_bar,
            rate_samples,
        }
    }

    pub(crate) fn update(&mut self, snapshot: &ProgressSnapshot) {
        let rates = self.calculate_rates(snapshot);
        self.render(snapshot, rates);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }

    /// 📈 Rates over the last five seconds of snapshots.
    fn calculate_rates(&mut self, snapshot: &ProgressSnapshot) -> Rates {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        // -- 🔄 evict old samples, but always keep at least one to diff against
        while self.rate_samples.len() > 1 {
            match self.rate_samples.front() {
                Some(&(timestamp, _, _)) if now.duration_since(timestamp) > window => {
                    self.rate_samples.pop_front();
                }
                _ => break,
            }
        }

        let rates = match self.rate_samples.front() {
            Some(&(oldest_time, oldest_bytes, oldest_docs)) => {
                let elapsed = now.duration_since(oldest_time).as_secs_f64();
                if elapsed > 0.0 {
                    let bytes_delta = snapshot.total_bytes.saturating_sub(oldest_bytes);
                    let docs_delta = snapshot.count.saturating_sub(oldest_docs);
                    Rates {
                        docs_per_sec: docs_delta as f64 / elapsed,
                        mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                    }
                } else {
                    Rates { docs_per_sec: 0.0, mib_per_sec: 0.0 }
                }
            }
            None => Rates { docs_per_sec: 0.0, mib_per_sec: 0.0 },
        };

        self.rate_samples.push_back((now, snapshot.total_bytes, snapshot.count));
        rates
    }

    /// 🎨 Two columns, no borders:
    /// ```text
    ///   <docs/s>     <total docs>
    ///   <MiB/s>      <total MiB>
    ///   <elapsed>
    /// ```
    fn render(&self, snapshot: &ProgressSnapshot, rates: Rates) {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![
            Cell::new(format!("{} Docs/s", format_number(rates.docs_per_sec as u64))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Docs", format_number(snapshot.count))).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2} MiB", snapshot.total_bytes as f64 / MIB as f64)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(snapshot.elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(""),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}

/// 🚰 Where snapshots go.
///
/// Every variant logs the snapshot at `info!`; `Terminal` also redraws the spinner, and
/// `Collect` keeps a copy for whoever holds the other end of the `Arc` (tests, embedders).
#[derive(Debug)]
pub enum ProgressSink {
    Log,
    Terminal(Box<ProgressMetrics>),
    Collect(Arc<Mutex<Vec<ProgressSnapshot>>>),
}

impl ProgressSink {
    pub fn from_style(style: ProgressStyle, source_name: String) -> Self {
        match style {
            ProgressStyle::Log => ProgressSink::Log,
            ProgressStyle::Bar => ProgressSink::Terminal(Box::new(ProgressMetrics::new(source_name))),
        }
    }

    /// 🧪 A sink that remembers everything, plus the handle to read it back.
    pub fn collecting() -> (Self, Arc<Mutex<Vec<ProgressSnapshot>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (ProgressSink::Collect(Arc::clone(&seen)), seen)
    }

    pub fn snapshot(&mut self, snapshot: ProgressSnapshot) {
        info!(
            count = snapshot.count,
            total_bytes = snapshot.total_bytes,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "📊 processed {} records, {} bytes so far, {} elapsed",
            format_number(snapshot.count),
            format_number(snapshot.total_bytes),
            format_duration(snapshot.elapsed)
        );
        match self {
            ProgressSink::Log => {}
            ProgressSink::Terminal(metrics) => metrics.update(&snapshot),
            ProgressSink::Collect(seen) => {
                // -- 🔒 a poisoned lock only means a test panicked mid-push; keep the data anyway
                let mut guard = seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.push(snapshot);
            }
        }
    }

    pub fn finish(&mut self) {
        if let ProgressSink::Terminal(metrics) = self {
            metrics.finish();
        }
    }
}
