//! 🏁 The final report: the one table anybody actually reads.
//!
//! Built from `RunningStats` after both workers are home, and only after a successful
//! scan. A failed scan gets an error and a cause chain instead. Half a total is worse than
//! no total, because somebody will put half a total in a slide deck.

use std::fmt;
use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};

use crate::common::RunningStats;
use crate::progress::{format_duration, format_number};

// -- 📏 a gibibyte. 1024³, not 10⁹. the hill from progress.rs continues.
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 🏁 Everything the operator asked for, frozen at the moment the scan finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalReport {
    pub total_bytes: u64,
    pub count: u64,
    pub elapsed: Duration,
}

impl FinalReport {
    /// 📐 Bytes expressed in GiB. `Display` rounds it to two decimals.
    pub fn gibibytes(&self) -> f64 {
        self.total_bytes as f64 / GIB
    }
}

impl From<&RunningStats> for FinalReport {
    fn from(stats: &RunningStats) -> Self {
        Self {
            total_bytes: stats.total_bytes,
            count: stats.count,
            elapsed: stats.elapsed(),
        }
    }
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["📏 measured", "value"]);

        let rows = [
            ("total bytes", format_number(self.total_bytes)),
            ("total GiB", format!("{:.2}", self.gibibytes())),
            ("records", format_number(self.count)),
            ("elapsed", format_duration(self.elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![Cell::new(label), Cell::new(value).set_alignment(CellAlignment::Right)]);
        }
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_gibibyte_is_exactly_one_point_oh_oh() {
        let report = FinalReport {
            total_bytes: 1024 * 1024 * 1024,
            count: 1_234_567,
            elapsed: Duration::from_secs(125),
        };
        let rendered = report.to_string();
        assert!(rendered.contains("1.00"), "GiB with two decimals: {rendered}");
        assert!(rendered.contains("1,073,741,824"), "total bytes, comma grouped: {rendered}");
        assert!(rendered.contains("1,234,567"), "record count, comma grouped: {rendered}");
        assert!(rendered.contains("02:05"), "elapsed as MM:SS: {rendered}");
    }

    #[test]
    fn the_one_where_small_totals_round_down_to_nothing_much() {
        let report = FinalReport {
            total_bytes: 24,
            count: 4,
            elapsed: Duration::ZERO,
        };
        assert!(report.to_string().contains("0.00"));
        assert!(report.gibibytes() > 0.0);
    }

    #[test]
    fn the_one_where_stats_become_a_report() {
        let mut stats = RunningStats::new(std::time::Instant::now());
        stats.record(crate::common::Measurement(5));
        stats.record(crate::common::Measurement(7));
        let report = FinalReport::from(&stats);
        assert_eq!((report.total_bytes, report.count), (12, 2));
    }
}
