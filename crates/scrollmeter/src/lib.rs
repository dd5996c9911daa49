//! 📏 scrollmeter — walk a search index with a scroll cursor and add up how many bytes
//! one field takes, across every matching document.
//!
//! 🧵 Two workers and a bounded channel: a paginator fetches and weighs, an aggregator
//! sums. Backpressure keeps memory flat no matter how big the index is. When the scroll
//! hands back an empty page, you get a total. When anything breaks, you get an error.
//! Never a half-total. 🦆

pub mod app_config;
pub mod backends;
pub mod common;
pub mod error;
pub mod progress;
pub mod report;
mod supervisors;

use std::time::Instant;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::app_config::AppConfig;
use crate::common::RunningStats;
use crate::supervisors::Supervisor;

pub use crate::error::ScanError;
pub use crate::report::FinalReport;

/// 🚀 Run one scan to completion (or to its first fatal error).
///
/// `started_at` is the clock the elapsed time is measured from; pass the process start if
/// you want startup included. Cancel `cancel` to stop early: the scan then ends with
/// [`ScanError::Cancelled`] somewhere in the error chain.
pub async fn run(app_config: AppConfig, cancel: CancellationToken, started_at: Instant) -> Result<RunningStats> {
    Supervisor::new(app_config)
        .run(cancel, started_at)
        .await
        .context("💀 scrollmeter scan did not complete")
}
