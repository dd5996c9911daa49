//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 A backend knows how to open a scroll, keep it going, and let it go. That's it.
//! It does not measure anything. It does not count anything. It fetches pages and hands
//! them over like a librarian who refuses to discuss the plot.
//!
//! 🎭 This module is the casting agency. Need to scroll a real Elasticsearch cluster?
//! Need a scripted fake that fails on the third fetch so you can watch the pipeline
//! fall over on purpose? We've got a backend for both.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::SourceConfig;
use crate::common::{QuerySpec, ScrollCursor, ScrollPage, ScrollTtl};
use crate::error::ScanError;

pub mod elasticsearch;
pub mod in_mem;

// 🎯 Re-export backend-specific configs so callers can do `backends::ElasticsearchSourceConfig`
// instead of spelunking into `backends::elasticsearch::ElasticsearchSourceConfig`.
pub use elasticsearch::ElasticsearchSourceConfig;
pub use in_mem::InMemorySourceConfig;

/// 📡 The search collaborator: a service that can page through a filtered result set
/// with a server-side cursor.
///
/// # Contract
/// - `open_scroll` runs the filtered query with a keep-alive and returns the first page
///   plus the first cursor.
/// - `continue_scroll` trades the latest cursor for the next page and a refreshed cursor.
///   Cursors are stateful per call: always use the one you were handed last.
/// - End of scan is an EMPTY page. Not a status code, not a flag. An empty page.
/// - Errors are `ScanError`s and every one of them is fatal to the scan.
/// - `clear_scroll` is a courtesy. The caller treats its failure as a warning.
///
/// `&mut self` because the fakes keep score, and because sources have state. And feelings.
#[async_trait]
pub trait ScrollClient: std::fmt::Debug + Send {
    /// 🚀 Run the query, open the cursor, return page one.
    async fn open_scroll(&mut self, query: &QuerySpec, ttl: &ScrollTtl) -> Result<ScrollPage, ScanError>;
    /// 🔄 Next page, please. Uses the cursor's own TTL for the keep-alive.
    async fn continue_scroll(&mut self, cursor: &ScrollCursor) -> Result<ScrollPage, ScanError>;
    /// 🗑️ Tell the service it can forget this cursor.
    async fn clear_scroll(&mut self, cursor: &ScrollCursor) -> Result<(), ScanError>;
}

/// 🎭 The many faces of a scroll backend, dispatched by enum so the paginator never needs
/// to know whether it's talking to a cluster or to a Vec.
///
/// Ancient proverb: "He who hardcodes the backend, tests only in production."
#[derive(Debug)]
pub enum ScrollBackend {
    Elasticsearch(elasticsearch::ElasticsearchScroll),
    InMemory(in_mem::InMemoryScroll),
}

impl ScrollBackend {
    /// 🏗️ Build whichever backend the config asked for.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Ok(match config {
            SourceConfig::Elasticsearch(es) => {
                ScrollBackend::Elasticsearch(elasticsearch::ElasticsearchScroll::new(es.clone())?)
            }
            SourceConfig::InMemory(mem) => ScrollBackend::InMemory(in_mem::InMemoryScroll::from_config(mem)),
        })
    }

    /// 🏷️ Human label for logs and the progress display.
    pub fn label(&self) -> String {
        match self {
            ScrollBackend::Elasticsearch(es) => es.label(),
            ScrollBackend::InMemory(_) => "in-memory".to_string(),
        }
    }
}

#[async_trait]
impl ScrollClient for ScrollBackend {
    async fn open_scroll(&mut self, query: &QuerySpec, ttl: &ScrollTtl) -> Result<ScrollPage, ScanError> {
        match self {
            ScrollBackend::Elasticsearch(es) => es.open_scroll(query, ttl).await,
            ScrollBackend::InMemory(mem) => mem.open_scroll(query, ttl).await,
        }
    }

    async fn continue_scroll(&mut self, cursor: &ScrollCursor) -> Result<ScrollPage, ScanError> {
        match self {
            ScrollBackend::Elasticsearch(es) => es.continue_scroll(cursor).await,
            ScrollBackend::InMemory(mem) => mem.continue_scroll(cursor).await,
        }
    }

    async fn clear_scroll(&mut self, cursor: &ScrollCursor) -> Result<(), ScanError> {
        match self {
            ScrollBackend::Elasticsearch(es) => es.clear_scroll(cursor).await,
            ScrollBackend::InMemory(mem) => mem.clear_scroll(cursor).await,
        }
    }
}
