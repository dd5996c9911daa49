//! # Previously, on scrollmeter...
//!
//! 🎬 The cluster was down for maintenance. The tests still had to run. Someone had to
//! pretend to be Elasticsearch. Someone had to hand out scroll ids, remember which one
//! was current, and reject the stale ones with the cold indifference of a real cluster.
//!
//! That someone was this module.
//!
//! `in_mem` provides a scripted [`ScrollClient`]: a list of pages, served in order, then
//! empty pages forever. It issues a fresh cursor per fetch and insists you use the latest
//! one. It can be told to fail on the Nth fetch, or to dawdle before answering, so the
//! pipeline's unhappy paths get exercised without a cluster, a VPN, or a prayer.
//!
//! 🦆
//!
//! ⚠️ Also usable from config (`[source_config.InMemory]`) for dry runs. A dry run that
//! measures four made-up documents is still more honest than most dashboards.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::backends::ScrollClient;
use crate::common::{QuerySpec, Record, ScrollCursor, ScrollPage, ScrollTtl};
use crate::error::ScanError;

/// 📦 Scripted pages for the in-memory backend. Each inner list is one page of `_source`
/// objects; the empty terminating page is implied.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemorySourceConfig {
    #[serde(default)]
    pub pages: Vec<Vec<Value>>,
}

/// 🧨 Which flavour of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Connection,
    Malformed,
    CursorExpired,
}

impl InjectedFailure {
    fn into_error(self, fetch: usize) -> ScanError {
        match self {
            InjectedFailure::Connection => ScanError::Connection(format!("injected transport failure on fetch {fetch}")),
            InjectedFailure::Malformed => ScanError::MalformedResponse(format!("injected garbage on fetch {fetch}")),
            InjectedFailure::CursorExpired => ScanError::CursorExpired(format!("injected expiry on fetch {fetch}")),
        }
    }
}

/// 📊 Shared scoreboard, readable after the backend has been moved into a worker.
///
/// Same trick as a sink that keeps its received batches behind an `Arc`: tests hold a
/// clone, the pipeline holds the other, and everyone agrees on the numbers afterwards.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    fetches: AtomicUsize,
    clears: AtomicUsize,
}

impl InMemoryLedger {
    /// 🔢 Total fetch calls: the opening query plus every continuation.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

/// 📦 The pretend cluster.
#[derive(Debug)]
pub struct InMemoryScroll {
    pages: Vec<Vec<Record>>,
    // -- 🔢 index of the next page to serve
    next_page: usize,
    // -- 🧭 the one cursor token we currently accept. None = no open scroll.
    live_token: Option<String>,
    ttl: ScrollTtl,
    failure: Option<(usize, InjectedFailure)>,
    delay: Option<Duration>,
    ledger: Arc<InMemoryLedger>,
}

impl InMemoryScroll {
    pub fn new(pages: Vec<Vec<Record>>) -> Self {
        Self {
            pages,
            next_page: 0,
            live_token: None,
            ttl: ScrollTtl::default(),
            failure: None,
            delay: None,
            ledger: Arc::new(InMemoryLedger::default()),
        }
    }

    pub fn from_config(config: &InMemorySourceConfig) -> Self {
        let pages = config
            .pages
            .iter()
            .map(|page| page.iter().cloned().map(Record::from).collect())
            .collect();
        Self::new(pages)
    }

    /// 🧪 Pages of `{"<field>": "<content>"}` records, built from plain strings.
    pub fn from_contents(field: &str, pages: &[&[&str]]) -> Self {
        let pages = pages
            .iter()
            .map(|page| {
                page.iter()
                    .map(|content| {
                        let mut map = serde_json::Map::new();
                        map.insert(field.to_string(), Value::String((*content).to_string()));
                        Record(map)
                    })
                    .collect()
            })
            .collect();
        Self::new(pages)
    }

    /// 🧨 Fail the `fetch`-th call (1-based: 1 is the opening query).
    pub fn fail_on_fetch(mut self, fetch: usize, failure: InjectedFailure) -> Self {
        self.failure = Some((fetch, failure));
        self
    }

    /// 🐢 Sleep before every answer. For timeout and cancellation drills.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn ledger(&self) -> Arc<InMemoryLedger> {
        Arc::clone(&self.ledger)
    }

    /// 🔄 Shared body of open and continue: count, maybe dawdle, maybe fail, serve a page.
    async fn serve(&mut self) -> Result<ScrollPage, ScanError> {
        let fetch = self.ledger.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((fail_at, failure)) = self.failure {
            if fail_at == fetch {
                return Err(failure.into_error(fetch));
            }
        }

        let records = self.pages.get(self.next_page).cloned().unwrap_or_default();
        self.next_page += 1;
        let token = format!("in-mem-cursor-{fetch}");
        self.live_token = Some(token.clone());
        Ok(ScrollPage {
            records,
            cursor: Some(ScrollCursor::new(token, self.ttl.clone())),
        })
    }
}

#[async_trait]
impl ScrollClient for InMemoryScroll {
    async fn open_scroll(&mut self, _query: &QuerySpec, ttl: &ScrollTtl) -> Result<ScrollPage, ScanError> {
        self.next_page = 0;
        self.ttl = ttl.clone();
        self.serve().await
    }

    async fn continue_scroll(&mut self, cursor: &ScrollCursor) -> Result<ScrollPage, ScanError> {
        // -- 🪦 stale or cleared cursors get the same treatment a real cluster gives them
        if self.live_token.as_deref() != Some(cursor.token.as_str()) {
            return Err(ScanError::CursorExpired(format!(
                "in-memory backend does not know cursor {cursor}"
            )));
        }
        self.serve().await
    }

    async fn clear_scroll(&mut self, _cursor: &ScrollCursor) -> Result<(), ScanError> {
        self.ledger.clears.fetch_add(1, Ordering::SeqCst);
        self.live_token = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> QuerySpec {
        QuerySpec::new(Vec::new(), 2, "content")
    }

    #[tokio::test]
    async fn the_one_where_pages_come_out_in_order_then_nothing_forever() {
        let mut mem = InMemoryScroll::from_contents("content", &[&["a", "bb"], &["ccc"]]);
        let first = mem.open_scroll(&query(), &ScrollTtl::default()).await.unwrap();
        assert_eq!(first.records.len(), 2);

        let second = mem.continue_scroll(first.cursor.as_ref().unwrap()).await.unwrap();
        assert_eq!(second.records.len(), 1);

        let third = mem.continue_scroll(second.cursor.as_ref().unwrap()).await.unwrap();
        assert!(third.is_empty());
        assert_eq!(mem.ledger().fetches(), 3);
    }

    #[tokio::test]
    async fn the_one_where_yesterdays_cursor_is_rejected() {
        let mut mem = InMemoryScroll::from_contents("content", &[&["a"], &["b"], &["c"]]);
        let first = mem.open_scroll(&query(), &ScrollTtl::default()).await.unwrap();
        let stale = first.cursor.clone().unwrap();
        let _second = mem.continue_scroll(&stale).await.unwrap();

        let err = mem.continue_scroll(&stale).await.unwrap_err();
        assert!(matches!(err, ScanError::CursorExpired(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn the_one_where_a_cleared_cursor_stays_dead() {
        let mut mem = InMemoryScroll::from_contents("content", &[&["a"], &["b"]]);
        let first = mem.open_scroll(&query(), &ScrollTtl::default()).await.unwrap();
        let cursor = first.cursor.unwrap();
        mem.clear_scroll(&cursor).await.unwrap();

        assert!(matches!(
            mem.continue_scroll(&cursor).await,
            Err(ScanError::CursorExpired(_))
        ));
        assert_eq!(mem.ledger().clears(), 1);
    }

    #[tokio::test]
    async fn the_one_where_the_third_fetch_trips_on_purpose() {
        let mut mem = InMemoryScroll::from_contents("content", &[&["a"], &["b"], &["c"]])
            .fail_on_fetch(3, InjectedFailure::Connection);
        let first = mem.open_scroll(&query(), &ScrollTtl::default()).await.unwrap();
        let second = mem.continue_scroll(first.cursor.as_ref().unwrap()).await.unwrap();
        let err = mem.continue_scroll(second.cursor.as_ref().unwrap()).await.unwrap_err();
        assert!(matches!(err, ScanError::Connection(_)));
    }

    #[test]
    fn the_one_where_config_pages_become_records() {
        let config: InMemorySourceConfig = serde_json::from_str(
            r#"{ "pages": [ [ {"content": "hi"}, {"content": "there"} ], [] ] }"#,
        )
        .expect("config should parse");
        let mem = InMemoryScroll::from_config(&config);
        assert_eq!(mem.pages.len(), 2);
        assert_eq!(mem.pages[0][1].measure("content", 1, 1).unwrap().bytes(), 5);
    }
}
