//! 🎬 *[INT. SEARCH CLUSTER — NIGHT. A scroll cursor blinks into existence.]*
//! *[it has two minutes to live. it does not know this yet.]*
//!
//! 🚰 The Paginator: opens the scroll, walks it page by page, weighs every record, and
//! pushes the weights down the channel. When the service hands back an empty page, it
//! stops. When anything else goes wrong, it also stops, but louder.
//!
//! 🔄 The loop is a two-state machine, `Scanning(page)` and `Done`. No flags, no
//! `while !finished`, no third state that someone adds at 4pm on a Friday.
//!
//! ⚠️ The Paginator owns the only `Sender`. It closes the channel on EVERY exit path,
//! happy or not, so the aggregator always gets to drain and go home.
//!
//! 🦆 The duck reviewed the state machine. The duck approved. The duck is not qualified.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_channel::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::Worker;
use crate::backends::{ScrollBackend, ScrollClient};
use crate::common::{Measurement, QuerySpec, ScrollCursor, ScrollPage, ScrollTtl};
use crate::error::ScanError;

// -- 🛑 after a cancel, the scroll clear gets this long and not a millisecond more
const CANCELLED_CLEAR_GRACE: Duration = Duration::from_secs(2);

/// 📋 What the paginator did, for the logs and the curious.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScanSummary {
    /// 🔢 Fetch calls that came back with a page: the opening query plus continuations.
    pub(crate) fetches: usize,
    /// 📄 Non-empty pages processed.
    pub(crate) pages: usize,
    /// 📏 Measurements handed to the channel.
    pub(crate) measurements: u64,
}

/// 🔄 Where the scroll stands.
enum ScanState {
    Scanning(ScrollPage),
    Done,
}

/// 🚰 The producer half of the scan.
#[derive(Debug)]
pub(crate) struct Paginator {
    client: ScrollBackend,
    query: QuerySpec,
    ttl: ScrollTtl,
    tx: Sender<Measurement>,
    fetch_timeout: Duration,
    cancel: CancellationToken,
}

impl Paginator {
    pub(crate) fn new(
        client: ScrollBackend,
        query: QuerySpec,
        ttl: ScrollTtl,
        tx: Sender<Measurement>,
        fetch_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            query,
            ttl,
            tx,
            fetch_timeout,
            cancel,
        }
    }

    /// 🔄 Open, then walk until an empty page. `latest` always holds the newest cursor
    /// the service gave us, so the caller can clear it no matter how this ends.
    async fn scan(&mut self, summary: &mut ScanSummary, latest: &mut Option<ScrollCursor>) -> Result<(), ScanError> {
        debug!(
            "🚀 Paginator opening scroll: {} filter(s), page size {}, ttl {}",
            self.query.filters.len(),
            self.query.page_size,
            self.ttl
        );
        let first = guarded(
            &self.cancel,
            self.fetch_timeout,
            self.client.open_scroll(&self.query, &self.ttl),
        )
        .await?;
        summary.fetches += 1;

        let mut state = ScanState::Scanning(first);
        loop {
            state = match state {
                ScanState::Done => return Ok(()),
                ScanState::Scanning(page) => {
                    if let Some(cursor) = &page.cursor {
                        *latest = Some(cursor.clone());
                    }
                    if page.is_empty() {
                        debug!("🏁 Paginator got an empty page after {} fetches. Scroll exhausted.", summary.fetches);
                        ScanState::Done
                    } else {
                        summary.pages += 1;
                        let cursor = page.cursor.clone().ok_or_else(|| {
                            ScanError::MalformedResponse(format!(
                                "page {} carried {} records but no scroll id",
                                summary.pages,
                                page.records.len()
                            ))
                        })?;
                        self.weigh_page(&page, summary).await?;

                        let next = guarded(
                            &self.cancel,
                            self.fetch_timeout,
                            self.client.continue_scroll(&cursor),
                        )
                        .await?;
                        summary.fetches += 1;
                        ScanState::Scanning(next)
                    }
                }
            };
        }
    }

    /// 📏 Measure every record on the page, in order, and push each one. Suspends when the
    /// channel is full; that's the backpressure.
    async fn weigh_page(&self, page: &ScrollPage, summary: &mut ScanSummary) -> Result<(), ScanError> {
        trace!("📄 Paginator weighing page {} ({} records)", summary.pages, page.records.len());
        for (position, record) in page.records.iter().enumerate() {
            let measurement = record.measure(&self.query.measured_field, summary.pages, position + 1)?;
            self.push(measurement).await?;
            summary.measurements += 1;
        }
        Ok(())
    }

    async fn push(&self, measurement: Measurement) -> Result<(), ScanError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled),
            sent = self.tx.send(measurement) => sent.map_err(|_| ScanError::SinkClosed),
        }
    }

    /// 🗑️ Ask the service to forget the cursor. A failure here is a warning, never a verdict.
    ///
    /// Bounded by the fetch timeout normally, and by a short grace period once the scan
    /// was cancelled: whoever pressed Ctrl-C wants their terminal back, not a tidy cluster.
    async fn release(&mut self, cursor: &ScrollCursor) {
        let deadline = if self.cancel.is_cancelled() {
            self.fetch_timeout.min(CANCELLED_CLEAR_GRACE)
        } else {
            self.fetch_timeout
        };
        match tokio::time::timeout(deadline, self.client.clear_scroll(cursor)).await {
            Ok(Ok(())) => debug!("🗑️ Paginator cleared scroll {cursor}"),
            Ok(Err(err)) => warn!("⚠️ Paginator could not clear scroll {cursor}: {err}"),
            Err(_) => warn!(
                "⚠️ Paginator gave up clearing scroll {cursor} after {deadline:?}; the service will expire it on its own"
            ),
        }
    }
}

/// ⏱️ Race a fetch against the cancel token and the per-fetch deadline.
async fn guarded<T>(
    cancel: &CancellationToken,
    deadline: Duration,
    fetch: impl Future<Output = Result<T, ScanError>>,
) -> Result<T, ScanError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ScanError::Cancelled),
        outcome = tokio::time::timeout(deadline, fetch) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ScanError::Connection(format!(
                "page fetch exceeded the {deadline:?} deadline"
            ))),
        },
    }
}

impl Worker for Paginator {
    type Output = ScanSummary;

    fn start(mut self) -> JoinHandle<Result<ScanSummary>> {
        tokio::spawn(async move {
            let mut summary = ScanSummary::default();
            let mut latest = None;
            let outcome = self.scan(&mut summary, &mut latest).await;

            // -- 🚪 close first, so the aggregator can finish draining while we tidy up
            self.tx.close();
            if let Some(cursor) = latest {
                self.release(&cursor).await;
            }

            match outcome {
                Ok(()) => {
                    info!(
                        fetches = summary.fetches,
                        pages = summary.pages,
                        measurements = summary.measurements,
                        "✅ Paginator finished the scroll"
                    );
                    Ok(summary)
                }
                Err(err) => {
                    warn!(
                        kind = err.kind(),
                        fetches = summary.fetches,
                        measurements = summary.measurements,
                        "💀 Paginator stopped: {err}"
                    );
                    Err(anyhow::Error::new(err).context(format!(
                        "💀 Paginator aborted after {} fetches and {} measurements",
                        summary.fetches, summary.measurements
                    )))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::elasticsearch::{ElasticsearchScroll, ElasticsearchSourceConfig};
    use crate::backends::in_mem::{InMemoryScroll, InjectedFailure};
    use crate::common::Record;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use serde_json::json;

    fn paginator(mem: InMemoryScroll, tx: Sender<Measurement>, fetch_timeout: Duration, cancel: CancellationToken) -> Paginator {
        Paginator::new(
            ScrollBackend::InMemory(mem),
            QuerySpec::new(Vec::new(), 10, "content"),
            ScrollTtl::default(),
            tx,
            fetch_timeout,
            cancel,
        )
    }

    fn scan_error(err: &anyhow::Error) -> &ScanError {
        err.downcast_ref::<ScanError>().expect("a ScanError should be in the chain")
    }

    #[tokio::test]
    async fn the_one_where_a_stalled_aggregator_makes_the_paginator_wait() {
        let mem = InMemoryScroll::from_contents("content", &[&["a", "bb", "ccc", "dddd", "eeeee", "ffffff"]]);
        let ledger = mem.ledger();
        let (tx, rx) = async_channel::bounded(2);
        let handle = paginator(mem, tx, Duration::from_secs(5), CancellationToken::new()).start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // -- 🧱 two slots, both full, paginator parked on the third send
        assert_eq!(rx.len(), 2);
        assert!(!handle.is_finished(), "paginator should be blocked on a full channel");
        assert_eq!(ledger.fetches(), 1, "no continuation while the first page is still being pushed");

        let mut seen = Vec::new();
        while let Ok(measurement) = rx.recv().await {
            seen.push(measurement.bytes());
        }
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6], "FIFO, exactly once, in page order");
        assert_eq!(summary, ScanSummary { fetches: 2, pages: 1, measurements: 6 });
        assert_eq!(ledger.clears(), 1);
    }

    #[tokio::test]
    async fn the_one_where_the_cluster_takes_a_nap_and_the_deadline_does_not() {
        let mem = InMemoryScroll::from_contents("content", &[&["a"]]).with_delay(Duration::from_millis(500));
        let (tx, rx) = async_channel::bounded(4);
        let handle = paginator(mem, tx, Duration::from_millis(20), CancellationToken::new()).start();

        let err = handle.await.unwrap().unwrap_err();
        match scan_error(&err) {
            ScanError::Connection(msg) => assert!(msg.contains("deadline"), "got {msg}"),
            other => panic!("expected a connection error, got {other:?}"),
        }
        assert!(rx.recv().await.is_err(), "channel must be closed after a failure");
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_lands_mid_fetch() {
        let mem = InMemoryScroll::from_contents("content", &[&["a"]]).with_delay(Duration::from_secs(30));
        let (tx, rx) = async_channel::bounded(4);
        let cancel = CancellationToken::new();
        let handle = paginator(mem, tx, Duration::from_secs(60), cancel.clone()).start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("cancellation should not wait out the slow fetch");
        let err = joined.unwrap().unwrap_err();
        assert!(matches!(scan_error(&err), ScanError::Cancelled));
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_lands_while_the_channel_is_full() {
        let mem = InMemoryScroll::from_contents("content", &[&["a", "b", "c", "d"]]);
        let ledger = mem.ledger();
        let (tx, rx) = async_channel::bounded(1);
        let cancel = CancellationToken::new();
        let handle = paginator(mem, tx, Duration::from_secs(5), cancel.clone()).start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(scan_error(&err), ScanError::Cancelled));
        // -- 🗑️ the cursor was still live, so it still gets cleared
        assert_eq!(ledger.clears(), 1);
        // -- 📬 the one measurement that made it in is still there to drain
        assert_eq!(rx.recv().await.unwrap().bytes(), 1);
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_a_record_forgot_its_content() {
        let pages: Vec<Vec<Record>> = vec![
            vec![json!({"content": "ok"}).into()],
            vec![json!({"content": "fine"}).into(), json!({"title": "no content here"}).into()],
        ];
        let mem = InMemoryScroll::new(pages);
        let (tx, rx) = async_channel::bounded(8);
        let handle = paginator(mem, tx, Duration::from_secs(5), CancellationToken::new()).start();

        let err = handle.await.unwrap().unwrap_err();
        match scan_error(&err) {
            ScanError::FieldExtraction { field, page, position, .. } => {
                assert_eq!(field, "content");
                assert_eq!(*page, 2);
                assert_eq!(*position, 2);
            }
            other => panic!("expected a field extraction error, got {other:?}"),
        }
        // -- 📬 the two good records made it through before the abort
        assert_eq!(rx.recv().await.unwrap().bytes(), 2);
        assert_eq!(rx.recv().await.unwrap().bytes(), 4);
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_the_cursor_dies_on_the_second_fetch() {
        let mem = InMemoryScroll::from_contents("content", &[&["a"], &["b"]])
            .fail_on_fetch(2, InjectedFailure::CursorExpired);
        let (tx, _rx) = async_channel::bounded(8);
        let handle = paginator(mem, tx, Duration::from_secs(5), CancellationToken::new()).start();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(scan_error(&err), ScanError::CursorExpired(_)));
        assert!(err.to_string().contains("after 1 fetches"), "got {err}");
    }

    #[tokio::test]
    async fn the_one_where_the_aggregator_hangs_up_early() {
        let mem = InMemoryScroll::from_contents("content", &[&["a", "b"]]);
        let (tx, rx) = async_channel::bounded(8);
        drop(rx);
        let handle = paginator(mem, tx, Duration::from_secs(5), CancellationToken::new()).start();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(scan_error(&err), ScanError::SinkClosed));
    }

    fn es_backend(server: &MockServer) -> ScrollBackend {
        let config = ElasticsearchSourceConfig {
            url: server.uri(),
            index: "registry_records".to_string(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: 2,
            request_timeout_secs: 60,
        };
        ScrollBackend::Elasticsearch(ElasticsearchScroll::new(config).unwrap())
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_does_not_wait_on_a_sulking_scroll_clear() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry_records/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "c1",
                "hits": { "hits": [ { "_source": { "content": "abc" } } ] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "_scroll_id": "c2", "hits": { "hits": [] } }))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let (tx, _rx) = async_channel::bounded(4);
        let cancel = CancellationToken::new();
        let handle = Paginator::new(
            es_backend(&server),
            QuerySpec::new(Vec::new(), 10, "content"),
            ScrollTtl::default(),
            tx,
            Duration::from_secs(20),
            cancel.clone(),
        )
        .start();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let cancelled_at = Instant::now();
        cancel.cancel();
        let err = handle.await.unwrap().unwrap_err();

        assert!(matches!(scan_error(&err), ScanError::Cancelled));
        let waited = cancelled_at.elapsed();
        assert!(
            waited < Duration::from_secs(5),
            "cancelled scan should give up the scroll clear after a short grace, waited {waited:?}"
        );
    }

    #[tokio::test]
    async fn the_one_where_a_full_page_shows_up_without_a_scroll_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry_records/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [ { "_source": { "content": "abc" } } ] }
            })))
            .mount(&server)
            .await;

        let (tx, rx) = async_channel::bounded(4);
        let handle = Paginator::new(
            es_backend(&server),
            QuerySpec::new(Vec::new(), 10, "content"),
            ScrollTtl::default(),
            tx,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .start();

        let err = handle.await.unwrap().unwrap_err();
        match scan_error(&err) {
            ScanError::MalformedResponse(msg) => assert!(msg.contains("no scroll id"), "got {msg}"),
            other => panic!("expected a malformed response, got {other:?}"),
        }
        // -- 🚫 nothing gets measured off a page we can't continue from
        assert!(rx.recv().await.is_err());
    }
}
