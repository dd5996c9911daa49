//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! *Previously, on scrollmeter...*
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The index is forty million documents deep. Someone wants to know how heavy the
//! `content` field is across all of them. "Just run an aggregation," they said.
//! You cannot sum string lengths in an aggregation without a script, and the cluster
//! has scripting disabled, because of course it does.
//!
//! So we scroll. `POST /{index}/_search?scroll=2m` to open, `POST /_search/scroll` to
//! continue, `DELETE /_search/scroll` to say goodbye. Every response is decoded into a
//! typed envelope. Anything that doesn't fit the envelope is a `MalformedResponse`,
//! not a panic three stack frames deep in a `serde_json::Value` index expression.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)
//!
//! ⚠️ Scroll contexts hold segment files open on every shard. Clear them when done.
//! The cluster remembers every one you forgot. The cluster is patient. The cluster's
//! disk is not.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::backends::ScrollClient;
use crate::common::{QuerySpec, Record, ScrollCursor, ScrollPage, ScrollTtl};
use crate::error::ScanError;

// 📡 ElasticsearchSourceConfig — "It's just Elasticsearch", she said, before the cluster went red.
// Lives next to the backend that uses it, so nobody goes on a scavenger hunt at 2am.
//
// 🔧 auth is tri-modal: username+password, api_key, or "I hope anonymous works" (it might, on a laptop).
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchSourceConfig {
    /// 📡 The URL of your cluster. Scheme + host + port. Yes, all of it.
    pub url: String,
    /// 📇 Index, alias, or comma-separated list. Whatever `_search` accepts.
    pub index: String,
    /// 🔒 Username for basic auth. Optional, like flossing.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. If this is in plaintext in your TOML, use `SCROLLMETER_*` env vars instead.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key auth. Wins over basic auth when both are set. Hierarchy matters.
    #[serde(default)]
    pub api_key: Option<String>,
    /// ⏱️ TCP connect deadline.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏱️ Whole-request deadline. A big page of big documents takes a while; be generous.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

// ============================================================
//  📦 Wire envelopes — typed, so shape errors have names
// ============================================================

/// 📦 What `_search?scroll=` and `_search/scroll` send back, minus everything we ignore.
#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(rename = "_shards", default)]
    shards: Option<ShardStats>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    // -- 🕳️ a hit can legally arrive without _source (stored-fields-only mappings).
    // -- measurement will then fail with a FieldExtraction error, which is the honest outcome.
    #[serde(rename = "_source", default)]
    source: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ShardStats {
    #[serde(default)]
    failed: u64,
    #[serde(default)]
    failures: Vec<Value>,
}

// -- 🪦 the exception ES throws when a scroll id outlived its keep-alive
const SEARCH_CONTEXT_MISSING: &str = "search_context_missing_exception";

/// 📡 Scrolls an Elasticsearch (or OpenSearch, it doesn't check) index over HTTP.
///
/// Holds one `reqwest::Client`, reused for every call, because building a client per
/// request is the networking equivalent of buying a new car every time you need milk.
#[derive(Debug)]
pub struct ElasticsearchScroll {
    client: reqwest::Client,
    config: ElasticsearchSourceConfig,
}

impl ElasticsearchScroll {
    /// 🚀 Build the HTTP client with the configured deadlines. No network I/O happens here;
    /// the first `open_scroll` is the connectivity check.
    pub fn new(config: ElasticsearchSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a TLS backend problem. Either way: tragic.")?;
        Ok(Self { client, config })
    }

    /// 🏷️ `url/index`, for the progress display.
    pub fn label(&self) -> String {
        format!("{}/{}", self.base_url(), self.config.index)
    }

    fn base_url(&self) -> &str {
        // -- 🧹 one slash of difference, infinite suffering of difference
        self.config.url.trim_end_matches('/')
    }

    /// 🔒 Auth priority: API key beats basic auth. This is not a democracy.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 🔍 The `_search` body: bool/must of match clauses, `_doc` order (cheapest for scroll),
    /// and `_source` trimmed to the one field we weigh.
    fn search_body(query: &QuerySpec) -> Value {
        let query_clause = if query.filters.is_empty() {
            json!({ "match_all": {} })
        } else {
            let must: Vec<Value> = query
                .filters
                .iter()
                .map(|f| {
                    let mut clause = serde_json::Map::new();
                    clause.insert(f.field.clone(), Value::String(f.value.clone()));
                    json!({ "match": clause })
                })
                .collect();
            json!({ "bool": { "must": must } })
        };
        json!({
            "size": query.page_size,
            "sort": ["_doc"],
            "_source": [query.measured_field.as_str()],
            "query": query_clause,
        })
    }

    /// 📦 Turn an HTTP response into a page, or into the right flavour of sadness.
    ///
    /// `continuing` flips 404s into `CursorExpired`: on a continuation, "not found" means
    /// the search context is gone. On the opening query, it means the index is.
    async fn decode_page(response: Response, ttl: &ScrollTtl, continuing: bool) -> Result<ScrollPage, ScanError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            if continuing && (status == StatusCode::NOT_FOUND || text.contains(SEARCH_CONTEXT_MISSING)) {
                return Err(ScanError::CursorExpired(format!("{status}: {text}")));
            }
            return Err(ScanError::Connection(format!(
                "search service answered {status}: {text}"
            )));
        }

        let parsed: ScrollResponse = serde_json::from_slice(&body)
            .map_err(|e| ScanError::MalformedResponse(format!("could not decode scroll response: {e}")))?;

        // -- ⚠️ a 200 with failed shards is a PARTIAL page. partial pages make partial totals.
        // -- partial totals look exactly like real totals. so no.
        let shards = parsed.shards.unwrap_or_default();
        if shards.failed > 0 {
            let detail = Value::Array(shards.failures).to_string();
            if detail.contains(SEARCH_CONTEXT_MISSING) {
                return Err(ScanError::CursorExpired(format!(
                    "{} shard(s) lost the search context: {detail}",
                    shards.failed
                )));
            }
            return Err(ScanError::Connection(format!(
                "{} shard(s) failed during the scroll: {detail}",
                shards.failed
            )));
        }

        let records: Vec<Record> = parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| hit.source.map(Record::from).unwrap_or_default())
            .collect();
        trace!("📄 decoded a page of {} hits", records.len());

        Ok(ScrollPage {
            records,
            cursor: parsed.scroll_id.map(|token| ScrollCursor::new(token, ttl.clone())),
        })
    }
}

#[async_trait]
impl ScrollClient for ElasticsearchScroll {
    async fn open_scroll(&mut self, query: &QuerySpec, ttl: &ScrollTtl) -> Result<ScrollPage, ScanError> {
        // -- ⏳ the ttl was validated as <digits><unit>, so it needs no escaping
        let url = format!("{}/{}/_search?scroll={}", self.base_url(), self.config.index, ttl);
        debug!("📡 opening scroll on {} (page size {})", url, query.page_size);
        let request = self.client.post(&url).json(&Self::search_body(query));
        let response = self.authorize(request).send().await?;
        Self::decode_page(response, ttl, false).await
    }

    async fn continue_scroll(&mut self, cursor: &ScrollCursor) -> Result<ScrollPage, ScanError> {
        let url = format!("{}/_search/scroll", self.base_url());
        trace!("🔄 continuing scroll {}", cursor);
        let request = self.client.post(&url).json(&json!({
            "scroll": cursor.ttl.as_str(),
            "scroll_id": cursor.token,
        }));
        let response = self.authorize(request).send().await?;
        Self::decode_page(response, &cursor.ttl, true).await
    }

    async fn clear_scroll(&mut self, cursor: &ScrollCursor) -> Result<(), ScanError> {
        let url = format!("{}/_search/scroll", self.base_url());
        let request = self
            .client
            .delete(&url)
            .json(&json!({ "scroll_id": [cursor.token] }));
        let response = self.authorize(request).send().await?;
        let status = response.status();
        // -- 🪦 404 means it already expired on its own. mission accomplished, technically.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!("🗑️ scroll context released ({status})");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ScanError::Connection(format!("clear scroll answered {status}: {body}")))
        }
    }
}
