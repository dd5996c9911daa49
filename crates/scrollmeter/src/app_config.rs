//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! Three sections: where to scroll (`source_config`), what to scroll for (`query`), and
//! how hard to push (`runtime`). Everything except the source has a default, and every
//! default matches the job this tool replaced: 10 000 per page, `2m` keep-alive, a
//! channel of 10, a progress line every 10 000 records.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::backends::{ElasticsearchSourceConfig, InMemorySourceConfig};
use crate::common::{QuerySpec, ScrollTtl};

/// 📝 A starting-point config for the usual job: actual right records only, weighing
/// `content`. Copy it to `scrollmeter.toml` and fix the url and index.
///
/// Without a `[query.filters]` table the scan sends `match_all` and weighs the whole
/// index, which is a valid question but rarely the one you meant to ask.
pub const SAMPLE_CONFIG: &str = r#"[source_config.Elasticsearch]
url = "http://localhost:9200"
index = "registry_records_search_alias"
# api_key = "..."            # or username/password

[query]
measured_field = "content"
page_size = 10000
scroll_ttl = "2m"

[query.filters]
"metadata.actual" = "true"
"metadata.recordType" = "right_record"

[runtime]
queue_capacity = 10
progress_interval = 10000
progress_style = "log"        # or "bar"
"#;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Which search service to scroll.
    pub source_config: SourceConfig,
    /// 🔍 Which documents, which field, how many per page.
    #[serde(default)]
    pub query: QueryConfig,
    /// 🧵 Channel size, progress cadence, deadlines.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎭 The backends you can point a scan at.
///
/// Externally tagged, so TOML reads `[source_config.Elasticsearch]`. Lower-case aliases
/// exist because figment lower-cases env var keys and we'd like env-only setups to work.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    #[serde(alias = "elasticsearch")]
    Elasticsearch(ElasticsearchSourceConfig),
    #[serde(alias = "in_memory", alias = "inmemory")]
    InMemory(InMemorySourceConfig),
}

/// 🔍 What to look for and what to weigh.
#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// 🤝 `field = "value"` pairs, all required. A BTreeMap so the order is boring and stable.
    ///
    /// ⚠️ Empty means `match_all`. See [`SAMPLE_CONFIG`] for the usual pair:
    /// ```toml
    /// [query.filters]
    /// "metadata.actual" = "true"
    /// "metadata.recordType" = "right_record"
    /// ```
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// 📏 The field whose string length we sum. Dotted paths reach into objects.
    #[serde(default = "default_measured_field")]
    pub measured_field: String,
    /// 📦 Records requested per page. An upper bound, not a promise.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// ⏳ Cursor keep-alive, in the service's notation.
    #[serde(default)]
    pub scroll_ttl: ScrollTtl,
}

fn default_measured_field() -> String {
    "content".to_string()
}

// 📦 10,000 docs per page — the most ES hands out per scroll page without a settings change.
fn default_page_size() -> usize {
    10000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            filters: BTreeMap::new(),
            measured_field: default_measured_field(),
            page_size: default_page_size(),
            scroll_ttl: ScrollTtl::default(),
        }
    }
}

impl QueryConfig {
    /// 🏗️ Freeze the config into the immutable spec the paginator borrows.
    pub fn query_spec(&self) -> QuerySpec {
        QuerySpec::new(self.filters.clone(), self.page_size, self.measured_field.clone())
    }
}

/// 🎨 How progress snapshots get shown.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStyle {
    /// 📜 One `info!` line per snapshot. Plays nicely with log shippers.
    #[default]
    Log,
    /// 📊 An indicatif spinner with a comfy-table of rates, plus the log line.
    Bar,
}

/// 🧵 Runtime knobs for the two workers and the channel between them.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📬 Bounded channel capacity between paginator and aggregator. Full = paginator waits.
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    /// 📊 Emit a progress snapshot every this many records.
    #[serde(default = "default_progress_interval", alias = "report_interval")]
    pub progress_interval: u64,
    /// ⏱️ Deadline for a single page fetch, on top of the HTTP client's own timeouts.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub progress_style: ProgressStyle,
}

fn default_queue_capacity() -> usize {
    10
}

fn default_progress_interval() -> u64 {
    10000
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            progress_interval: default_progress_interval(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            progress_style: ProgressStyle::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl AppConfig {
    /// ✅ Reject configs that would deadlock, spin, or divide by zero, before any network I/O.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.runtime.queue_capacity > 0,
            "💀 runtime.queue_capacity must be at least 1. A zero-slot channel is a rendezvous, and the paginator is not that kind of date."
        );
        ensure!(
            self.runtime.progress_interval > 0,
            "💀 runtime.progress_interval must be at least 1. Reporting every 0 records is a divide-by-zero with extra steps."
        );
        ensure!(
            self.runtime.fetch_timeout_secs > 0,
            "💀 runtime.fetch_timeout_secs must be at least 1. Zero seconds is not a deadline, it's a verdict."
        );
        ensure!(
            self.query.page_size > 0,
            "💀 query.page_size must be at least 1. Empty pages mean 'done', so a page size of 0 would finish before it started."
        );
        ensure!(
            !self.query.measured_field.trim().is_empty(),
            "💀 query.measured_field is empty. We need to know WHAT to weigh."
        );
        if let SourceConfig::Elasticsearch(ref es) = self.source_config {
            ensure!(!es.url.trim().is_empty(), "💀 source_config.Elasticsearch.url is empty.");
            ensure!(!es.index.trim().is_empty(), "💀 source_config.Elasticsearch.index is empty.");
        }
        Ok(())
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`SCROLLMETER_*`, nested with `__`) with an optional
/// TOML file. TOML wins on conflicts.
///
///   - `config_file_name` is None  → env vars only.
///   - `config_file_name` is Some  → env vars + TOML file, merged.
///
/// 💀 Returns an error if the config is unparseable or fails validation.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("SCROLLMETER_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SCROLLMETER_*). \
             The file exists in our hearts, but apparently not in the shape we need.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SCROLLMETER_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 Configuration parsed, but it doesn't make sense. See below.")?;
    if app_config.query.filters.is_empty() {
        warn!("⚠️ query.filters is empty: this scan weighs EVERY document in the index (match_all).");
    }
    Ok(app_config)
}
