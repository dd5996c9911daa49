//! 📦 Common data structures — the building blocks of scrollmeter
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. DATA CENTER — 3:47 AM
//!
//! Someone in a meeting asked "how big is the content field, in total, across every
//! right_record that is actual?" Nobody knew. The index had forty million documents.
//! The dashboard showed shard sizes, which include everything except the answer.
//!
//! ✅ So we scroll. A `QuerySpec` says what to look for. A `ScrollCursor` says where we
//! are. A `ScrollPage` brings back a handful of `Record`s, and each `Record` gets weighed
//! into exactly one `Measurement`. That's the whole vocabulary. The postal workers of
//! this codebase, again. Please tip them.
//!
//! 🦆
//!
//! ---
//!
//! ⚠️ Measurements are byte lengths of UTF-8 strings, not character counts. "héllo" is six.
//! The service bills you in bytes. So do we.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ScanError;

// ============================================================
//  🔍 QuerySpec — what we're looking for
// ============================================================

/// 🔍 One `field == value` constraint. All of them must match. It's an AND party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: String,
    pub value: String,
}

/// 🔍 The immutable description of a scan: which documents, how many per page, and which
/// field to weigh. Built once from config, borrowed by the paginator, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    /// 🤝 Logically ANDed equality filters. Empty means "everything", which is brave.
    pub filters: Vec<FieldMatch>,
    /// 📦 Requested upper bound per page. The service may send fewer. Only zero means done.
    pub page_size: usize,
    /// 📏 The field whose string value gets measured, dotted paths allowed.
    pub measured_field: String,
}

impl QuerySpec {
    /// 🏗️ Assemble a spec. Filters are sorted by field so the request body is stable
    /// no matter what order the config map iterated in.
    pub fn new(
        filters: impl IntoIterator<Item = (String, String)>,
        page_size: usize,
        measured_field: impl Into<String>,
    ) -> Self {
        let mut filters: Vec<FieldMatch> = filters
            .into_iter()
            .map(|(field, value)| FieldMatch { field, value })
            .collect();
        filters.sort_by(|a, b| a.field.cmp(&b.field));
        Self {
            filters,
            page_size,
            measured_field: measured_field.into(),
        }
    }
}

// ============================================================
//  ⏳ ScrollTtl — how long the service should remember us
// ============================================================

/// ⏳ A keep-alive duration in the service's own notation (`30s`, `2m`, `1h`).
///
/// Validated at config time so a typo like `2 minutes` blows up before the first request,
/// not as a 400 from the cluster after we've already opened a connection and our hopes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ScrollTtl(String);

impl ScrollTtl {
    /// ✅ Accepts `<digits><unit>` with unit in d, h, m, s, ms. Rejects zero.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let split_at = raw
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("scroll ttl '{raw}' has no unit (try '2m')"))?;
        let (digits, unit) = raw.split_at(split_at);
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("scroll ttl '{raw}' does not start with a number"))?;
        if amount == 0 {
            return Err(format!("scroll ttl '{raw}' is zero; the cursor would die on arrival"));
        }
        match unit {
            "d" | "h" | "m" | "s" | "ms" => Ok(Self(raw.to_string())),
            other => Err(format!(
                "scroll ttl '{raw}' has unknown unit '{other}' (expected d, h, m, s or ms)"
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ScrollTtl {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl Default for ScrollTtl {
    fn default() -> Self {
        // -- ⏳ two minutes, same as the reference job. plenty for one page round trip.
        Self("2m".to_string())
    }
}

impl fmt::Display for ScrollTtl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================
//  🧭 ScrollCursor + ScrollPage — where we are, what we got
// ============================================================

/// 🧭 Opaque, service-issued position token plus the TTL it lives under.
///
/// Owned by the paginator and replaced on every fetch. The token is deliberately not
/// printed in `Display` because scroll ids are long enough to wrap a 4K monitor twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollCursor {
    pub token: String,
    pub ttl: ScrollTtl,
}

impl ScrollCursor {
    pub fn new(token: impl Into<String>, ttl: ScrollTtl) -> Self {
        Self {
            token: token.into(),
            ttl,
        }
    }
}

impl fmt::Display for ScrollCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.token.chars().take(12).collect();
        write!(f, "{prefix}… (ttl {})", self.ttl)
    }
}

/// 📄 One fetch worth of records, plus the cursor for the next fetch.
///
/// An empty `records` is the end of the scan. Not an error, not a hiccup: the end.
/// `cursor` is `None` only when the service didn't bother issuing one, which is fine on
/// an empty page and a protocol violation on a non-empty one (the paginator checks).
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub records: Vec<Record>,
    pub cursor: Option<ScrollCursor>,
}

impl ScrollPage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================
//  📄 Record + Measurement — the thing and its weight
// ============================================================

/// 📄 One document's `_source`. Untyped on purpose: we only ever look at one field.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// 🔍 Look up a field. A literal key wins (flattened sources with dots in key names
    /// exist, sadly); otherwise the dotted name walks nested objects.
    pub fn field(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(name) {
            return Some(value);
        }
        let mut segments = name.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// 📏 Weigh the measured field. Pure: same record, same answer, every time.
    ///
    /// `page` and `position` only decorate the error so you can find the offending
    /// document without re-running a forty-minute scan.
    pub fn measure(&self, field: &str, page: usize, position: usize) -> Result<Measurement, ScanError> {
        let extraction_failed = |reason: String| ScanError::FieldExtraction {
            field: field.to_string(),
            page,
            position,
            reason,
        };
        match self.field(field) {
            Some(Value::String(text)) => Ok(Measurement(text.len() as u64)),
            Some(Value::Null) | None => Err(extraction_failed("field is missing".to_string())),
            Some(other) => Err(extraction_failed(format!(
                "expected a string, found {}",
                json_type_name(other)
            ))),
        }
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Record(map),
            // -- 🐛 non-object sources become an empty record, which then fails measurement
            // -- with a proper FieldExtraction error instead of a panic.
            _ => Record::default(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 📏 Byte length of one record's measured field. The unit of work on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Measurement(pub u64);

impl Measurement {
    pub fn bytes(self) -> u64 {
        self.0
    }
}

// ============================================================
//  📊 RunningStats — the answer, accumulated
// ============================================================

/// 📊 Total bytes, total records, and when we started counting.
///
/// Owned by the aggregator task and nobody else. The orchestrator only sees it after the
/// aggregator has drained the channel and handed it back through its join handle, so
/// there's exactly one writer and zero concurrent readers. No locks, no atomics, no drama.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStats {
    pub total_bytes: u64,
    pub count: u64,
    pub started_at: Instant,
}

impl RunningStats {
    pub fn new(started_at: Instant) -> Self {
        Self {
            total_bytes: 0,
            count: 0,
            started_at,
        }
    }

    /// ➕ Fold one measurement in. Returns the new count so the caller can decide whether
    /// it's snapshot time.
    pub fn record(&mut self, measurement: Measurement) -> u64 {
        self.total_bytes += measurement.bytes();
        self.count += 1;
        self.count
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
