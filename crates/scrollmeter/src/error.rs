//! 💀 Scan errors — the six ways a scroll can end badly.
//!
//! 🎬 *[a cursor expires in the woods. nobody is around. does it 404?]*
//! *[yes. yes it does. with `search_context_missing_exception` in the body.]*
//!
//! The engine speaks in `ScanError` so the orchestrator can tell a dead network from
//! a dead cursor from a document that forgot its own content. Everything above the
//! engine (config, supervisor, CLI) wraps these in `anyhow` context like the rest of
//! the crate. None of these are retried. None are swallowed. All of them are fatal.
//!
//! 🦆 (the duck has filed a bug report. it was closed as "working as intended".)

use thiserror::Error;

/// 💀 Everything that can abort a scan. Every variant is fatal; the variant only decides
/// which kind of 3am you're about to have.
#[derive(Debug, Error)]
pub enum ScanError {
    /// 📡 Transport failure, timeout, or a non-success status from the search service.
    #[error("💀 connection to the search service failed: {0}")]
    Connection(String),

    /// 📦 The service answered, but not in a shape we can decode.
    #[error("💀 malformed response from the search service: {0}")]
    MalformedResponse(String),

    /// 🔍 A record showed up without the measured field, or with something that isn't a string.
    #[error("💀 could not measure field '{field}' on record #{position} of page {page}: {reason}")]
    FieldExtraction {
        field: String,
        page: usize,
        position: usize,
        reason: String,
    },

    /// ⏳ The service no longer knows our cursor. TTL ran out, node restarted, or both.
    #[error("💀 scroll cursor expired or was rejected: {0}")]
    CursorExpired(String),

    /// 🛑 Someone pressed the big red button.
    #[error("🛑 scan cancelled before it finished")]
    Cancelled,

    /// 🚰 The aggregator hung up while the paginator still had measurements to hand over.
    #[error("💀 the measurement channel closed while records were still in flight")]
    SinkClosed,
}

impl ScanError {
    /// 🏷️ A short stable name for logs and error hints.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Connection(_) => "connection",
            ScanError::MalformedResponse(_) => "malformed_response",
            ScanError::FieldExtraction { .. } => "field_extraction",
            ScanError::CursorExpired(_) => "cursor_expired",
            ScanError::Cancelled => "cancelled",
            ScanError::SinkClosed => "sink_closed",
        }
    }
}

/// 📡 reqwest errors are transport errors. Timeouts included, because a fetch that never
/// comes back is indistinguishable from a fetch that broke on the way.
impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScanError::Connection(format!("request timed out: {err}"))
        } else {
            ScanError::Connection(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_field_extraction_errors_name_the_culprit() {
        let err = ScanError::FieldExtraction {
            field: "content".to_string(),
            page: 3,
            position: 7,
            reason: "field is missing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'content'"), "field name should be in: {msg}");
        assert!(msg.contains("#7"), "record position should be in: {msg}");
        assert!(msg.contains("page 3"), "page number should be in: {msg}");
        assert_eq!(err.kind(), "field_extraction");
    }

    #[test]
    fn the_one_where_every_variant_has_a_distinct_kind() {
        let kinds = [
            ScanError::Connection("x".into()).kind(),
            ScanError::MalformedResponse("x".into()).kind(),
            ScanError::CursorExpired("x".into()).kind(),
            ScanError::Cancelled.kind(),
            ScanError::SinkClosed.kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a, b, "two variants share a kind. identity crisis.");
            }
        }
    }
}
