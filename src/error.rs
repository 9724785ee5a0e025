//! Error types for the svg2png library.
//!
//! Four error types reflect four distinct failure domains:
//!
//! * [`Svg2PngError`]: **Fatal**: an entry point cannot do its job at all
//!   (settings file unreadable, invalid configuration, HTTP client could not
//!   be built). Returned as `Err(Svg2PngError)`.
//!
//! * [`ConversionError`]: **Non-fatal**: the conversion API rejected or
//!   failed a single conversion. Folded into
//!   [`crate::output::ConversionOutcome::Failure`]; its `Display` text is the
//!   notice shown to the operator.
//!
//! * [`LicenseError`]: a call to the license store failed. Never surfaced to
//!   end users; the license simply stays unconfirmed.
//!
//! * [`CacheError`]: the license cache store could not be read or written.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the svg2png library.
#[derive(Debug, Error)]
pub enum Svg2PngError {
    // ── Settings errors ───────────────────────────────────────────────────
    /// The settings file could not be read or written.
    #[error("Failed to access settings file '{path}': {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file exists but is not a valid settings record.
    #[error("Settings file '{path}' is malformed: {detail}")]
    SettingsMalformed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or settings validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── License cache errors ──────────────────────────────────────────────
    /// The license cache store failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single conversion failed.
///
/// The classification only changes the notice text: every variant is handled
/// the same way downstream (logged or returned). In particular the
/// `retry_after_secs` hint is reported but never acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    /// The API considered the request malformed (HTTP 400).
    #[error("Something with your request is wrong: {message}")]
    BadRequest { message: String },

    /// The API accepted the request but could not convert the file (HTTP 422).
    #[error("Conversion failed, maybe because of a broken input file: {message}")]
    ConversionFailed { message: String },

    /// The API is overloaded or in maintenance (HTTP 503).
    #[error(
        "API temporarily unavailable: {message}\nWe should retry the conversion in {} seconds",
        retry_hint(.retry_after_secs)
    )]
    TemporarilyUnavailable {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Network problems, unexpected statuses, unreadable input, etc.
    #[error("Something else went wrong: {message}")]
    Other { message: String },
}

impl ConversionError {
    /// Short machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::BadRequest { .. } => "bad_request",
            ConversionError::ConversionFailed { .. } => "conversion_failed",
            ConversionError::TemporarilyUnavailable { .. } => "temporarily_unavailable",
            ConversionError::Other { .. } => "other",
        }
    }

    pub(crate) fn other(message: impl Into<String>) -> Self {
        ConversionError::Other {
            message: message.into(),
        }
    }
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => secs.to_string(),
        None => "a few".to_string(),
    }
}

/// A failed call to the license store.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The request never produced a response (DNS, TLS, timeout, …).
    #[error("License store unreachable at '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The store answered with a non-success HTTP status.
    #[error("License store returned HTTP {status}")]
    Status { status: u16 },

    /// The response body was not the expected JSON document.
    #[error("License store response could not be decoded: {0}")]
    Decode(String),
}

/// A failed license cache operation.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing file could not be read or written.
    #[error("Cache file '{path}' is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not contain a cache document.
    #[error("Cache file '{path}' is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// A lock guarding the in-memory state was poisoned by a panic.
    #[error("Cache state is poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_display() {
        let e = ConversionError::BadRequest {
            message: "missing inputformat".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Something with your request is wrong"), "got: {msg}");
        assert!(msg.contains("missing inputformat"));
    }

    #[test]
    fn temporarily_unavailable_display_with_retry() {
        let e = ConversionError::TemporarilyUnavailable {
            message: "maintenance".into(),
            retry_after_secs: Some(30),
        };
        assert!(e.to_string().contains("retry the conversion in 30 seconds"));
    }

    #[test]
    fn temporarily_unavailable_display_without_retry() {
        let e = ConversionError::TemporarilyUnavailable {
            message: "overloaded".into(),
            retry_after_secs: None,
        };
        assert!(e.to_string().contains("in a few seconds"));
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            ConversionError::BadRequest { message: String::new() }.kind(),
            ConversionError::ConversionFailed { message: String::new() }.kind(),
            ConversionError::TemporarilyUnavailable {
                message: String::new(),
                retry_after_secs: None,
            }
            .kind(),
            ConversionError::other("").kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn cache_error_converts_into_fatal() {
        let e: Svg2PngError = CacheError::Poisoned.into();
        assert!(e.to_string().contains("poisoned"));
    }
}
