//! Result types returned by the conversion entry points.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a conversion was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// No API key is configured.
    MissingCredentials,
    /// A file already exists at the fallback path.
    OutputAlreadyExists,
}

/// What happened to a single conversion attempt.
///
/// Created and consumed within one call; only used to produce a log line or
/// an operator notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionOutcome {
    /// Nothing was done and no request was sent.
    Skipped(SkipReason),

    /// The fallback was written to `output_path`.
    ///
    /// `notice` is only populated in [`crate::NoticeMode::Return`].
    Success {
        output_path: PathBuf,
        notice: Option<String>,
    },

    /// The conversion API call failed. `notice` is the human-readable
    /// description of `error` and is always populated.
    Failure {
        error: ConversionError,
        notice: String,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ConversionOutcome::Skipped(_))
    }

    /// The notice to show an operator, if any.
    pub fn notice(&self) -> Option<&str> {
        match self {
            ConversionOutcome::Skipped(_) => None,
            ConversionOutcome::Success { notice, .. } => notice.as_deref(),
            ConversionOutcome::Failure { notice, .. } => Some(notice),
        }
    }
}

/// Per-source entry of a [`BackfillReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillEntry {
    pub source: PathBuf,
    pub outcome: ConversionOutcome,
    pub duration_ms: u64,
}

/// Aggregate result of a backfill over many sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillReport {
    /// One entry per source, in input order.
    pub entries: Vec<BackfillEntry>,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

impl BackfillReport {
    pub(crate) fn push(&mut self, entry: BackfillEntry) {
        match entry.outcome {
            ConversionOutcome::Skipped(_) => self.skipped += 1,
            ConversionOutcome::Success { .. } => self.created += 1,
            ConversionOutcome::Failure { .. } => self.failed += 1,
        }
        self.entries.push(entry);
    }

    /// All notices, in input order.
    pub fn notices(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| e.outcome.notice())
    }
}

/// Account details reported by the conversion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account user name.
    pub user: String,
    /// Conversion minutes left today.
    pub minutes: i64,
}

impl AccountInfo {
    /// Whether another conversion can be started today.
    pub fn has_minutes_left(&self) -> bool {
        self.minutes >= 1
    }
}
