//! Conversion entry points.
//!
//! [`attempt_conversion`] is the gate every fallback goes through: it decides
//! whether a conversion is needed, runs it, writes the result and turns any
//! failure into a notice. Nothing here is fatal to the caller: the outcome is
//! always returned as a [`ConversionOutcome`].
//!
//! The existence check is the only guard against duplicate work. Two calls
//! for the same source racing each other can both pass it and both send a
//! request; the second write then simply replaces the first.

use crate::config::{FallbackConfig, NoticeMode, PathStrategy, Settings};
use crate::error::{ConversionError, Svg2PngError};
use crate::output::{BackfillEntry, BackfillReport, ConversionOutcome, SkipReason};
use crate::pipeline::cloudconvert::Converter;
use crate::pipeline::options::ConversionRequest;
use crate::pipeline::paths;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Create the PNG fallback for a single SVG source.
///
/// # Decision rules
/// 1. No API key in `settings` → `Skipped(MissingCredentials)`, no side effect.
/// 2. A file already exists at the fallback path → `Skipped(OutputAlreadyExists)`.
/// 3. Otherwise the source is uploaded with the sizing option from
///    `settings` (resize, else density, else none) and the result written to
///    the fallback path.
///
/// Success and failure notices are always logged. They are also returned in
/// the outcome when `config.notice_mode` is [`NoticeMode::Return`]; failure
/// outcomes carry their notice in both modes.
pub async fn attempt_conversion(
    source: impl AsRef<Path>,
    settings: &Settings,
    converter: &dyn Converter,
    config: &FallbackConfig,
) -> ConversionOutcome {
    let source = source.as_ref();

    let Some(api_key) = settings.api_key() else {
        debug!(source = %source.display(), "No API key configured, skipping conversion");
        return ConversionOutcome::Skipped(SkipReason::MissingCredentials);
    };

    let request = ConversionRequest::new(source, settings, config.path_strategy);
    if paths::exists(&request.output_path).await {
        debug!(
            source = %source.display(),
            output = %request.output_path.display(),
            "Fallback already exists, skipping conversion"
        );
        return ConversionOutcome::Skipped(SkipReason::OutputAlreadyExists);
    }

    let output_path = request.output_path.clone();
    match run_conversion(request, api_key, converter).await {
        Ok(()) => {
            let notice = format!("Created PNG fallback for: {}", source.display());
            info!(output = %output_path.display(), "{}", notice);
            ConversionOutcome::Success {
                output_path,
                notice: match config.notice_mode {
                    NoticeMode::Return => Some(notice),
                    NoticeMode::Log => None,
                },
            }
        }
        Err(error) => {
            let notice = error.to_string();
            warn!(source = %source.display(), kind = error.kind(), "{}", notice);
            ConversionOutcome::Failure { error, notice }
        }
    }
}

/// Synchronous wrapper around [`attempt_conversion`].
///
/// Creates a temporary tokio runtime internally, so it must not be called
/// from inside an async context.
pub fn attempt_conversion_sync(
    source: impl AsRef<Path>,
    settings: &Settings,
    converter: &dyn Converter,
    config: &FallbackConfig,
) -> Result<ConversionOutcome, Svg2PngError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Svg2PngError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    Ok(runtime.block_on(attempt_conversion(source, settings, converter, config)))
}

/// Delete the fallback belonging to a removed source.
///
/// Returns `true` if a file was deleted. A missing fallback is not an error.
pub async fn remove_fallback(
    source: impl AsRef<Path>,
    strategy: PathStrategy,
) -> Result<bool, Svg2PngError> {
    let output_path = paths::fallback_path(source.as_ref(), strategy);
    match tokio::fs::remove_file(&output_path).await {
        Ok(()) => {
            info!("Removed fallback {}", output_path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Svg2PngError::Internal(format!(
            "Failed to remove fallback '{}': {}",
            output_path.display(),
            e
        ))),
    }
}

/// Filter `sources` down to those without a fallback file, preserving order.
pub async fn missing_fallbacks<P: AsRef<Path>>(
    sources: &[P],
    strategy: PathStrategy,
) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    for source in sources {
        let source = source.as_ref();
        if !paths::exists(&paths::fallback_path(source, strategy)).await {
            missing.push(source.to_path_buf());
        }
    }
    missing
}

/// Run [`attempt_conversion`] over many sources and collect a report.
///
/// Notices are always returned, whatever `config.notice_mode` says, since a
/// backfill is an operator-initiated action. Duplicate sources are attempted
/// once. Up to `config.concurrency` conversions run at the same time.
pub async fn backfill<P: AsRef<Path>>(
    sources: &[P],
    settings: &Settings,
    converter: &dyn Converter,
    config: &FallbackConfig,
) -> BackfillReport {
    let total_start = Instant::now();

    let mut unique: Vec<PathBuf> = Vec::with_capacity(sources.len());
    for source in sources {
        let source = source.as_ref().to_path_buf();
        if !unique.contains(&source) {
            unique.push(source);
        }
    }

    let mut gate_config = config.clone();
    gate_config.notice_mode = NoticeMode::Return;
    let gate_config = &gate_config;

    if let Some(ref cb) = config.progress_callback {
        cb.on_backfill_start(unique.len());
    }
    info!("Starting backfill of {} sources", unique.len());

    let mut entries: Vec<(usize, BackfillEntry)> = stream::iter(unique.into_iter().enumerate())
        .map(|(idx, source)| async move {
            if let Some(ref cb) = gate_config.progress_callback {
                cb.on_source_start(&source);
            }
            let start = Instant::now();
            let outcome = attempt_conversion(&source, settings, converter, gate_config).await;
            if let Some(ref cb) = gate_config.progress_callback {
                cb.on_source_complete(&source, &outcome);
            }
            (
                idx,
                BackfillEntry {
                    source,
                    outcome,
                    duration_ms: start.elapsed().as_millis() as u64,
                },
            )
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    // Report in input order
    entries.sort_by_key(|(idx, _)| *idx);

    let mut report = BackfillReport::default();
    for (_, entry) in entries {
        report.push(entry);
    }
    report.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Backfill complete: {} created, {} skipped, {} failed, {}ms",
        report.created, report.skipped, report.failed, report.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_backfill_complete(report.created, report.skipped, report.failed);
    }

    report
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Upload, convert and write. Every failure is folded into a
/// [`ConversionError`].
async fn run_conversion(
    request: ConversionRequest,
    api_key: &str,
    converter: &dyn Converter,
) -> Result<(), ConversionError> {
    let output_path = request.output_path.clone();
    let bytes = tokio::fs::read(&request.source_path).await.map_err(|e| {
        ConversionError::other(format!(
            "could not read '{}': {}",
            request.source_path.display(),
            e
        ))
    })?;
    debug!(
        "Uploading {} ({} bytes, options {:?})",
        request.source_path.display(),
        bytes.len(),
        request.options
    );

    let job = request.into_job(bytes);
    let png = converter.convert(api_key, &job).await?;

    write_atomic(&output_path, &png).await.map_err(|e| {
        ConversionError::other(format!(
            "could not write '{}': {}",
            output_path.display(),
            e
        ))
    })
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        write_atomic(&path, b"\x89PNG").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG");
        assert!(!dir.path().join("logo.png.tmp").exists());
    }

    #[tokio::test]
    async fn write_atomic_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn remove_fallback_reports_whether_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let svg = dir.path().join("logo.svg");
        std::fs::write(dir.path().join("logo.png"), b"png").unwrap();

        assert!(remove_fallback(&svg, PathStrategy::ReplaceExtension).await.unwrap());
        assert!(!remove_fallback(&svg, PathStrategy::ReplaceExtension).await.unwrap());
    }

    #[tokio::test]
    async fn missing_fallbacks_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.svg");
        let b = dir.path().join("b.svg");
        let c = dir.path().join("c.svg");
        std::fs::write(dir.path().join("b.png"), b"png").unwrap();

        let missing = missing_fallbacks(&[&c, &b, &a], PathStrategy::ReplaceExtension).await;
        assert_eq!(missing, vec![c, a]);
    }
}
