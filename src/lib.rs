//! # svg2png
//!
//! Create PNG fallbacks for SVG images through the CloudConvert API, and keep
//! the plugin's free license activated against its store.
//!
//! ## Why fallbacks?
//!
//! Some clients (old browsers, mail readers, social previews) cannot render
//! SVG. Keeping a PNG next to every SVG (`logo.svg` → `logo.png`) lets
//! templates fall back to something every client can display.
//!
//! ## Conversion gate
//!
//! ```text
//! source.svg
//!  │
//!  ├─ 1. Credentials  no API key              → Skipped
//!  ├─ 2. Idempotence  source.png exists       → Skipped
//!  ├─ 3. Options      resize > density > none
//!  ├─ 4. Convert      upload, wait, download  → Failure(notice) on error
//!  └─ 5. Write        source.png              → Success(notice)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use svg2png::{attempt_conversion, CloudConvertClient, FallbackConfig, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new("YOUR_API_KEY").density("150");
//!     let config = FallbackConfig::default();
//!     let converter = CloudConvertClient::new(&config)?;
//!     let outcome = attempt_conversion("img/logo.svg", &settings, &converter, &config).await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## License activation
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svg2png::{EddLicenseClient, FileCacheStore, LicenseCache, LicenseConfig};
//!
//! # async fn run() -> Result<(), svg2png::Svg2PngError> {
//! let config = LicenseConfig::default();
//! let cache = LicenseCache::new(
//!     Arc::new(EddLicenseClient::new(&config)?),
//!     Arc::new(FileCacheStore::new("license-cache.json")),
//!     config.activation_ttl,
//! );
//! let active = cache.ensure_active("svg2png", "Svg2Png", "https://example.com").await;
//! # let _ = active;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `svg2png` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod license;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FallbackConfig, FallbackConfigBuilder, LicenseConfig, NoticeMode, PathStrategy, Settings,
    FREE_LICENSE_ITEM, FREE_LICENSE_KEY,
};
pub use convert::{attempt_conversion, attempt_conversion_sync, backfill, missing_fallbacks, remove_fallback};
pub use error::{CacheError, ConversionError, LicenseError, Svg2PngError};
pub use license::client::{EddLicenseClient, LicenseAction, LicenseEndpoint, LicenseRequest, LicenseResponse};
pub use license::store::{CacheStore, Clock, FileCacheStore, LicenseCacheEntry, MemoryCacheStore, SystemClock};
pub use license::LicenseCache;
pub use output::{AccountInfo, BackfillEntry, BackfillReport, ConversionOutcome, SkipReason};
pub use pipeline::cloudconvert::{CloudConvertClient, Converter};
pub use pipeline::options::{ConversionJob, ConversionRequest, ConverterOptions};
pub use pipeline::paths::fallback_path;
pub use progress::{BackfillProgressCallback, NoopProgressCallback, ProgressCallback};
