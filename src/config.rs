//! Configuration types for fallback conversion and license activation.
//!
//! Three records control the library:
//!
//! * [`Settings`]: the operator-facing option record (API key, resize,
//!   density). It is persisted as a small JSON document whose field names
//!   match the settings screen (`api-key`, `resize`, `density`) and is passed
//!   explicitly into every conversion call.
//! * [`FallbackConfig`]: how conversions are carried out (API endpoint,
//!   timeout, output-path strategy, notice routing, backfill concurrency).
//!   Built via [`FallbackConfigBuilder`].
//! * [`LicenseConfig`]: where and how the license store is contacted.

use crate::error::Svg2PngError;
use crate::progress::BackfillProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Default conversion API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.cloudconvert.com";

/// Default license store (an Easy Digital Downloads shop).
pub const DEFAULT_STORE_URL: &str = "https://products.mind.ch";

/// License key of the free plugin license. It is the plugin slug.
pub const FREE_LICENSE_KEY: &str = "svg2png";

/// Item name registered for the free license on the store.
pub const FREE_LICENSE_ITEM: &str = "Svg2Png";

/// `W` or `WxH`, positive integers.
static RESIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9][0-9]*(x[1-9][0-9]*)?$").unwrap());

/// Pixels per inch, positive integer.
static DENSITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]*$").unwrap());

// ── Settings ─────────────────────────────────────────────────────────────

/// Operator settings consumed by the conversion gate.
///
/// Every field is optional; an absent value and an empty string mean the
/// same thing.
///
/// # Example
/// ```rust
/// use svg2png::Settings;
///
/// let settings = Settings::new("KEY1").density("150");
/// assert!(settings.has_api_key());
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// CloudConvert API key. Without it every conversion is silently skipped.
    #[serde(rename = "api-key", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Resize target, e.g. `1000` (width) or `1000x540`. Takes precedence
    /// over `density`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<String>,

    /// Output resolution in PPI, e.g. `150`. Only used when `resize` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("resize", &self.resize)
            .field("density", &self.density)
            .finish()
    }
}

impl Settings {
    /// Settings with only an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn resize(mut self, resize: impl Into<String>) -> Self {
        self.resize = Some(resize.into());
        self
    }

    pub fn density(mut self, density: impl Into<String>) -> Self {
        self.density = Some(density.into());
        self
    }

    /// The API key, if one is configured and not blank.
    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }

    /// Whether credentials are configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// The resize value, if not blank.
    pub fn resize_spec(&self) -> Option<&str> {
        non_empty(&self.resize)
    }

    /// The density value, if not blank.
    pub fn density_spec(&self) -> Option<&str> {
        non_empty(&self.density)
    }

    /// Check `resize` and `density` against the formats the conversion API
    /// understands. Blank values are always valid.
    pub fn validate(&self) -> Result<(), Svg2PngError> {
        if let Some(resize) = self.resize_spec() {
            if !RESIZE_RE.is_match(resize) {
                return Err(Svg2PngError::InvalidConfig(format!(
                    "resize must be a width (1000) or width and height (1000x540), got '{resize}'"
                )));
            }
        }
        if let Some(density) = self.density_spec() {
            if !DENSITY_RE.is_match(density) {
                return Err(Svg2PngError::InvalidConfig(format!(
                    "density must be a positive number of PPI (150), got '{density}'"
                )));
            }
        }
        Ok(())
    }

    /// Load settings from a JSON file. A missing file yields empty settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Svg2PngError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Svg2PngError::SettingsIo {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|e| Svg2PngError::SettingsMalformed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Write settings to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Svg2PngError> {
        let path = path.as_ref();
        let io_err = |source| Svg2PngError::SettingsIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Svg2PngError::Internal(format!("settings serialisation: {e}")))?;
        std::fs::write(path, json).map_err(io_err)
    }

    /// Overlay `other` onto `self`: `None` keeps the stored value, a blank
    /// value clears it, anything else replaces it.
    pub fn merge(mut self, other: Settings) -> Self {
        overlay(&mut self.api_key, other.api_key);
        overlay(&mut self.resize, other.resize);
        overlay(&mut self.density, other.density);
        self
    }
}

fn overlay(stored: &mut Option<String>, given: Option<String>) {
    if let Some(value) = given {
        *stored = Some(value).filter(|v| !v.trim().is_empty());
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ── FallbackConfig ───────────────────────────────────────────────────────

/// Configuration for fallback conversion.
///
/// Built via [`FallbackConfig::builder()`] or using
/// [`FallbackConfig::default()`].
///
/// # Example
/// ```rust
/// use svg2png::{FallbackConfig, NoticeMode};
///
/// let config = FallbackConfig::builder()
///     .notice_mode(NoticeMode::Return)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FallbackConfig {
    /// Base URL of the conversion API. Default: [`DEFAULT_API_BASE`].
    pub api_base: String,

    /// Per-request timeout in seconds. Default: `None` (wait indefinitely).
    ///
    /// Conversions are started with a server-side timeout of zero and the
    /// client waits for the result, however long it takes.
    pub api_timeout_secs: Option<u64>,

    /// How the fallback path is derived from the source path.
    /// Default: [`PathStrategy::ReplaceExtension`].
    pub path_strategy: PathStrategy,

    /// Whether notices are returned to the caller or only logged.
    /// Default: [`NoticeMode::Log`].
    pub notice_mode: NoticeMode,

    /// Number of sources converted at once during a backfill. Default: 1.
    ///
    /// Each source is converted at most once per backfill; two backfills
    /// running against the same files can still race.
    pub concurrency: usize,

    /// Optional per-file progress callback for backfills.
    pub progress_callback: Option<Arc<dyn BackfillProgressCallback>>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_timeout_secs: None,
            path_strategy: PathStrategy::default(),
            notice_mode: NoticeMode::default(),
            concurrency: 1,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("api_base", &self.api_base)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("path_strategy", &self.path_strategy)
            .field("notice_mode", &self.notice_mode)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BackfillProgressCallback>"),
            )
            .finish()
    }
}

impl FallbackConfig {
    /// Create a new builder for `FallbackConfig`.
    pub fn builder() -> FallbackConfigBuilder {
        FallbackConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FallbackConfig`].
#[derive(Debug)]
pub struct FallbackConfigBuilder {
    config: FallbackConfig,
}

impl FallbackConfigBuilder {
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn path_strategy(mut self, strategy: PathStrategy) -> Self {
        self.config.path_strategy = strategy;
        self
    }

    pub fn notice_mode(mut self, mode: NoticeMode) -> Self {
        self.config.notice_mode = mode;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BackfillProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FallbackConfig, Svg2PngError> {
        let c = &self.config;
        if !(c.api_base.starts_with("http://") || c.api_base.starts_with("https://")) {
            return Err(Svg2PngError::InvalidConfig(format!(
                "API base must be an HTTP/HTTPS URL, got '{}'",
                c.api_base
            )));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(Svg2PngError::InvalidConfig(
                "API timeout must be ≥ 1 second (omit it to wait indefinitely)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── LicenseConfig ────────────────────────────────────────────────────────

/// Configuration for the license store client and activation cache.
#[derive(Debug, Clone)]
pub struct LicenseConfig {
    /// License store URL. Default: [`DEFAULT_STORE_URL`].
    pub store_url: String,

    /// Per-request timeout in seconds. Default: 15.
    pub timeout_secs: u64,

    /// How long a confirmed activation is trusted. Default: 30 days.
    pub activation_ttl: chrono::Duration,

    /// Skip TLS certificate verification. Default: `false`.
    ///
    /// Only for stores with broken certificates; a warning is logged every
    /// time a client is built with this enabled.
    pub accept_invalid_certs: bool,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            timeout_secs: 15,
            activation_ttl: chrono::Duration::days(30),
            accept_invalid_certs: false,
        }
    }
}

impl LicenseConfig {
    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = url.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    pub fn activation_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.activation_ttl = ttl;
        self
    }

    pub fn accept_invalid_certs(mut self, v: bool) -> Self {
        self.accept_invalid_certs = v;
        self
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the raster fallback path is derived from the vector source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PathStrategy {
    /// Replace the file extension (`logo.svg` → `logo.png`,
    /// `logo.svgz` → `logo.png`, `logo` → `logo.png`). (default)
    #[default]
    ReplaceExtension,
    /// Drop the last three characters and append `png`, exactly as older
    /// installations did. Only correct for three-letter extensions.
    FixedSuffix,
}

/// Where conversion notices go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoticeMode {
    /// Notices are written to the log; successful outcomes carry no notice.
    /// (default)
    #[default]
    Log,
    /// Notices are also returned inside the outcome, for display to the
    /// operator.
    Return,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_count_as_absent() {
        let s = Settings {
            api_key: Some("   ".into()),
            resize: Some(String::new()),
            density: None,
        };
        assert!(!s.has_api_key());
        assert_eq!(s.resize_spec(), None);
        assert_eq!(s.density_spec(), None);
    }

    #[test]
    fn settings_use_option_field_names() {
        let s: Settings =
            serde_json::from_str(r#"{"api-key":"KEY1","resize":"","density":"150"}"#).unwrap();
        assert_eq!(s.api_key(), Some("KEY1"));
        assert_eq!(s.density_spec(), Some("150"));

        let json = serde_json::to_string(&Settings::new("K")).unwrap();
        assert_eq!(json, r#"{"api-key":"K"}"#);
    }

    #[test]
    fn debug_redacts_api_key() {
        let out = format!("{:?}", Settings::new("secret-key"));
        assert!(!out.contains("secret-key"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn validate_accepts_documented_formats() {
        assert!(Settings::new("k").resize("1000").validate().is_ok());
        assert!(Settings::new("k").resize("1000x540").validate().is_ok());
        assert!(Settings::new("k").density("150").validate().is_ok());
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_garbage() {
        assert!(Settings::new("k").resize("big").validate().is_err());
        assert!(Settings::new("k").resize("0x10").validate().is_err());
        assert!(Settings::new("k").density("150ppi").validate().is_err());
    }

    #[test]
    fn merge_keeps_existing_when_overlay_absent() {
        let base = Settings::new("A").resize("800");
        let merged = base.merge(Settings {
            api_key: None,
            resize: None,
            density: Some("96".into()),
        });
        assert_eq!(merged.api_key(), Some("A"));
        assert_eq!(merged.resize_spec(), Some("800"));
        assert_eq!(merged.density_spec(), Some("96"));
    }

    #[test]
    fn merge_blank_overlay_clears_value() {
        let base = Settings::new("A").resize("800").density("150");
        let merged = base.merge(Settings {
            api_key: None,
            resize: Some(String::new()),
            density: Some("  ".into()),
        });
        assert_eq!(merged.api_key(), Some("A"));
        assert_eq!(merged.resize, None);
        assert_eq!(merged.density, None);
        assert_eq!(
            crate::pipeline::options::ConverterOptions::from_settings(&merged),
            crate::pipeline::options::ConverterOptions::None
        );
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(dir.path().join("none.json")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.json");
        let s = Settings::new("KEY1").resize("1000x540");
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), s);
    }

    #[test]
    fn load_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(Svg2PngError::SettingsMalformed { .. })
        ));
    }

    #[test]
    fn builder_rejects_non_http_base() {
        let err = FallbackConfig::builder().api_base("ftp://x").build();
        assert!(matches!(err, Err(Svg2PngError::InvalidConfig(_))));
    }

    #[test]
    fn defaults() {
        let c = FallbackConfig::default();
        assert_eq!(c.api_timeout_secs, None);
        assert_eq!(c.path_strategy, PathStrategy::ReplaceExtension);
        assert_eq!(c.notice_mode, NoticeMode::Log);
        assert_eq!(c.concurrency, 1);

        let l = LicenseConfig::default();
        assert_eq!(l.timeout_secs, 15);
        assert_eq!(l.activation_ttl, chrono::Duration::days(30));
        assert!(!l.accept_invalid_certs);
    }
}
