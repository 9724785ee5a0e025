//! CLI binary for svg2png.
//!
//! A thin shim over the library crate that maps CLI flags to `Settings`,
//! `FallbackConfig` and `LicenseConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use svg2png::{
    backfill, missing_fallbacks, remove_fallback, BackfillProgressCallback, CloudConvertClient,
    ConversionOutcome, Converter, EddLicenseClient, FallbackConfig, FileCacheStore, LicenseCache,
    LicenseConfig, PathStrategy, Settings, SkipReason, FREE_LICENSE_ITEM, FREE_LICENSE_KEY,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a bar anchored at the bottom of the terminal
/// with one log line per finished source.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BackfillProgressCallback for CliProgressCallback {
    fn on_backfill_start(&self, total_sources: usize) {
        self.bar.set_length(total_sources as u64);
    }

    fn on_source_start(&self, source: &Path) {
        self.bar.set_message(source.display().to_string());
    }

    fn on_source_complete(&self, source: &Path, outcome: &ConversionOutcome) {
        let line = match outcome {
            ConversionOutcome::Success { notice, .. } => format!(
                "  {} {}",
                green("✓"),
                notice.clone().unwrap_or_else(|| source.display().to_string())
            ),
            ConversionOutcome::Skipped(reason) => format!(
                "  {} {}  {}",
                dim("–"),
                source.display(),
                dim(skip_label(*reason))
            ),
            ConversionOutcome::Failure { notice, .. } => {
                format!("  {} {}  {}", red("✗"), source.display(), red(notice))
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_backfill_complete(&self, created: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} created, {} skipped, {} failed",
            if failed == 0 { green("✔") } else { red("✘") },
            bold(&created.to_string()),
            skipped,
            failed
        );
    }
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::MissingCredentials => "skipped: no API key configured",
        SkipReason::OutputAlreadyExists => "skipped: fallback exists",
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store the API key once
  svg2png settings set --api-key KEY --density 150

  # Create fallbacks for every SVG in a folder
  svg2png convert uploads/**/*.svg

  # Show which SVGs still lack a fallback
  svg2png missing uploads/*.svg

  # Remove the fallback of a deleted SVG
  svg2png remove uploads/logo.svg

  # Conversion minutes left today
  svg2png account

  # Activate the free license for this site
  svg2png license activate --site-url https://example.com

ENVIRONMENT VARIABLES:
  SVG2PNG_SETTINGS     Settings file (JSON with api-key, resize, density)
  SVG2PNG_API_KEY      CloudConvert API key, overrides the settings file
  SVG2PNG_RESIZE       Resize target (1000 or 1000x540)
  SVG2PNG_DENSITY      Density in PPI (150), used when resize is empty
  SVG2PNG_CACHE_FILE   License activation cache file
  RUST_LOG             Log filter, overrides --verbose / --quiet
"#;

/// Create PNG fallbacks for SVG images via CloudConvert.
#[derive(Parser, Debug)]
#[command(
    name = "svg2png",
    version,
    about = "Create PNG fallbacks for SVG images via CloudConvert",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Settings file (JSON).
    #[arg(long, global = true, env = "SVG2PNG_SETTINGS", default_value = "svg2png-settings.json")]
    settings: PathBuf,

    /// CloudConvert API key (overrides the settings file).
    #[arg(long, global = true, env = "SVG2PNG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Resize target, e.g. 1000 or 1000x540 (overrides the settings file).
    #[arg(long, global = true, env = "SVG2PNG_RESIZE")]
    resize: Option<String>,

    /// Density in PPI, e.g. 150 (overrides the settings file).
    #[arg(long, global = true, env = "SVG2PNG_DENSITY")]
    density: Option<String>,

    /// Derive fallback paths by chopping three characters instead of
    /// replacing the extension.
    #[arg(long, global = true, env = "SVG2PNG_FIXED_SUFFIX")]
    fixed_suffix: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SVG2PNG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SVG2PNG_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create missing fallbacks for the given SVG files.
    Convert {
        /// SVG source files.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Number of conversions to run at once.
        #[arg(short, long, env = "SVG2PNG_CONCURRENCY", default_value_t = 1)]
        concurrency: usize,

        /// Per-request timeout in seconds (default: wait indefinitely).
        #[arg(long, env = "SVG2PNG_API_TIMEOUT")]
        api_timeout: Option<u64>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete the fallbacks of the given SVG files.
    Remove {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// List SVG files that have no fallback yet.
    Missing {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// Show the CloudConvert account and minutes left.
    Account,

    /// Activate, deactivate or inspect the plugin license.
    License {
        #[command(subcommand)]
        action: LicenseCommand,
    },

    /// Show or change the settings file.
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LicenseCommand {
    /// Activate the license unless a confirmation is cached.
    Activate(LicenseArgs),
    /// Deactivate the license and clear the cached confirmation.
    Deactivate(LicenseArgs),
    /// Show the cached confirmation.
    Status(LicenseArgs),
}

#[derive(clap::Args, Debug)]
struct LicenseArgs {
    /// License key.
    #[arg(long, default_value = FREE_LICENSE_KEY)]
    key: String,

    /// Item name registered on the store.
    #[arg(long, default_value = FREE_LICENSE_ITEM)]
    item_name: String,

    /// URL of the site the license is activated for.
    #[arg(long, env = "SVG2PNG_SITE_URL", default_value = "http://localhost")]
    site_url: String,

    /// License store URL.
    #[arg(long, env = "SVG2PNG_STORE_URL", default_value = svg2png::config::DEFAULT_STORE_URL)]
    store_url: String,

    /// Activation cache file (default: user cache directory).
    #[arg(long, env = "SVG2PNG_CACHE_FILE")]
    cache_file: Option<PathBuf>,

    /// Skip TLS certificate verification for the store.
    #[arg(long)]
    insecure: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the effective settings (API key redacted).
    Show,
    /// Validate and store the values given with --api-key, --resize, --density.
    Set,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level notices while it is shown.
    let show_progress = !cli.quiet && matches!(cli.command, Command::Convert { json: false, .. });
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, cli.quiet, show_progress))),
        )
        .with_writer(io::stderr)
        .init();

    let strategy = if cli.fixed_suffix {
        PathStrategy::FixedSuffix
    } else {
        PathStrategy::ReplaceExtension
    };

    match &cli.command {
        Command::Convert {
            sources,
            concurrency,
            api_timeout,
            json,
        } => {
            let settings = effective_settings(&cli)?;
            if !settings.has_api_key() {
                eprintln!(
                    "{} No API key configured; nothing will be converted. Use --api-key or `svg2png settings set`.",
                    yellow("⚠")
                );
            }

            let mut builder = FallbackConfig::builder()
                .path_strategy(strategy)
                .concurrency(*concurrency);
            if let Some(secs) = api_timeout {
                builder = builder.api_timeout_secs(*secs);
            }
            if show_progress {
                builder = builder.progress_callback(CliProgressCallback::new());
            }
            let config = builder.build().context("Invalid configuration")?;
            let converter = CloudConvertClient::new(&config)?;

            let report = backfill(sources, &settings, &converter, &config).await;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else if !cli.quiet && !show_progress {
                for notice in report.notices() {
                    eprintln!("{notice}");
                }
            }

            if report.failed > 0 {
                anyhow::bail!("{} of {} conversions failed", report.failed, report.entries.len());
            }
        }

        Command::Remove { sources } => {
            for source in sources {
                let removed = remove_fallback(source, strategy)
                    .await
                    .with_context(|| format!("Failed to remove fallback of {}", source.display()))?;
                if !cli.quiet {
                    let mark = if removed { green("✓") } else { dim("–") };
                    println!("{mark} {}", source.display());
                }
            }
        }

        Command::Missing { sources } => {
            for source in missing_fallbacks(sources, strategy).await {
                println!("{}", source.display());
            }
        }

        Command::Account => {
            let settings = effective_settings(&cli)?;
            let Some(api_key) = settings.api_key() else {
                anyhow::bail!("No API key configured");
            };
            let config = FallbackConfig::default();
            let converter = CloudConvertClient::new(&config)?;
            let info = converter
                .account(api_key)
                .await
                .context("CloudConvert API")?;

            println!("Current user:                  {}", info.user);
            println!("Conversion minutes left today: {}", info.minutes);
            if !info.has_minutes_left() {
                eprintln!(
                    "{} No conversion minutes left for today. Come back tomorrow!",
                    yellow("⚠")
                );
            }
        }

        Command::License { action } => run_license(action).await?,

        Command::Settings { action } => match action {
            SettingsCommand::Show => {
                let settings = effective_settings(&cli)?;
                println!("Settings file: {}", cli.settings.display());
                println!(
                    "API key:       {}",
                    if settings.has_api_key() { "<set>" } else { "<not set>" }
                );
                println!("Resize:        {}", settings.resize_spec().unwrap_or("-"));
                println!("Density:       {}", settings.density_spec().unwrap_or("-"));
            }
            SettingsCommand::Set => {
                let settings = effective_settings(&cli)?;
                settings.validate().context("Invalid settings")?;
                settings
                    .save(&cli.settings)
                    .context("Failed to save settings")?;
                if !cli.quiet {
                    eprintln!("{} Saved {}", green("✔"), cli.settings.display());
                }
            }
        },
    }

    Ok(())
}

/// Default log level when `RUST_LOG` is unset.
fn log_filter(verbose: bool, quiet: bool, show_progress: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet || show_progress {
        "error"
    } else {
        "info"
    }
}

/// Settings file overlaid with flags / env vars. A flag given as an empty
/// string clears the stored value.
fn effective_settings(cli: &Cli) -> Result<Settings> {
    let stored = Settings::load(&cli.settings).context("Failed to load settings")?;
    Ok(stored.merge(Settings {
        api_key: cli.api_key.clone(),
        resize: cli.resize.clone(),
        density: cli.density.clone(),
    }))
}

async fn run_license(action: &LicenseCommand) -> Result<()> {
    let args = match action {
        LicenseCommand::Activate(a) | LicenseCommand::Deactivate(a) | LicenseCommand::Status(a) => a,
    };

    let config = LicenseConfig::default()
        .store_url(args.store_url.clone())
        .accept_invalid_certs(args.insecure);
    let cache_file = match &args.cache_file {
        Some(path) => path.clone(),
        None => default_cache_file()?,
    };
    let cache = LicenseCache::new(
        Arc::new(EddLicenseClient::new(&config)?),
        Arc::new(FileCacheStore::new(cache_file)),
        config.activation_ttl,
    );

    match action {
        LicenseCommand::Activate(_) => {
            if cache
                .ensure_active(&args.key, &args.item_name, &args.site_url)
                .await
            {
                println!("{} License '{}' is active", green("✔"), args.key);
            } else {
                anyhow::bail!("License '{}' could not be confirmed", args.key);
            }
        }
        LicenseCommand::Deactivate(_) => {
            cache
                .deactivate(&args.key, &args.item_name, &args.site_url)
                .await
                .context("Failed to clear license cache")?;
            println!("{} License '{}' deactivated", green("✔"), args.key);
        }
        LicenseCommand::Status(_) => match cache.status(&args.key)? {
            Some(entry) => println!(
                "License '{}' confirmed until {}",
                args.key,
                entry.valid_until.to_rfc3339()
            ),
            None => println!("License '{}' has no cached confirmation", args.key),
        },
    }
    Ok(())
}

fn default_cache_file() -> Result<PathBuf> {
    let dir = dirs::cache_dir().context("No user cache directory; pass --cache-file")?;
    Ok(dir.join("svg2png").join("license-cache.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_levels() {
        assert_eq!(log_filter(false, false, false), "info");
        assert_eq!(log_filter(false, false, true), "error");
        assert_eq!(log_filter(false, true, false), "error");
        assert_eq!(log_filter(true, true, true), "debug");
    }

    #[test]
    fn json_convert_hides_progress() {
        let cli = Cli::parse_from(["svg2png", "convert", "--json", "logo.svg"]);
        assert!(!matches!(cli.command, Command::Convert { json: false, .. }));

        let cli = Cli::parse_from(["svg2png", "convert", "logo.svg"]);
        assert!(matches!(cli.command, Command::Convert { json: false, .. }));
    }

    #[test]
    fn empty_flag_clears_stored_resize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        Settings::new("KEY1").resize("1000").density("150").save(&path).unwrap();

        let settings_arg = path.to_string_lossy().into_owned();
        let cli = Cli::parse_from(["svg2png", "--settings", settings_arg.as_str(), "--resize", "", "settings", "set"]);
        let settings = effective_settings(&cli).unwrap();

        assert_eq!(settings.resize_spec(), None);
        assert_eq!(settings.density_spec(), Some("150"));
        assert_eq!(settings.api_key(), Some("KEY1"));
    }
}
