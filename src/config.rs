//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSNAP_CONFIG` (environment variable)
//! 2. `~/.config/mailsnap/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailsnap\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! The loaded [`Config`] is passed explicitly into the archive pipeline;
//! nothing here is global.

use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Archive pipeline settings.
    pub archive: ArchiveConfig,
    /// Local mailbox loading.
    pub mailbox: MailboxConfig,
    /// HTML to PDF conversion.
    pub pdf: PdfConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// How inline images are referenced from the HTML snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InlineImageMode {
    /// Embed the image bytes as a `data:` URI (self-contained HTML and PDF).
    Embed,
    /// Link to the stored copy of the image in the container.
    Link,
}

/// What to do when a file for the same message already exists in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExistingPolicy {
    /// Reuse the existing file and report it as already present.
    Skip,
    /// Always write a new copy; the store decides how to name it.
    KeepBoth,
}

/// Archive pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Upper bound on threads fetched per run.
    pub max_threads: usize,
    /// Append a short message identifier to each artifact stem.
    pub stem_includes_id: bool,
    /// Show the `To:` line in the snapshot header.
    pub include_recipients: bool,
    /// How `cid:` references are rewritten.
    pub inline_images: InlineImageMode,
    /// Re-run policy for files that already exist.
    pub on_existing: ExistingPolicy,
    /// Skip thread messages dated outside the requested window.
    pub strict_window: bool,
    /// Offset from UTC (minutes) used for window checks, stems, and header dates.
    pub utc_offset_minutes: i32,
    /// Suffix appended to the sender to name a derived container.
    pub container_suffix: String,
}

/// Local mailbox loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Parts larger than this many bytes are exposed by handle and fetched on demand.
    pub inline_part_limit: usize,
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
    /// Number of raw messages kept in the fetch cache.
    pub fetch_cache_size: usize,
}

/// HTML to PDF conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Produce a PDF artifact for each message.
    pub enabled: bool,
    /// Converter program followed by its arguments.
    /// `{input}` and `{output}` are replaced with scratch file paths.
    pub command: Vec<String>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_threads: 100,
            stem_includes_id: false,
            include_recipients: false,
            inline_images: InlineImageMode::Embed,
            on_existing: ExistingPolicy::Skip,
            strict_window: true,
            utc_offset_minutes: 0,
            container_suffix: " Email Archive".to_string(),
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            inline_part_limit: 1024 * 1024,      // 1 MB
            max_message_size: 256 * 1024 * 1024, // 256 MB
            fetch_cache_size: 16,
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec![
                "wkhtmltopdf".to_string(),
                "--quiet".to_string(),
                "--enable-local-file-access".to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ],
        }
    }
}

impl ArchiveConfig {
    /// The configured UTC offset, falling back to UTC when out of range.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!(
                minutes = self.utc_offset_minutes,
                "UTC offset out of range, using UTC"
            );
            Utc.fix()
        })
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSNAP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailsnap").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsnap")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailsnap.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.archive.max_threads, 100);
        assert_eq!(cfg.archive.on_existing, ExistingPolicy::Skip);
        assert_eq!(cfg.archive.inline_images, InlineImageMode::Embed);
        assert!(!cfg.archive.include_recipients);
        assert_eq!(cfg.archive.container_suffix, " Email Archive");
        assert!(cfg.pdf.enabled);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.archive.max_threads, cfg.archive.max_threads);
        assert_eq!(parsed.pdf.command, cfg.pdf.command);
        assert_eq!(
            parsed.mailbox.inline_part_limit,
            cfg.mailbox.inline_part_limit
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[archive]
on_existing = "keep-both"
inline_images = "link"

[pdf]
enabled = false
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.archive.on_existing, ExistingPolicy::KeepBoth);
        assert_eq!(cfg.archive.inline_images, InlineImageMode::Link);
        assert!(!cfg.pdf.enabled);
        // Other fields use defaults
        assert_eq!(cfg.archive.max_threads, 100);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_offset() {
        let mut archive = ArchiveConfig::default();
        assert_eq!(archive.offset().local_minus_utc(), 0);
        archive.utc_offset_minutes = -300;
        assert_eq!(archive.offset().local_minus_utc(), -300 * 60);
        archive.utc_offset_minutes = 100_000;
        assert_eq!(archive.offset().local_minus_utc(), 0);
    }
}
