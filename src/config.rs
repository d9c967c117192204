//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files and defines constants for
//! HTTP cache TTLs, thread layout, body fixup caps, escrow timing, logging format,
//! and default paths. `AppConfig` is the root configuration struct containing all settings.

use const_format::formatcp;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// HTTP Response Cache Control
// =============================================================================
// Cache-Control headers for upstream caches. All values are in seconds.

/// Thread view - may receive new replies
pub const HTTP_CACHE_THREAD_VIEW_MAX_AGE: u32 = 120;
pub const HTTP_CACHE_THREAD_VIEW_SWR: u32 = 60;

/// List overview - new threads appear often
pub const HTTP_CACHE_LIST_VIEW_MAX_AGE: u32 = 60;
pub const HTTP_CACHE_LIST_VIEW_SWR: u32 = 30;

/// Individual emails - immutable content
pub const HTTP_CACHE_EMAIL_MAX_AGE: u32 = 3600;
pub const HTTP_CACHE_EMAIL_SWR: u32 = 60;

/// Static assets (CSS) - long cache with immutable hint
pub const HTTP_CACHE_STATIC_MAX_AGE: u32 = 86400;

/// Stale-if-error duration - serve stale content during backend failures (5 minutes)
pub const HTTP_CACHE_STALE_IF_ERROR: u32 = 300;

pub const CACHE_CONTROL_THREAD_VIEW: &str = formatcp!(
    "public, max-age={}, stale-while-revalidate={}, stale-if-error={}",
    HTTP_CACHE_THREAD_VIEW_MAX_AGE,
    HTTP_CACHE_THREAD_VIEW_SWR,
    HTTP_CACHE_STALE_IF_ERROR
);

pub const CACHE_CONTROL_LIST_VIEW: &str = formatcp!(
    "public, max-age={}, stale-while-revalidate={}, stale-if-error={}",
    HTTP_CACHE_LIST_VIEW_MAX_AGE,
    HTTP_CACHE_LIST_VIEW_SWR,
    HTTP_CACHE_STALE_IF_ERROR
);

pub const CACHE_CONTROL_EMAIL: &str = formatcp!(
    "public, max-age={}, stale-while-revalidate={}, stale-if-error={}",
    HTTP_CACHE_EMAIL_MAX_AGE,
    HTTP_CACHE_EMAIL_SWR,
    HTTP_CACHE_STALE_IF_ERROR
);

pub const CACHE_CONTROL_STATIC: &str =
    formatcp!("public, max-age={}, immutable", HTTP_CACHE_STATIC_MAX_AGE);

pub const CACHE_CONTROL_NONE: &str = "no-store";

// =============================================================================
// Thread Layout Constants
// =============================================================================

/// Max nesting level before unthreading to save space
pub const DEFAULT_MAX_NESTING: usize = 10;

/// Render widths below this get a reduced nesting depth
pub const NARROW_LAYOUT_WIDTH: u32 = 700;

/// Width consumed by one nesting level on narrow layouts
pub const NESTING_LEVEL_WIDTH: u32 = 250;

/// Default render width when neither config nor request provides one
pub const DEFAULT_RENDER_WIDTH: u32 = 1200;

/// Border colours for nested replies, picked in visitation order
pub const THREAD_PALETTE: [&str; 5] = ["286090", "ccab0a", "c04331", "169e4e", "6d4ca5"];

// =============================================================================
// Time Constants (for relative dates)
// =============================================================================

pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_HOUR: i64 = 3600;
pub const SECONDS_PER_DAY: i64 = 86400;
pub const SECONDS_PER_MONTH: i64 = 2_592_000;
pub const SECONDS_PER_YEAR: i64 = 31_536_000;

// =============================================================================
// Body Fixup Caps
// =============================================================================

/// Only linkify the first 250 URLs of a body
pub const MAX_URLS_PER_BODY: usize = 250;

/// Only collapse the first 50 quotes of a body
pub const MAX_QUOTES_PER_BODY: usize = 50;

/// Only colourize the first 25 diffs of a body
pub const MAX_DIFFS_PER_BODY: usize = 25;

/// Trailer cuts allowed per body
pub const MAX_TRAILER_CUTS_PER_BODY: usize = 3;

// =============================================================================
// Escrow (in-flight request tracking)
// =============================================================================

/// Interval between escrow scans, in milliseconds
pub const ESCROW_CHECK_INTERVAL_MS: u64 = 250;

/// Requests outstanding longer than this show the loading indicator, in milliseconds
pub const ESCROW_MAX_WAIT_MS: u64 = 250;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Quoted reply bodies in mailto links are cut at this many characters
pub const MAX_MAILTO_BODY_CHARS: usize = 16000;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Directory for static files
pub const STATIC_DIR: &str = "static";

/// Default subject for emails without a subject
pub const DEFAULT_SUBJECT: &str = "(No subject)";

/// Author label when neither a name nor an address is present
pub const DEFAULT_AUTHOR: &str = "(No author?)";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "ponymail_view=debug,tower_http=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Backend endpoint returning a thread descriptor plus its emails
pub const DEFAULT_THREAD_PATH: &str = "api/thread.lua";

/// Backend endpoint returning a single email
pub const DEFAULT_EMAIL_PATH: &str = "api/email.lua";

/// Backend endpoint returning the raw source of an email
pub const DEFAULT_SOURCE_PATH: &str = "api/source.lua";

/// Backend endpoint returning a list's threads and email summaries
pub const DEFAULT_STATS_PATH: &str = "api/stats.lua";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    pub http: HttpServerConfig,
    /// Pony Mail backend API
    pub backend: BackendConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub fixup: FixupConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where and how to reach the Pony Mail backend
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. "https://lists.example.org/"
    pub api_url: String,
    #[serde(default = "BackendConfig::default_thread_path")]
    pub thread_path: String,
    #[serde(default = "BackendConfig::default_email_path")]
    pub email_path: String,
    #[serde(default = "BackendConfig::default_source_path")]
    pub source_path: String,
    #[serde(default = "BackendConfig::default_stats_path")]
    pub stats_path: String,
    /// Request timeout in seconds
    #[serde(default = "BackendConfig::default_timeout")]
    pub request_timeout_seconds: u64,
    /// Appended to 404 error messages, e.g. a hint on how to log in
    #[serde(default)]
    pub perm_error_postface: Option<String>,
}

impl BackendConfig {
    fn default_thread_path() -> String {
        DEFAULT_THREAD_PATH.to_string()
    }

    fn default_email_path() -> String {
        DEFAULT_EMAIL_PATH.to_string()
    }

    fn default_source_path() -> String {
        DEFAULT_SOURCE_PATH.to_string()
    }

    fn default_stats_path() -> String {
        DEFAULT_STATS_PATH.to_string()
    }

    fn default_timeout() -> u64 {
        30
    }

    /// Base URL guaranteed to end with a slash
    pub fn base_url(&self) -> String {
        if self.api_url.ends_with('/') {
            self.api_url.clone()
        } else {
            format!("{}/", self.api_url)
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UiConfig {
    /// Site title shown in header and page titles
    #[serde(default = "UiConfig::default_site_name")]
    pub site_name: String,
    /// Condensed social-media style layout (enables trailer cuts and diff colouring)
    #[serde(default = "UiConfig::default_chatty")]
    pub chatty: bool,
    /// Collapse quoted replies
    #[serde(default = "UiConfig::default_compact_quotes")]
    pub compact_quotes: bool,
    /// Assumed horizontal render width, used to bound nesting on narrow layouts
    #[serde(default = "UiConfig::default_render_width")]
    pub render_width: u32,
    /// Nesting depth on wide layouts
    #[serde(default = "UiConfig::default_max_nesting")]
    pub max_nesting: usize,
    /// Optional directory of templates overriding the built-in ones
    #[serde(default)]
    pub templates_dir: Option<String>,
    /// Directory served under /static
    #[serde(default = "UiConfig::default_static_dir")]
    pub static_dir: String,
    /// Version string, populated at runtime
    #[serde(skip_deserializing, default = "UiConfig::default_version")]
    pub version: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            site_name: Self::default_site_name(),
            chatty: Self::default_chatty(),
            compact_quotes: Self::default_compact_quotes(),
            render_width: Self::default_render_width(),
            max_nesting: Self::default_max_nesting(),
            templates_dir: None,
            static_dir: Self::default_static_dir(),
            version: Self::default_version(),
        }
    }
}

impl UiConfig {
    fn default_site_name() -> String {
        "Pony Mail".to_string()
    }

    fn default_chatty() -> bool {
        true
    }

    fn default_compact_quotes() -> bool {
        true
    }

    fn default_static_dir() -> String {
        STATIC_DIR.to_string()
    }

    fn default_render_width() -> u32 {
        DEFAULT_RENDER_WIDTH
    }

    fn default_max_nesting() -> usize {
        DEFAULT_MAX_NESTING
    }

    fn default_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

/// Caps and locale patterns for the body fixup engine
#[derive(Debug, Clone, Deserialize)]
pub struct FixupConfig {
    #[serde(default = "FixupConfig::default_max_urls")]
    pub max_urls: usize,
    #[serde(default = "FixupConfig::default_max_quotes")]
    pub max_quotes: usize,
    #[serde(default = "FixupConfig::default_max_diffs")]
    pub max_diffs: usize,
    #[serde(default = "FixupConfig::default_max_trailer_cuts")]
    pub max_trailer_cuts: usize,
    /// Additional quote-introduction patterns, tried after the built-in ones
    #[serde(default)]
    pub quote_patterns: Vec<QuotePatternConfig>,
}

impl Default for FixupConfig {
    fn default() -> Self {
        Self {
            max_urls: Self::default_max_urls(),
            max_quotes: Self::default_max_quotes(),
            max_diffs: Self::default_max_diffs(),
            max_trailer_cuts: Self::default_max_trailer_cuts(),
            quote_patterns: Vec::new(),
        }
    }
}

impl FixupConfig {
    fn default_max_urls() -> usize {
        MAX_URLS_PER_BODY
    }
    fn default_max_quotes() -> usize {
        MAX_QUOTES_PER_BODY
    }
    fn default_max_diffs() -> usize {
        MAX_DIFFS_PER_BODY
    }
    fn default_max_trailer_cuts() -> usize {
        MAX_TRAILER_CUTS_PER_BODY
    }
}

/// A named quote-introduction line pattern (case-insensitive, multi-line)
#[derive(Debug, Clone, Deserialize)]
pub struct QuotePatternConfig {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached backend responses (default: 10000)
    #[serde(default = "CacheConfig::default_max_entries")]
    pub max_entries: u64,
    /// TTL for cached backend responses in seconds (default: 1 hour)
    #[serde(default = "CacheConfig::default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: Self::default_max_entries(),
            ttl_seconds: Self::default_ttl(),
        }
    }
}

impl CacheConfig {
    fn default_max_entries() -> u64 {
        10000
    }
    fn default_ttl() -> u64 {
        3600 // 1 hour
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.api_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "backend.api_url must not be empty".to_string(),
            ));
        }

        for extra in &self.fixup.quote_patterns {
            if let Err(e) = Regex::new(&extra.pattern) {
                return Err(ConfigError::Validation(format!(
                    "quote pattern '{}' does not compile: {}",
                    extra.name, e
                )));
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
