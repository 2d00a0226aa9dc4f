//! # Core Configuration Module
//!
//! Strongly typed configuration for the collection sync core.
//!
//! ## Overview
//!
//! A [`CoreConfig`] is assembled once with [`CoreConfigBuilder`] and handed to
//! each component's constructor. There is no global settings object: the
//! identity matcher, resolver, task runner and reconciliation engine each
//! receive the sub-config they need.
//!
//! Hosts that render a settings screen use [`option_table`] for the
//! key/name/description/group of every option, and
//! [`CoreConfig::option_value`] / [`CoreConfig::set_option`] to read and
//! write them by key.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, IdentityConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_url("sqlite:/home/me/.local/share/collection-sync/collection.db")
//!     .identity(IdentityConfig::default().with_fuzzy_threshold(85.0))
//!     .build()?;
//! ```
//!
//! When the `desktop-shims` feature is enabled, a missing database URL or
//! HTTP client is filled in with the desktop defaults.

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Identity
// ============================================================================

/// How an unknown song duration compares against another duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownDurationPolicy {
    /// Unknown matches any duration.
    #[default]
    Wildcard,
    /// Unknown only matches another unknown.
    Mismatch,
}

impl UnknownDurationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownDurationPolicy::Wildcard => "wildcard",
            UnknownDurationPolicy::Mismatch => "mismatch",
        }
    }
}

impl std::str::FromStr for UnknownDurationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wildcard" => Ok(UnknownDurationPolicy::Wildcard),
            "mismatch" => Ok(UnknownDurationPolicy::Mismatch),
            other => Err(Error::Config(format!(
                "Unknown duration policy '{}', expected 'wildcard' or 'mismatch'",
                other
            ))),
        }
    }
}

/// Song/album equality settings.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConfig {
    /// Minimum similarity percentage (0-100) for the fuzzy tier.
    pub fuzzy_threshold: f64,
    /// Largest duration difference still considered the same recording.
    pub duration_tolerance: Duration,
    pub unknown_duration: UnknownDurationPolicy,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 90.0,
            duration_tolerance: Duration::from_secs(2),
            unknown_duration: UnknownDurationPolicy::Wildcard,
        }
    }
}

impl IdentityConfig {
    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_duration_tolerance(mut self, tolerance: Duration) -> Self {
        self.duration_tolerance = tolerance;
        self
    }

    pub fn with_unknown_duration(mut self, policy: UnknownDurationPolicy) -> Self {
        self.unknown_duration = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.fuzzy_threshold) {
            return Err(Error::Config(
                "Fuzzy threshold must be between 0 and 100".to_string(),
            ));
        }
        if self.duration_tolerance > Duration::from_secs(60) {
            return Err(Error::Config(
                "Duration tolerance exceeds maximum of 60 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Authority resolver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Discard candidates the authority could not confirm.
    pub verified_only: bool,
    /// Rate-limit retries per lookup before treating it as a miss.
    pub max_rate_limit_retries: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            verified_only: true,
            max_rate_limit_retries: 5,
        }
    }
}

impl ResolverConfig {
    pub fn with_verified_only(mut self, verified_only: bool) -> Self {
        self.verified_only = verified_only;
        self
    }

    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }
}

// ============================================================================
// Task runner
// ============================================================================

/// Bounded worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Worker count, also the capacity of the work queue.
    pub concurrency: usize,
    /// Pause between submission attempts while the queue is full.
    pub submit_retry_delay: Duration,
    /// Upper bound on waiting for queued and in-flight work on drain.
    pub drain_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            submit_retry_delay: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl RunnerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_submit_retry_delay(mut self, delay: Duration) -> Self {
        self.submit_retry_delay = delay;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config(
                "Runner concurrency must be at least 1".to_string(),
            ));
        }
        if self.concurrency > 64 {
            return Err(Error::Config(
                "Runner concurrency exceeds maximum of 64".to_string(),
            ));
        }
        if self.drain_timeout.is_zero() {
            return Err(Error::Config(
                "Drain timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Reconciliation engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Backoff rounds allowed per page fetch or per batch before giving up.
    pub max_rate_limit_retries: u32,
    /// Wall-clock bound on one source pass.
    pub sync_timeout_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 5,
            sync_timeout_secs: 3600,
        }
    }
}

impl ReconcileConfig {
    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn with_sync_timeout_secs(mut self, secs: u64) -> Self {
        self.sync_timeout_secs = secs;
        self
    }
}

// ============================================================================
// Metadata APIs
// ============================================================================

/// Configuration for the metadata authorities.
///
/// # Example
///
/// ```no_run
/// use core_runtime::config::MetadataApiConfig;
///
/// let config = MetadataApiConfig::new()
///     .with_musicbrainz_user_agent("CollectionSync/0.1 (ops@example.com)")
///     .with_lastfm_api_key("your_lastfm_api_key");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataApiConfig {
    /// MusicBrainz user agent string (format: "AppName/Version (Contact)")
    ///
    /// See: https://musicbrainz.org/doc/MusicBrainz_API/Rate_Limiting
    pub musicbrainz_user_agent: Option<String>,

    /// Last.fm API key. Without it the Last.fm authority is unavailable.
    pub lastfm_api_key: Option<String>,

    /// Minimum spacing between authority requests, in milliseconds.
    pub rate_limit_delay_ms: u64,
}

impl Default for MetadataApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataApiConfig {
    pub fn new() -> Self {
        Self {
            musicbrainz_user_agent: None,
            lastfm_api_key: None,
            rate_limit_delay_ms: 1000,
        }
    }

    pub fn with_musicbrainz_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.musicbrainz_user_agent = Some(user_agent.into());
        self
    }

    pub fn with_lastfm_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.lastfm_api_key = Some(api_key.into());
        self
    }

    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ref ua) = self.musicbrainz_user_agent {
            if ua.is_empty() {
                return Err(Error::Config(
                    "MusicBrainz user agent cannot be empty".to_string(),
                ));
            }
            if !ua.contains('/') || !ua.contains('(') || !ua.contains(')') {
                return Err(Error::Config(
                    "MusicBrainz user agent must follow format: 'AppName/Version (Contact)'"
                        .to_string(),
                ));
            }
        }

        if self.rate_limit_delay_ms == 0 {
            return Err(Error::Config(
                "Rate limit delay must be greater than 0ms".to_string(),
            ));
        }

        if self.rate_limit_delay_ms > 60000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        Ok(())
    }

    pub fn has_musicbrainz(&self) -> bool {
        self.musicbrainz_user_agent.is_some()
    }

    pub fn has_lastfm(&self) -> bool {
        self.lastfm_api_key.is_some()
    }
}

// ============================================================================
// Library
// ============================================================================

/// Collection-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Display name of the liked songs container.
    pub liked_songs_name: String,
    /// Where M3U/NFO exports are written.
    pub export_dir: Option<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            liked_songs_name: "liked songs".to_string(),
            export_dir: None,
        }
    }
}

// ============================================================================
// Core config
// ============================================================================

/// Core configuration.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite connection URL for the collection and resolver cache
    pub database_url: String,

    pub library: LibraryConfig,
    pub identity: IdentityConfig,
    pub resolver: ResolverConfig,
    pub runner: RunnerConfig,
    pub reconcile: ReconcileConfig,
    pub metadata_api: MetadataApiConfig,

    /// HTTP client for the authority clients (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_url", &self.database_url)
            .field("library", &self.library)
            .field("identity", &self.identity)
            .field("resolver", &self.resolver)
            .field("runner", &self.runner)
            .field("reconcile", &self.reconcile)
            .field(
                "metadata_api",
                &self
                    .metadata_api
                    .lastfm_api_key
                    .as_ref()
                    .map(|_| "MetadataApiConfig { lastfm_api_key: [REDACTED], .. }"),
            )
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates every sub-config.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }
        if self.library.liked_songs_name.trim().is_empty() {
            return Err(Error::Config(
                "Liked songs name cannot be empty".to_string(),
            ));
        }
        self.identity.validate()?;
        self.runner.validate()?;
        self.metadata_api.validate()?;
        Ok(())
    }

    /// Current value of an option from [`option_table`], rendered as text.
    /// Secret options are returned as-is; callers decide whether to mask.
    pub fn option_value(&self, key: &str) -> Option<String> {
        let value = match key {
            "library.liked_songs_name" => self.library.liked_songs_name.clone(),
            "library.export_dir" => self.library.export_dir.as_ref()?.display().to_string(),
            "identity.fuzzy_threshold" => self.identity.fuzzy_threshold.to_string(),
            "identity.duration_tolerance_secs" => {
                self.identity.duration_tolerance.as_secs().to_string()
            }
            "identity.unknown_duration" => self.identity.unknown_duration.as_str().to_string(),
            "resolver.verified_only" => self.resolver.verified_only.to_string(),
            "runner.concurrency" => self.runner.concurrency.to_string(),
            "runner.drain_timeout_secs" => self.runner.drain_timeout.as_secs().to_string(),
            "reconcile.max_rate_limit_retries" => {
                self.reconcile.max_rate_limit_retries.to_string()
            }
            "metadata.musicbrainz_user_agent" => self.metadata_api.musicbrainz_user_agent.clone()?,
            "metadata.lastfm_api_key" => self.metadata_api.lastfm_api_key.clone()?,
            "metadata.rate_limit_delay_ms" => self.metadata_api.rate_limit_delay_ms.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Parse and apply an option by key, then re-validate.
    ///
    /// On error the config is left unchanged.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        match key {
            "library.liked_songs_name" => next.library.liked_songs_name = value.to_string(),
            "library.export_dir" => next.library.export_dir = Some(PathBuf::from(value)),
            "identity.fuzzy_threshold" => next.identity.fuzzy_threshold = parse(key, value)?,
            "identity.duration_tolerance_secs" => {
                next.identity.duration_tolerance = Duration::from_secs(parse(key, value)?)
            }
            "identity.unknown_duration" => next.identity.unknown_duration = value.parse()?,
            "resolver.verified_only" => next.resolver.verified_only = parse(key, value)?,
            "runner.concurrency" => next.runner.concurrency = parse(key, value)?,
            "runner.drain_timeout_secs" => {
                next.runner.drain_timeout = Duration::from_secs(parse(key, value)?)
            }
            "reconcile.max_rate_limit_retries" => {
                next.reconcile.max_rate_limit_retries = parse(key, value)?
            }
            "metadata.musicbrainz_user_agent" => {
                next.metadata_api.musicbrainz_user_agent = Some(value.to_string())
            }
            "metadata.lastfm_api_key" => next.metadata_api.lastfm_api_key = Some(value.to_string()),
            "metadata.rate_limit_delay_ms" => {
                next.metadata_api.rate_limit_delay_ms = parse(key, value)?
            }
            other => return Err(Error::Config(format!("Unknown option '{}'", other))),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value '{}' for option '{}'", value, key)))
}

// ============================================================================
// Option table
// ============================================================================

/// Settings group shown as a section header in host UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionGroup {
    Library,
    Identity,
    Resolver,
    Runner,
    Reconcile,
    Metadata,
}

/// Metadata describing one configurable option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub group: OptionGroup,
    /// Value must be masked in UIs and logs.
    pub secret: bool,
}

const OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor {
        key: "library.liked_songs_name",
        name: "Liked songs name",
        description: "Name used for the liked songs container",
        group: OptionGroup::Library,
        secret: false,
    },
    OptionDescriptor {
        key: "library.export_dir",
        name: "Export folder",
        description: "Folder receiving M3U playlists and album NFO files",
        group: OptionGroup::Library,
        secret: false,
    },
    OptionDescriptor {
        key: "identity.fuzzy_threshold",
        name: "Fuzzy match threshold",
        description: "Minimum similarity percentage for two differently spelled songs to match",
        group: OptionGroup::Identity,
        secret: false,
    },
    OptionDescriptor {
        key: "identity.duration_tolerance_secs",
        name: "Duration tolerance",
        description: "Seconds two durations may differ and still match",
        group: OptionGroup::Identity,
        secret: false,
    },
    OptionDescriptor {
        key: "identity.unknown_duration",
        name: "Unknown duration",
        description: "Whether an unknown duration matches anything (wildcard) or nothing (mismatch)",
        group: OptionGroup::Identity,
        secret: false,
    },
    OptionDescriptor {
        key: "resolver.verified_only",
        name: "Library verified",
        description: "Only admit songs, albums and artists confirmed by the metadata authority",
        group: OptionGroup::Resolver,
        secret: false,
    },
    OptionDescriptor {
        key: "runner.concurrency",
        name: "Worker threads",
        description: "Number of remote operations run in parallel",
        group: OptionGroup::Runner,
        secret: false,
    },
    OptionDescriptor {
        key: "runner.drain_timeout_secs",
        name: "Drain timeout",
        description: "Seconds to wait for outstanding work before abandoning it",
        group: OptionGroup::Runner,
        secret: false,
    },
    OptionDescriptor {
        key: "reconcile.max_rate_limit_retries",
        name: "Rate limit retries",
        description: "Backoff rounds per page or batch before it is skipped",
        group: OptionGroup::Reconcile,
        secret: false,
    },
    OptionDescriptor {
        key: "metadata.musicbrainz_user_agent",
        name: "MusicBrainz user agent",
        description: "Identifies this application to MusicBrainz: 'AppName/Version (Contact)'",
        group: OptionGroup::Metadata,
        secret: false,
    },
    OptionDescriptor {
        key: "metadata.lastfm_api_key",
        name: "Last.fm API key",
        description: "API key used for Last.fm lookups",
        group: OptionGroup::Metadata,
        secret: true,
    },
    OptionDescriptor {
        key: "metadata.rate_limit_delay_ms",
        name: "Authority query spacing",
        description: "Minimum milliseconds between metadata authority requests",
        group: OptionGroup::Metadata,
        secret: false,
    },
];

/// Every configurable option, in display order.
pub fn option_table() -> &'static [OptionDescriptor] {
    OPTIONS
}

/// Look up one option by key.
pub fn option_descriptor(key: &str) -> Option<&'static OptionDescriptor> {
    OPTIONS.iter().find(|option| option.key == key)
}

// ============================================================================
// Builder
// ============================================================================

#[cfg(feature = "desktop-shims")]
fn provide_default_database_url() -> Result<String> {
    let data_dir = bridge_desktop::default_data_dir()
        .map_err(|e| Error::Internal(format!("Failed to resolve data directory: {}", e)))?;
    bridge_desktop::database_url_in(&data_dir)
        .map_err(|e| Error::Internal(format!("Failed to prepare data directory: {}", e)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_database_url() -> Result<String> {
    Err(Error::Config(
        "Database URL is required. Use .database_url() to set it.".to_string(),
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    let client = bridge_desktop::ReqwestHttpClient::new().map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(Arc::new(client)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_url: Option<String>,
    library: Option<LibraryConfig>,
    identity: Option<IdentityConfig>,
    resolver: Option<ResolverConfig>,
    runner: Option<RunnerConfig>,
    reconcile: Option<ReconcileConfig>,
    metadata_api: Option<MetadataApiConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite connection URL (e.g. `sqlite:/path/collection.db`).
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn library(mut self, library: LibraryConfig) -> Self {
        self.library = Some(library);
        self
    }

    pub fn identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn reconcile(mut self, reconcile: ReconcileConfig) -> Self {
        self.reconcile = Some(reconcile);
        self
    }

    pub fn metadata_api_config(mut self, config: MetadataApiConfig) -> Self {
        self.metadata_api = Some(config);
        self
    }

    /// Sets the HTTP client used by the authority clients.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<CoreConfig> {
        let database_url = match self.database_url {
            Some(url) => url,
            None => provide_default_database_url()?,
        };

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            database_url,
            library: self.library.unwrap_or_default(),
            identity: self.identity.unwrap_or_default(),
            resolver: self.resolver.unwrap_or_default(),
            runner: self.runner.unwrap_or_default(),
            reconcile: self.reconcile.unwrap_or_default(),
            metadata_api: self.metadata_api.unwrap_or_default(),
            http_client,
        };

        config.validate()?;

        Ok(config)
    }
}
