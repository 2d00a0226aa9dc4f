//! Integration tests for logging and configuration surfaces used by hosts.

use bridge_traits::time::LogLevel;
use core_runtime::config::{option_table, CoreConfig, OptionGroup};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    let first = init_logging(config.clone());
    let second = init_logging(config);

    // Another test binary may have installed a subscriber already; either
    // way the second attempt must be rejected.
    assert!(first.is_ok() || second.is_err());
    assert!(second.is_err());
}

#[test]
fn test_secret_redaction() {
    assert_eq!(redact_if_sensitive("lastfm_api_key", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("playlist", "road trip"), "road trip");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/srv/music/exports/liked songs.m3u"), "liked songs.m3u");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_option_table_groups_every_section() {
    let groups: Vec<_> = option_table().iter().map(|o| o.group).collect();
    for group in [
        OptionGroup::Library,
        OptionGroup::Identity,
        OptionGroup::Resolver,
        OptionGroup::Runner,
        OptionGroup::Reconcile,
        OptionGroup::Metadata,
    ] {
        assert!(groups.contains(&group), "missing group {:?}", group);
    }
}

#[test]
fn test_config_round_trip_through_option_table() {
    let mut config = CoreConfig::builder()
        .database_url("sqlite::memory:")
        .build()
        .unwrap();

    config
        .set_option("identity.fuzzy_threshold", "85")
        .unwrap();
    assert_eq!(
        config.option_value("identity.fuzzy_threshold").as_deref(),
        Some("85")
    );
}
