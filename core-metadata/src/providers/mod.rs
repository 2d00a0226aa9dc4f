//! External Metadata Authorities
//!
//! This module contains clients for external metadata services:
//! - MusicBrainz - Open music metadata database
//! - Last.fm - Music metadata and scrobbling service
//!
//! Both implement [`AuthorityClient`] and space their requests to comply
//! with the services' terms.

mod rate_limit;

pub mod lastfm;
pub mod musicbrainz;

pub use lastfm::LastFmClient;
pub use musicbrainz::MusicBrainzClient;

use bridge_traits::authority::AuthorityClient;
use bridge_traits::http::HttpClient;
use core_runtime::config::MetadataApiConfig;
use std::sync::Arc;
use tracing::info;

/// Picks the authority the configuration enables.
///
/// MusicBrainz wins when a user agent is configured, then Last.fm when an
/// API key is. `None` means resolution runs from the cache only.
pub fn client_from_config(
    config: &MetadataApiConfig,
    http_client: Arc<dyn HttpClient>,
) -> Option<Arc<dyn AuthorityClient>> {
    if let Some(user_agent) = config.musicbrainz_user_agent.clone() {
        info!("Using MusicBrainz as metadata authority");
        return Some(Arc::new(MusicBrainzClient::new(
            http_client,
            user_agent,
            config.rate_limit_delay_ms,
        )));
    }
    if config.has_lastfm() {
        info!("Using Last.fm as metadata authority");
        return Some(Arc::new(LastFmClient::new(
            http_client,
            config.lastfm_api_key.clone(),
            config.rate_limit_delay_ms,
        )));
    }
    None
}
