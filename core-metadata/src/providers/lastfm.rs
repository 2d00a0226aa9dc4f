//! Last.fm API Client
//!
//! Resolves artists, songs and albums through the Last.fm search methods.
//!
//! ## API Endpoints
//!
//! - `https://ws.audioscrobbler.com/2.0/?method=artist.search&artist={name}&api_key={key}&format=json`
//! - `...?method=track.search&track={name}&artist={artist}...`
//! - `...?method=album.search&album={name}...`
//!
//! ## API Key Requirement
//!
//! Last.fm requires an API key for all requests. Without one every query
//! fails with [`BridgeError::MissingConfiguration`].
//!
//! ## Errors
//!
//! Last.fm reports failures as `{"error": <code>, "message": "..."}`, often
//! with a 200 status. Code 29 is rate limiting, codes 10 and 26 mean a bad
//! or suspended key; everything else is a query failure.

use super::rate_limit::RateLimiter;
use async_trait::async_trait;
use bridge_traits::authority::{AuthorityClient, AuthorityKind, AuthorityQuery, AuthorityRecord};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, DEFAULT_RETRY_AFTER_SECS};
use bridge_traits::time::{Clock, SystemClock};
use core_async::sync::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Last.fm API base URL
const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LastFmClient {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<String>,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

#[derive(Debug, Clone, Deserialize)]
struct Image {
    #[serde(rename = "#text", default)]
    url: String,
}

/// One search hit. Tracks and albums carry the artist as a plain string.
#[derive(Debug, Deserialize)]
struct Hit {
    name: String,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    image: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct ArtistMatches {
    #[serde(default)]
    artist: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct TrackMatches {
    #[serde(default)]
    track: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct AlbumMatches {
    #[serde(default)]
    album: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(default)]
    artistmatches: Option<ArtistMatches>,
    #[serde(default)]
    trackmatches: Option<TrackMatches>,
    #[serde(default)]
    albummatches: Option<AlbumMatches>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Results,
}

/// Last.fm error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: i32,
    message: String,
}

impl ErrorResponse {
    fn into_bridge_error(self) -> BridgeError {
        match self.error {
            29 => BridgeError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            },
            10 | 26 => BridgeError::Authentication(format!("Last.fm: {}", self.message)),
            code => BridgeError::QueryFailed(format!("Last.fm error {}: {}", code, self.message)),
        }
    }
}

impl Hit {
    /// MBID when Last.fm knows one, the entity page URL otherwise.
    fn id(&self) -> Option<String> {
        self.mbid
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.url.clone().filter(|url| !url.is_empty()))
    }

    /// Largest image; Last.fm lists sizes from small to mega.
    fn cover(&self) -> Option<String> {
        self.image
            .iter()
            .rev()
            .map(|image| image.url.clone())
            .find(|url| !url.is_empty())
    }

    fn into_record(self, kind: AuthorityKind) -> Option<AuthorityRecord> {
        let id = self.id()?;
        let cover = self.cover();
        let mut record = AuthorityRecord::new(kind, id, self.name);
        if let Some(artist) = self.artist.filter(|a| !a.trim().is_empty()) {
            record = record.with_artist(artist, None);
        }
        record.cover = cover;
        Some(record)
    }
}

impl LastFmClient {
    /// Creates a new Last.fm API client
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client for making requests
    /// * `api_key` - Last.fm API key, when one is configured
    /// * `rate_limit_delay_ms` - Minimum delay between requests in milliseconds
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        api_key: Option<String>,
        rate_limit_delay_ms: u64,
    ) -> Self {
        Self::with_clock(http_client, api_key, rate_limit_delay_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(
        http_client: Arc<dyn HttpClient>,
        api_key: Option<String>,
        rate_limit_delay_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(rate_limit_delay_ms, clock))),
        }
    }

    fn search_url(api_key: &str, kind: AuthorityKind, query: &AuthorityQuery) -> String {
        let (method, field) = match kind {
            AuthorityKind::Artist => ("artist.search", "artist"),
            AuthorityKind::Song => ("track.search", "track"),
            AuthorityKind::Album => ("album.search", "album"),
        };

        let mut url = format!(
            "{}?method={}&{}={}",
            LASTFM_API_BASE,
            method,
            field,
            urlencoding::encode(query.name.trim())
        );
        if kind == AuthorityKind::Song {
            if let Some(artist) = query.artist.as_deref().filter(|a| !a.trim().is_empty()) {
                url.push_str("&artist=");
                url.push_str(&urlencoding::encode(artist.trim()));
            }
        }
        url.push_str("&limit=1&api_key=");
        url.push_str(&urlencoding::encode(api_key));
        url.push_str("&format=json");
        url
    }

    fn top_record(kind: AuthorityKind, results: Results) -> Option<AuthorityRecord> {
        let hits = match kind {
            AuthorityKind::Artist => results.artistmatches.map(|m| m.artist),
            AuthorityKind::Song => results.trackmatches.map(|m| m.track),
            AuthorityKind::Album => results.albummatches.map(|m| m.album),
        };
        hits?.into_iter().next()?.into_record(kind)
    }
}

#[async_trait]
impl AuthorityClient for LastFmClient {
    fn name(&self) -> &str {
        "lastfm"
    }

    #[instrument(skip(self, query), fields(query = %query))]
    async fn query(
        &self,
        kind: AuthorityKind,
        query: &AuthorityQuery,
    ) -> Result<Option<AuthorityRecord>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BridgeError::MissingConfiguration("Last.fm API key".to_string()))?;

        let url = Self::search_url(api_key, kind, query);
        debug!(method = kind.as_str(), "Searching Last.fm");

        self.rate_limiter.lock().await.wait_if_needed().await;

        let request = HttpRequest::get(url)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);
        let response = self.http_client.execute(request).await?;

        if let Ok(error) = serde_json::from_slice::<ErrorResponse>(&response.body) {
            return Err(error.into_bridge_error());
        }

        let search: SearchResponse = response.error_for_status()?.json()?;
        Ok(Self::top_record(kind, search.results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::rate_limit::test_support::ManualClock;
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        pub Http {}

        #[async_trait::async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn respond(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn client(http: MockHttp, api_key: Option<&str>) -> LastFmClient {
        LastFmClient::with_clock(
            Arc::new(http),
            api_key.map(str::to_string),
            0,
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn test_search_url() {
        let url = LastFmClient::search_url(
            "key123",
            AuthorityKind::Song,
            &AuthorityQuery::new("Hey Jude").with_artist("The Beatles"),
        );
        assert_eq!(
            url,
            "https://ws.audioscrobbler.com/2.0/?method=track.search&track=Hey%20Jude&artist=The%20Beatles&limit=1&api_key=key123&format=json"
        );
    }

    #[core_async::test]
    async fn test_missing_api_key() {
        let http = MockHttp::new();
        let err = client(http, Some(" "))
            .query(AuthorityKind::Artist, &AuthorityQuery::new("Prince"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MissingConfiguration(_)));
    }

    #[core_async::test]
    async fn test_track_search_maps_top_result() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| request.url.contains("method=track.search"))
            .times(1)
            .returning(|_| {
                Ok(respond(
                    200,
                    r##"{"results":{"trackmatches":{"track":[
                        {"name":"Hey Jude","artist":"The Beatles","mbid":"",
                         "url":"https://www.last.fm/music/The+Beatles/_/Hey+Jude",
                         "image":[{"#text":"small.png","size":"small"},{"#text":"large.png","size":"large"},{"#text":"","size":"mega"}]}
                    ]}}}"##,
                ))
            });

        let record = client(http, Some("key"))
            .query(AuthorityKind::Song, &AuthorityQuery::new("hey jude"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.id, "https://www.last.fm/music/The+Beatles/_/Hey+Jude");
        assert_eq!(record.artists[0].name, "The Beatles");
        assert_eq!(record.cover.as_deref(), Some("large.png"));
    }

    #[core_async::test]
    async fn test_error_payloads() {
        for (body, check) in [
            (
                r#"{"error":6,"message":"Artist not found"}"#,
                (|e: &BridgeError| matches!(e, BridgeError::QueryFailed(_))) as fn(&BridgeError) -> bool,
            ),
            (r#"{"error":29,"message":"Rate limit exceeded"}"#, |e| {
                matches!(e, BridgeError::RateLimited { .. })
            }),
            (r#"{"error":10,"message":"Invalid API key"}"#, |e| {
                e.is_source_fatal()
            }),
        ] {
            let mut http = MockHttp::new();
            http.expect_execute().returning(move |_| Ok(respond(200, body)));
            let err = client(http, Some("key"))
                .query(AuthorityKind::Album, &AuthorityQuery::new("Abbey Road"))
                .await
                .unwrap_err();
            assert!(check(&err), "unexpected error for {}: {:?}", body, err);
        }
    }

    #[core_async::test]
    async fn test_no_matches() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| {
            Ok(respond(200, r#"{"results":{"albummatches":{"album":[]}}}"#))
        });
        let result = client(http, Some("key"))
            .query(AuthorityKind::Album, &AuthorityQuery::new("Nothing Here"))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
