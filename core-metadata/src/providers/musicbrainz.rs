//! MusicBrainz API Client
//!
//! Resolves artists, songs and albums against the MusicBrainz search API.
//!
//! ## API Endpoints
//!
//! - **Artist**: `https://musicbrainz.org/ws/2/artist/?query={query}&fmt=json&limit=1`
//! - **Song**: `https://musicbrainz.org/ws/2/recording/?query={query}&fmt=json&limit=1`
//! - **Album**: `https://musicbrainz.org/ws/2/release/?query={query}&fmt=json&limit=1`
//! - **Cover Art**: `https://coverartarchive.org/release/{mbid}/front` (referenced, not fetched)
//!
//! ## Rate Limiting
//!
//! MusicBrainz allows one request per second per client. The client spaces
//! its requests by the configured delay, measured on the injected clock.
//! A 429 or 503 answer surfaces as [`BridgeError::RateLimited`] with the
//! server's `Retry-After`.
//!
//! ## User Agent Requirement
//!
//! MusicBrainz requires all API clients to identify themselves with a proper User-Agent header:
//! Format: "ApplicationName/Version (ContactEmail)"
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::providers::musicbrainz::MusicBrainzClient;
//!
//! let client = MusicBrainzClient::new(
//!     http_client,
//!     "CollectionSync/0.1 (ops@example.com)".to_string(),
//!     1000, // 1 request per second
//! );
//!
//! let query = AuthorityQuery::new("Abbey Road").with_artist("The Beatles");
//! let record = client.query(AuthorityKind::Album, &query).await?;
//! ```

use super::rate_limit::RateLimiter;
use async_trait::async_trait;
use bridge_traits::authority::{AuthorityClient, AuthorityKind, AuthorityQuery, AuthorityRecord};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::time::{Clock, SystemClock};
use core_async::sync::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// MusicBrainz API base URL
const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";

/// Cover Art Archive base URL
const COVERART_ARCHIVE_BASE: &str = "https://coverartarchive.org";

/// Only the top result is used
const MAX_SEARCH_RESULTS: u32 = 1;

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MusicBrainzClient {
    http_client: Arc<dyn HttpClient>,
    user_agent: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

#[derive(Debug, Deserialize)]
struct CreditedArtist {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: String,
    #[serde(default)]
    artist: Option<CreditedArtist>,
}

#[derive(Debug, Deserialize)]
struct ArtistHit {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseRef {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RecordingHit {
    id: String,
    title: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    releases: Vec<ReleaseRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReleaseHit {
    id: String,
    title: String,
    #[serde(default)]
    artist_credit: Vec<ArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    artists: Vec<ArtistHit>,
    #[serde(default)]
    recordings: Vec<RecordingHit>,
    #[serde(default)]
    releases: Vec<ReleaseHit>,
}

fn with_credits(mut record: AuthorityRecord, credits: Vec<ArtistCredit>) -> AuthorityRecord {
    for credit in credits {
        match credit.artist {
            Some(artist) => record = record.with_artist(artist.name, Some(artist.id)),
            None => record = record.with_artist(credit.name, None),
        }
    }
    record
}

fn cover_url(release_id: &str) -> String {
    format!("{}/release/{}/front", COVERART_ARCHIVE_BASE, release_id)
}

impl MusicBrainzClient {
    /// Creates a new MusicBrainz API client
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client for making requests
    /// * `user_agent` - User agent string (format: "AppName/Version (Contact)")
    /// * `rate_limit_delay_ms` - Minimum delay between requests in milliseconds
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        user_agent: String,
        rate_limit_delay_ms: u64,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_clock(http_client, user_agent, rate_limit_delay_ms, clock)
    }

    pub fn with_clock(
        http_client: Arc<dyn HttpClient>,
        user_agent: String,
        rate_limit_delay_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            user_agent,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(rate_limit_delay_ms, clock))),
        }
    }

    /// Lucene query for a search, plus the endpoint it goes to.
    fn search_terms(kind: AuthorityKind, query: &AuthorityQuery) -> (&'static str, String) {
        let artist = query
            .artist
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| format!(" AND artist:\"{}\"", Self::escape_query(a)))
            .unwrap_or_default();
        let name = Self::escape_query(query.name.trim());

        match kind {
            AuthorityKind::Artist => ("artist", format!("artist:\"{}\"", name)),
            AuthorityKind::Song => ("recording", format!("recording:\"{}\"{}", name, artist)),
            AuthorityKind::Album => ("release", format!("release:\"{}\"{}", name, artist)),
        }
    }

    fn search_url(kind: AuthorityKind, query: &AuthorityQuery) -> String {
        let (entity, terms) = Self::search_terms(kind, query);
        format!(
            "{}/{}/?query={}&fmt=json&limit={}",
            MUSICBRAINZ_API_BASE,
            entity,
            urlencoding::encode(&terms),
            MAX_SEARCH_RESULTS
        )
    }

    fn top_record(kind: AuthorityKind, response: SearchResponse) -> Option<AuthorityRecord> {
        match kind {
            AuthorityKind::Artist => response
                .artists
                .into_iter()
                .next()
                .map(|hit| AuthorityRecord::new(kind, hit.id, hit.name)),
            AuthorityKind::Song => response.recordings.into_iter().next().map(|hit| {
                let mut record = with_credits(AuthorityRecord::new(kind, hit.id, hit.title), hit.artist_credit);
                if let Some(length) = hit.length {
                    record = record.with_duration_ms(length);
                }
                if let Some(release) = hit.releases.into_iter().next() {
                    record.cover = Some(cover_url(&release.id));
                    record = record.with_album(release.title);
                }
                record
            }),
            AuthorityKind::Album => response.releases.into_iter().next().map(|hit| {
                let mut record = with_credits(AuthorityRecord::new(kind, &hit.id, hit.title), hit.artist_credit);
                record.cover = Some(cover_url(&hit.id));
                record
            }),
        }
    }

    /// Escapes special characters in Lucene query syntax
    fn escape_query(s: &str) -> String {
        // Escape special Lucene characters: + - && || ! ( ) { } [ ] ^ " ~ * ? : \ / .
        let mut escaped = String::with_capacity(s.len());
        for c in s.chars() {
            if matches!(
                c,
                '\\' | '"' | '+' | '-' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '~' | '*'
                    | '?' | ':' | '/' | '.' | '&' | '|'
            ) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}

#[async_trait]
impl AuthorityClient for MusicBrainzClient {
    fn name(&self) -> &str {
        "musicbrainz"
    }

    #[instrument(skip(self, query), fields(query = %query))]
    async fn query(
        &self,
        kind: AuthorityKind,
        query: &AuthorityQuery,
    ) -> Result<Option<AuthorityRecord>> {
        if self.user_agent.trim().is_empty() {
            return Err(BridgeError::MissingConfiguration(
                "MusicBrainz user agent".to_string(),
            ));
        }

        let url = Self::search_url(kind, query);
        debug!("Searching MusicBrainz: {}", url);

        self.rate_limiter.lock().await.wait_if_needed().await;

        let request = HttpRequest::get(url)
            .user_agent(&self.user_agent)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self.http_client.execute(request).await?.error_for_status()?;
        let search: SearchResponse = response.json()?;
        Ok(Self::top_record(kind, search))
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

    fn respond(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn client(http: MockHttp) -> MusicBrainzClient {
        MusicBrainzClient::with_clock(
            Arc::new(http),
            "CollectionSync/0.1 (ops@example.com)".to_string(),
            0,
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn test_escape_query() {
        assert_eq!(MusicBrainzClient::escape_query("AC/DC"), "AC\\/DC");
        assert_eq!(
            MusicBrainzClient::escape_query("Artist (feat. Other)"),
            "Artist \\(feat\\. Other\\)"
        );
        assert_eq!(
            MusicBrainzClient::escape_query("Album: Title"),
            "Album\\: Title"
        );
    }

    #[test]
    fn test_search_terms_per_kind() {
        let query = AuthorityQuery::new("Hey Jude").with_artist("The Beatles");
        assert_eq!(
            MusicBrainzClient::search_terms(AuthorityKind::Song, &query),
            ("recording", "recording:\"Hey Jude\" AND artist:\"The Beatles\"".to_string())
        );
        assert_eq!(
            MusicBrainzClient::search_terms(AuthorityKind::Artist, &AuthorityQuery::new("AC/DC")),
            ("artist", "artist:\"AC\\/DC\"".to_string())
        );
        let url = MusicBrainzClient::search_url(AuthorityKind::Album, &AuthorityQuery::new("Abbey Road"));
        assert!(url.starts_with("https://musicbrainz.org/ws/2/release/?query="));
        assert!(url.ends_with("&fmt=json&limit=1"));
    }

    #[core_async::test]
    async fn test_recording_search_maps_top_result() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| {
                request.url.contains("/recording/")
                    && request.headers.get("User-Agent").map(String::as_str)
                        == Some("CollectionSync/0.1 (ops@example.com)")
            })
            .times(1)
            .returning(|_| {
                Ok(respond(
                    200,
                    r#"{"recordings":[{
                        "id":"rec-1","title":"Hey Jude","length":431000,
                        "artist-credit":[{"name":"The Beatles","artist":{"id":"art-1","name":"The Beatles"}}],
                        "releases":[{"id":"rel-1","title":"Hey Jude"}]
                    }]}"#,
                ))
            });

        let record = client(http)
            .query(AuthorityKind::Song, &AuthorityQuery::new("hey jude").with_artist("beatles"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.id, "rec-1");
        assert_eq!(record.duration_ms, Some(431_000));
        assert_eq!(record.artists[0].id.as_deref(), Some("art-1"));
        assert_eq!(record.album.as_deref(), Some("Hey Jude"));
        assert_eq!(
            record.cover.as_deref(),
            Some("https://coverartarchive.org/release/rel-1/front")
        );
    }

    #[core_async::test]
    async fn test_empty_result_is_none() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(respond(200, r#"{"created":"x","count":0,"offset":0,"artists":[]}"#)));

        let result = client(http)
            .query(AuthorityKind::Artist, &AuthorityQuery::new("Nobody At All"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[core_async::test]
    async fn test_errors_are_structured() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            let mut response = respond(503, "");
            response.headers.insert("Retry-After".into(), "4".into());
            Ok(response)
        });
        let err = client(http)
            .query(AuthorityKind::Album, &AuthorityQuery::new("Abbey Road"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::RateLimited { retry_after_secs: 4 }));

        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(respond(200, "<html>maintenance</html>")));
        let err = client(http)
            .query(AuthorityKind::Album, &AuthorityQuery::new("Abbey Road"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::QueryFailed(_)));
    }

    #[core_async::test]
    async fn test_missing_user_agent() {
        let http = MockHttp::new();
        let client = MusicBrainzClient::new(Arc::new(http), "  ".to_string(), 1000);
        let err = client
            .query(AuthorityKind::Artist, &AuthorityQuery::new("Prince"))
            .await
            .unwrap_err();
        assert!(err.is_source_fatal());
    }
}
