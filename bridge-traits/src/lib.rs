//! # Collaborator Bridge Traits
//!
//! Boundaries between the reconciliation core and everything it talks to.
//!
//! ## Overview
//!
//! The core never knows which streaming service, media server or metadata
//! database it is working with. Each collaborator is reached through a trait
//! defined here, and each trait reports failures through the structured
//! [`BridgeError`](error::BridgeError) variants the core understands.
//!
//! ## Traits
//!
//! ### Collection sources
//! - [`SourceAdapter`](source::SourceAdapter) - Paginated reads and batched writes of liked songs, playlists and albums
//!
//! ### Metadata authorities
//! - [`AuthorityClient`](authority::AuthorityClient) - Top-result lookup of artists, songs and albums
//!
//! ### Infrastructure
//! - [`HttpClient`](http::HttpClient) - Async HTTP with status classification
//! - [`DatabaseAdapter`](database::DatabaseAdapter) - SQL persistence
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! as `Arc<dyn Trait>` across worker tasks.

pub mod authority;
pub mod database;
pub mod error;
pub mod http;
pub mod source;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use authority::{AuthorityClient, AuthorityKind, AuthorityQuery, AuthorityRecord, RecordArtist};
pub use database::{DatabaseAdapter, DatabaseConfig, QueryRow, QueryValue};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use source::{ContainerRef, SourceAdapter, SourceContainer, SourcePage, SourceTrack};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
