//! # Library Management Module
//!
//! Owns the canonical music collection and its persistence.
//!
//! ## Overview
//!
//! This module manages:
//! - Domain models for artists, songs, albums and playlists
//! - Identity and similarity tiers deciding when two records are the same
//! - The collection aggregate with merge-on-insert semantics
//! - SQLite persistence for the collection and the resolver cache
//! - M3U and NFO export

pub mod adapters;
pub mod collection;
pub mod error;
pub mod export;
pub mod identity;
pub mod index;
pub mod models;
pub mod repositories;

pub use collection::Collection;
pub use error::{LibraryError, Result};
pub use identity::{match_songs, songs_equal, MatchTier};
pub use index::SongIndex;
pub use models::{Album, Artist, LikedSongs, Playlist, ResumeState, Song};
