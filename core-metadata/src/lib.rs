//! # Metadata Authority Module
//!
//! Canonicalizes loosely typed source records against a trusted metadata
//! authority.
//!
//! ## Overview
//!
//! This module handles:
//! - The resolver cache (query ids plus artist, song and album records)
//! - Authority resolution with cache short-circuit and incremental persistence
//! - The verified-only admission policy
//! - MusicBrainz and Last.fm authority clients

pub mod cache;
pub mod error;
pub mod policy;
pub mod providers;
pub mod resolver;

pub use cache::{CacheSizes, ResolverCache};
pub use error::{MetadataError, Result};
pub use policy::AdmissionPolicy;
pub use resolver::AuthorityResolver;
