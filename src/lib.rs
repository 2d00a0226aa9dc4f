//! Workspace umbrella crate.
//!
//! Exposes feature flags that map to the individual workspace crates
//! (`core-service`, `core-metadata`, `core-sync`), so hosts can depend on
//! `collection-sync-workspace` without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "authorities")]
pub use core_metadata as metadata;

#[cfg(feature = "reconcile")]
pub use core_sync as sync;
