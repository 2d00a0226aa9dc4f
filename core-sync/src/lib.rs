//! # Reconciliation Module
//!
//! Converges remote sources to the canonical collection and imports sources
//! into it.
//!
//! ## Overview
//!
//! This module handles:
//! - Fetching remote containers page by page with resumable cursors
//! - Computing the minimal add/remove diff by song identity
//! - Applying the diff in batches on a bounded worker pool
//! - Backing off on rate limits without losing progress
//! - One-shot imports through the authority resolver
//!
//! ## Components
//!
//! - **Job State Machine** (`job`): Reconciliation phases with validated transitions
//! - **Diff** (`diff`): Identity-based add/remove sets
//! - **Task Runner** (`runner`): Bounded workers with backpressure and timed drain
//! - **Engine** (`engine`): Fetch, diff and apply per container
//! - **Importer** (`import`): One-shot source import with admission policy
//! - **Report** (`report`): Counts returned by every pass

pub mod diff;
pub mod engine;
pub mod error;
pub mod import;
pub mod job;
pub mod pager;
pub mod report;
pub mod runner;

pub use diff::{compute_diff, Diff};
pub use engine::ReconcileEngine;
pub use error::{Result, SyncError};
pub use import::{CollectionImporter, ImportReport};
pub use job::{ReconcileJob, ReconcileJobId, SyncPhase};
pub use report::SyncReport;
pub use runner::TaskRunner;
