//! # Event Bus System
//!
//! Typed events broadcast to every subscriber so hosts can follow
//! imports, reconciliation passes and cache activity without polling.
//!
//! ## Overview
//!
//! - **Event Types**: [`SyncEvent`], [`LibraryEvent`], [`ResolverEvent`]
//!   wrapped in [`CoreEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with an optional filter
//!
//! Emitting with no subscribers is not an error worth reporting; callers
//! discard the result with `.ok()`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Cancelled {
//!     job_id: "job-1".to_string(),
//!     source: "spotify".to_string(),
//! }))
//! .ok();
//!
//! assert!(matches!(rx.try_recv(), Ok(CoreEvent::Sync(SyncEvent::Cancelled { .. }))));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use core_async::sync::broadcast::{self, error::RecvError, error::SendError};

pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall further behind receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Reconciliation pass events
    Sync(SyncEvent),
    /// Collection events
    Library(LibraryEvent),
    /// Authority resolver cache events
    Resolver(ResolverEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Resolver(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { skipped, .. }) if *skipped > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Library(LibraryEvent::Imported { .. }) => EventSeverity::Info,
            CoreEvent::Library(LibraryEvent::Cleared) => EventSeverity::Info,
            CoreEvent::Resolver(ResolverEvent::CacheCleared) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while reconciling one source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Reconciliation of a container began.
    Started {
        job_id: String,
        source: String,
        /// Container being reconciled (e.g. `liked_songs`, `playlist:abc`)
        container: String,
    },
    /// The phase state machine moved.
    PhaseChanged {
        job_id: String,
        from: String,
        to: String,
    },
    /// Periodic progress within a phase.
    Progress {
        job_id: String,
        /// Remote items fetched so far
        fetched: u64,
        /// Remote operations still queued
        pending: u64,
        phase: String,
    },
    /// A container pass finished.
    Completed {
        job_id: String,
        source: String,
        fetched: u64,
        added: u64,
        removed: u64,
        skipped: u64,
        duration_secs: u64,
    },
    /// The pass for this source was aborted.
    Failed {
        job_id: String,
        source: String,
        message: String,
        /// Whether re-running later can succeed without user action
        recoverable: bool,
    },
    /// Cancellation was observed; partially applied changes stay.
    Cancelled { job_id: String, source: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Reconciliation started",
            SyncEvent::PhaseChanged { .. } => "Reconciliation phase changed",
            SyncEvent::Progress { .. } => "Reconciliation in progress",
            SyncEvent::Completed { .. } => "Reconciliation completed",
            SyncEvent::Failed { .. } => "Reconciliation failed",
            SyncEvent::Cancelled { .. } => "Reconciliation cancelled",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to the canonical collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A one-shot import from a source was merged in.
    Imported {
        source: String,
        liked_songs: u64,
        playlists: u64,
        albums: u64,
        /// Candidates dropped by the admission policy
        rejected: u64,
    },
    /// Album names were cleaned and duplicates merged.
    AlbumsCleaned { merged: u64 },
    /// The collection was written to storage.
    Persisted { tracks: u64 },
    /// The collection was emptied by the user.
    Cleared,
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::Imported { .. } => "Source imported into collection",
            LibraryEvent::AlbumsCleaned { .. } => "Album names cleaned",
            LibraryEvent::Persisted { .. } => "Collection persisted",
            LibraryEvent::Cleared => "Collection cleared",
        }
    }
}

// ============================================================================
// Resolver Events
// ============================================================================

/// Events related to the authority resolver cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ResolverEvent {
    /// Cache entries were loaded from storage.
    CacheHydrated {
        artists: u64,
        songs: u64,
        albums: u64,
        ids: u64,
    },
    /// The cache was emptied by the user.
    CacheCleared,
}

impl ResolverEvent {
    fn description(&self) -> &str {
        match self {
            ResolverEvent::CacheHydrated { .. } => "Resolver cache hydrated",
            ResolverEvent::CacheCleared => "Resolver cache cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let sync_only = EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` if nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
