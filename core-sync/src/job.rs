//! # Reconcile Job State Machine
//!
//! Tracks one reconciliation pass (one source, one container) through its
//! phases with validated transitions.
//!
//! ## State Machine
//!
//! ```text
//! Fetching → Diffing → Applying → Done
//!    ↓ ↑                 ↓ ↑
//!   Backoff             Backoff
//!
//! any non-terminal phase → Cancelled | Failed
//! ```
//!
//! `Backoff` remembers the phase it was entered from and may only return
//! to that phase, so progress made before the pause is kept.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{ReconcileJob, SyncPhase};
//!
//! let mut job = ReconcileJob::new("spotify", ContainerRef::LikedSongs);
//! job.transition(SyncPhase::Backoff)?;
//! job.resume_from_backoff()?;
//! job.transition(SyncPhase::Diffing)?;
//! ```

use crate::{Result, SyncError};
use bridge_traits::source::ContainerRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconcileJobId(Uuid);

impl ReconcileJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::QueryFailure(format!("invalid job id '{}': {}", s, e)))
    }
}

impl Default for ReconcileJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReconcileJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Fetching,
    Diffing,
    Applying,
    Backoff,
    Done,
    Cancelled,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Cancelled | SyncPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Fetching => "fetching",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Applying => "applying",
            SyncPhase::Backoff => "backoff",
            SyncPhase::Done => "done",
            SyncPhase::Cancelled => "cancelled",
            SyncPhase::Failed => "failed",
        }
    }
}

impl FromStr for SyncPhase {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fetching" => Ok(SyncPhase::Fetching),
            "diffing" => Ok(SyncPhase::Diffing),
            "applying" => Ok(SyncPhase::Applying),
            "backoff" => Ok(SyncPhase::Backoff),
            "done" => Ok(SyncPhase::Done),
            "cancelled" => Ok(SyncPhase::Cancelled),
            "failed" => Ok(SyncPhase::Failed),
            _ => Err(SyncError::QueryFailure(format!("unknown phase '{}'", s))),
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileJob {
    pub id: ReconcileJobId,
    pub source: String,
    pub container: ContainerRef,
    phase: SyncPhase,
    /// Phase to return to when leaving `Backoff`
    backoff_from: Option<SyncPhase>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl ReconcileJob {
    /// A new job, already fetching.
    pub fn new(source: impl Into<String>, container: ContainerRef) -> Self {
        Self {
            id: ReconcileJobId::new(),
            source: source.into(),
            container,
            phase: SyncPhase::Fetching,
            backoff_from: None,
            started_at: chrono::Utc::now().timestamp(),
            finished_at: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Moves to `to`, returning the phase that was left.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the move is not allowed
    pub fn transition(&mut self, to: SyncPhase) -> Result<SyncPhase> {
        self.validate_transition(to)?;
        let from = self.phase;
        if to == SyncPhase::Backoff {
            self.backoff_from = Some(from);
        } else if from == SyncPhase::Backoff {
            self.backoff_from = None;
        }
        if to.is_terminal() {
            self.finished_at = Some(chrono::Utc::now().timestamp());
        }
        self.phase = to;
        Ok(from)
    }

    /// Returns to the phase `Backoff` was entered from.
    pub fn resume_from_backoff(&mut self) -> Result<SyncPhase> {
        match self.backoff_from {
            Some(previous) if self.phase == SyncPhase::Backoff => {
                self.transition(previous)?;
                Ok(previous)
            }
            _ => Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: "resume".to_string(),
                reason: "Job is not backing off".to_string(),
            }),
        }
    }

    pub fn duration_secs(&self) -> u64 {
        let end = self
            .finished_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        end.saturating_sub(self.started_at).max(0) as u64
    }

    fn validate_transition(&self, to: SyncPhase) -> Result<()> {
        use SyncPhase::*;

        let valid = match (self.phase, to) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) | (_, Failed) => true,

            (Fetching, Diffing) | (Fetching, Backoff) => true,
            (Diffing, Applying) => true,
            (Applying, Done) | (Applying, Backoff) => true,
            (Backoff, next) => self.backoff_from == Some(next),

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
                reason: format!("Cannot transition from {} to {}", self.phase, to),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
