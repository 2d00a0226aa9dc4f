use bridge_traits::error::BridgeError;
use core_library::error::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A required credential or setting is absent. Fatal to that source only.
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    TransientRateLimit { retry_after_secs: u64 },

    #[error("Query failed: {0}")]
    QueryFailure(String),

    #[error("Reconciliation cancelled")]
    Cancelled,

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Reconciliation timeout after {0} seconds")]
    Timeout(u64),

    #[error("Container {0} is not part of the collection")]
    UnknownContainer(String),

    #[error("Task runner is no longer accepting work")]
    RunnerClosed,

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Bridge error: {0}")]
    Bridge(BridgeError),
}

impl SyncError {
    /// Maps a collaborator failure onto the reconciliation taxonomy.
    pub fn from_bridge(error: BridgeError) -> Self {
        match error {
            BridgeError::MissingConfiguration(message) => SyncError::MissingConfiguration(message),
            BridgeError::Authentication(message) => SyncError::AuthenticationFailure(message),
            BridgeError::RateLimited { retry_after_secs } => {
                SyncError::TransientRateLimit { retry_after_secs }
            }
            BridgeError::QueryFailed(message) => SyncError::QueryFailure(message),
            other => SyncError::Bridge(other),
        }
    }

    /// Whether the failure ends the whole pass for this source.
    pub fn is_source_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::MissingConfiguration(_) | SyncError::AuthenticationFailure(_)
        )
    }

    /// Whether running the same pass again later may succeed.
    pub fn is_recoverable(&self) -> bool {
        !self.is_source_fatal() && !matches!(self, SyncError::UnknownContainer(_))
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        SyncError::from_bridge(error)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bridge_taxonomy() {
        assert!(matches!(
            SyncError::from(BridgeError::RateLimited { retry_after_secs: 3 }),
            SyncError::TransientRateLimit { retry_after_secs: 3 }
        ));
        assert!(matches!(
            SyncError::from(BridgeError::QueryFailed("bad page".into())),
            SyncError::QueryFailure(_)
        ));
        assert!(matches!(
            SyncError::from(BridgeError::OperationFailed("boom".into())),
            SyncError::Bridge(_)
        ));
    }

    #[test]
    fn test_source_fatal() {
        assert!(SyncError::from(BridgeError::Authentication("expired".into())).is_source_fatal());
        assert!(SyncError::from(BridgeError::MissingConfiguration("token".into())).is_source_fatal());
        assert!(!SyncError::Cancelled.is_source_fatal());
        assert!(SyncError::Cancelled.is_recoverable());
        assert!(!SyncError::UnknownContainer("playlist:x".into()).is_recoverable());
    }
}
