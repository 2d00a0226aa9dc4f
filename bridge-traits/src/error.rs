use thiserror::Error;

/// Errors raised at the collaborator boundary.
///
/// Source adapters and authority clients translate their transport and API
/// specific failures into these variants. The reconciliation core only ever
/// inspects the structured variants (`RateLimited`, `Authentication`,
/// `MissingConfiguration`, `QueryFailed`), never adapter-specific codes.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Retry-after hint when the collaborator signalled rate limiting.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            BridgeError::RateLimited { retry_after_secs } => {
                Some(std::time::Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }

    /// Whether the failure invalidates every further call to the same source.
    pub fn is_source_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Authentication(_) | BridgeError::MissingConfiguration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
