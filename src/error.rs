//! Error taxonomy for the trade workflow
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum TradeError {
    /// A [`crate::trade::TradeDetails`] rule failed. `field` names the first violated field.
    #[error("invalid trade details: {field} {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("not authorised: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The stored version was not exactly one behind the incoming one.
    #[error(
        "version conflict on trade {trade_id}: expected stored version {expected}, found {found}"
    )]
    Concurrency {
        trade_id: String,
        expected: u64,
        found: u64,
    },
    #[error("trade {0} already exists")]
    AlreadyExists(String),
    #[error("operation cancelled: {0}")]
    Cancelled(String),
    #[error("execution venue rejected the trade: {0}")]
    Execution(String),
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    Authorization,
    NotFound,
    Concurrency,
    AlreadyExists,
    Cancelled,
    Execution,
    Infrastructure,
}

impl TradeError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Concurrency { .. } => ErrorKind::Concurrency,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable code a boundary layer can map onto its own status codes.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "TRADE_VALIDATION_FAILED",
            ErrorKind::InvalidTransition => "TRADE_INVALID_TRANSITION",
            ErrorKind::Authorization => "TRADE_AUTHORIZATION_FAILED",
            ErrorKind::NotFound => "TRADE_NOT_FOUND",
            ErrorKind::Concurrency => "TRADE_CONCURRENCY_CONFLICT",
            ErrorKind::AlreadyExists => "TRADE_ALREADY_EXISTS",
            ErrorKind::Cancelled => "OPERATION_CANCELLED",
            ErrorKind::Execution => "TRADE_EXECUTION_FAILED",
            ErrorKind::Infrastructure => "INFRASTRUCTURE_ERROR",
        }
    }

    /// True for business-rule failures. Cancellation and infrastructure faults are not domain errors.
    pub fn is_domain(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::InvalidTransition
                | ErrorKind::Authorization
                | ErrorKind::NotFound
                | ErrorKind::Concurrency
                | ErrorKind::AlreadyExists
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Cooperative cancellation point. Call before and after every I/O boundary.
pub fn checkpoint(token: &CancellationToken, operation: &str) -> Result<(), TradeError> {
    if token.is_cancelled() {
        tracing::debug!(operation, "cancellation observed");
        return Err(TradeError::Cancelled(format!("{operation} was cancelled")));
    }
    Ok(())
}
