use derive_more::Display;
use sqlx::error::ErrorKind;

/// Every way a funds-transfer operation can fail. Each kind is surfaced
/// as-is to the caller; only `Unavailable` is worth retrying.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum TransferError {
    #[display("Validation failed: {_0}")]
    Validation(String),
    #[display("Not found: {_0}")]
    NotFound(String),
    #[display("Caller is not allowed to act on this transfer")]
    Unauthorized,
    #[display("Insufficient funds")]
    InsufficientFunds,
    #[display("Invalid state transition: {_0}")]
    InvalidStateTransition(String),
    #[display("Store unavailable: {_0}")]
    Unavailable(String),
}

impl std::error::Error for TransferError {}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Unavailable(_))
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => TransferError::NotFound("row".to_owned()),
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::ForeignKeyViolation => TransferError::NotFound(db.message().to_owned()),
                ErrorKind::UniqueViolation
                | ErrorKind::CheckViolation
                | ErrorKind::NotNullViolation => TransferError::Validation(db.message().to_owned()),
                // busy, locked, I/O and the rest of the backend failures
                _ => TransferError::Unavailable(db.to_string()),
            },
            other => TransferError::Unavailable(other.to_string()),
        }
    }
}
