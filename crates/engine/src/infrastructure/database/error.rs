//! Query layer errors.

/// Errors raised by the query layer.
///
/// Every driver failure is folded into [`DbError::Driver`]; the remaining
/// variants are rejections raised before any SQL reaches the database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Table not allowed: {0}")]
    InvalidTable(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("{columns} columns but {values} values")]
    ColumnValueMismatch { columns: usize, values: usize },

    #[error("Statement not allowed: {0}")]
    ForbiddenStatement(String),

    #[error("Invalid lock clause: {0}")]
    InvalidLock(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Cannot switch to {requested}: transaction open on {current}")]
    TransactionOpen { current: String, requested: String },

    #[error("Transaction already open on {0}")]
    NestedTransaction(String),

    #[error("No transaction open on {0}")]
    NoTransaction(String),

    #[error("Row lock requested outside a transaction")]
    LockOutsideTransaction,

    #[error("Failed to decode row: {0}")]
    Decode(String),

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Driver {
        operation: &'static str,
        message: String,
    },
}

impl DbError {
    /// Create a Driver error with operation context.
    pub fn driver(operation: &'static str, message: impl ToString) -> Self {
        Self::Driver {
            operation,
            message: message.to_string(),
        }
    }

    pub fn decode(message: impl ToString) -> Self {
        Self::Decode(message.to_string())
    }

    /// True for failures of the database itself rather than rejected input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Driver { .. } | Self::UnknownConnection(_))
    }
}
