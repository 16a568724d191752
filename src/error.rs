use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionErrorCode {
    Invalidated,
    OutOfBoundsIndex,
    InvalidTransaction,
    UnsupportedColumnType,
    IncorrectThread,
    TypeMismatch,
    NotNullable,
    ColumnNotFound,
    TableNotFound,
    TableAlreadyExists,
    WrongTargetTable,
    WriteInProgress,
    SessionClosed,
    UnsupportedOperation,
    InvalidQuery,
    NotifierLimitReached,
    SessionLimitReached,
    InvalidConfig,
}

impl CollectionErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionErrorCode::Invalidated => "invalidated",
            CollectionErrorCode::OutOfBoundsIndex => "out_of_bounds_index",
            CollectionErrorCode::InvalidTransaction => "invalid_transaction",
            CollectionErrorCode::UnsupportedColumnType => "unsupported_column_type",
            CollectionErrorCode::IncorrectThread => "incorrect_thread",
            CollectionErrorCode::TypeMismatch => "type_mismatch",
            CollectionErrorCode::NotNullable => "not_nullable",
            CollectionErrorCode::ColumnNotFound => "column_not_found",
            CollectionErrorCode::TableNotFound => "table_not_found",
            CollectionErrorCode::TableAlreadyExists => "table_already_exists",
            CollectionErrorCode::WrongTargetTable => "wrong_target_table",
            CollectionErrorCode::WriteInProgress => "write_in_progress",
            CollectionErrorCode::SessionClosed => "session_closed",
            CollectionErrorCode::UnsupportedOperation => "unsupported_operation",
            CollectionErrorCode::InvalidQuery => "invalid_query",
            CollectionErrorCode::NotifierLimitReached => "notifier_limit_reached",
            CollectionErrorCode::SessionLimitReached => "session_limit_reached",
            CollectionErrorCode::InvalidConfig => "invalid_config",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// The storage behind a handle no longer exists. Terminal for that handle.
    #[error("access to invalidated collection")]
    Invalidated,
    #[error("requested index {requested} is out of bounds (valid count {valid_count})")]
    OutOfBoundsIndex { requested: usize, valid_count: usize },
    #[error("invalid transaction state: {0}")]
    InvalidTransaction(String),
    #[error("cannot {operation} column '{column}' of type {column_type}")]
    UnsupportedColumnType {
        column: String,
        column_type: String,
        operation: &'static str,
    },
    #[error("accessed from thread {current} but owned by thread {owner}")]
    IncorrectThread { owner: String, current: String },
    #[error("type mismatch on '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
    #[error("column '{column}' in table '{table}' is not nullable")]
    NotNullable { table: String, column: String },
    #[error("unknown column '{column}' in table '{table}'")]
    ColumnNotFound { table: String, column: String },
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("row belongs to table '{actual}' but the collection targets '{expected}'")]
    WrongTargetTable { expected: String, actual: String },
    #[error("another session holds the write transaction")]
    WriteInProgress,
    #[error("session is closed")]
    SessionClosed,
    #[error("{operation} is not supported: {reason}")]
    UnsupportedOperation {
        operation: &'static str,
        reason: String,
    },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("notification limit of {limit} reached")]
    NotifierLimitReached { limit: usize },
    #[error("session limit of {limit} reached")]
    SessionLimitReached { limit: usize },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
}

impl CollectionError {
    pub fn code(&self) -> CollectionErrorCode {
        match self {
            CollectionError::Invalidated => CollectionErrorCode::Invalidated,
            CollectionError::OutOfBoundsIndex { .. } => CollectionErrorCode::OutOfBoundsIndex,
            CollectionError::InvalidTransaction(_) => CollectionErrorCode::InvalidTransaction,
            CollectionError::UnsupportedColumnType { .. } => {
                CollectionErrorCode::UnsupportedColumnType
            }
            CollectionError::IncorrectThread { .. } => CollectionErrorCode::IncorrectThread,
            CollectionError::TypeMismatch { .. } => CollectionErrorCode::TypeMismatch,
            CollectionError::NotNullable { .. } => CollectionErrorCode::NotNullable,
            CollectionError::ColumnNotFound { .. } => CollectionErrorCode::ColumnNotFound,
            CollectionError::TableNotFound(_) => CollectionErrorCode::TableNotFound,
            CollectionError::TableAlreadyExists(_) => CollectionErrorCode::TableAlreadyExists,
            CollectionError::WrongTargetTable { .. } => CollectionErrorCode::WrongTargetTable,
            CollectionError::WriteInProgress => CollectionErrorCode::WriteInProgress,
            CollectionError::SessionClosed => CollectionErrorCode::SessionClosed,
            CollectionError::UnsupportedOperation { .. } => {
                CollectionErrorCode::UnsupportedOperation
            }
            CollectionError::InvalidQuery(_) => CollectionErrorCode::InvalidQuery,
            CollectionError::NotifierLimitReached { .. } => {
                CollectionErrorCode::NotifierLimitReached
            }
            CollectionError::SessionLimitReached { .. } => CollectionErrorCode::SessionLimitReached,
            CollectionError::InvalidConfig { .. } => CollectionErrorCode::InvalidConfig,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub(crate) fn out_of_bounds(requested: usize, valid_count: usize) -> Self {
        CollectionError::OutOfBoundsIndex {
            requested,
            valid_count,
        }
    }

    pub(crate) fn not_in_write(operation: &str) -> Self {
        CollectionError::InvalidTransaction(format!(
            "cannot {operation} outside of a write transaction"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionError, CollectionErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(CollectionErrorCode::Invalidated.as_str(), "invalidated");
        assert_eq!(
            CollectionErrorCode::OutOfBoundsIndex.as_str(),
            "out_of_bounds_index"
        );
        assert_eq!(
            CollectionErrorCode::UnsupportedColumnType.as_str(),
            "unsupported_column_type"
        );
    }

    #[test]
    fn out_of_bounds_reports_both_counts() {
        let err = CollectionError::out_of_bounds(4, 3);
        assert_eq!(err.code_str(), "out_of_bounds_index");
        assert_eq!(
            err.to_string(),
            "requested index 4 is out of bounds (valid count 3)"
        );
    }

    #[test]
    fn transaction_errors_name_the_operation() {
        let err = CollectionError::not_in_write("add");
        assert_eq!(err.code(), CollectionErrorCode::InvalidTransaction);
        assert!(err.to_string().contains("cannot add outside"));
    }
}
