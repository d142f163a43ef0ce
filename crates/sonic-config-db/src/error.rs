//! Error types for CONFIG_DB store operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use thiserror::Error;

/// Result type alias for store operations.
pub type ConfigDbResult<T> = Result<T, ConfigDbError>;

/// Errors that can occur while reading or writing CONFIG_DB.
#[derive(Debug, Error)]
pub enum ConfigDbError {
    /// Failed to connect to the backing database.
    #[error("Database connection failed: {target}: {message}")]
    Connection {
        /// Connection target (URI or host:port).
        target: String,
        /// Error message.
        message: String,
    },

    /// A database command failed.
    #[error("Database operation failed: {operation} {table}|{key}: {message}")]
    Operation {
        /// The operation that failed (e.g., "hgetall", "hset", "del").
        operation: String,
        /// The table name.
        table: String,
        /// The row key.
        key: String,
        /// Error message.
        message: String,
    },
}

impl ConfigDbError {
    /// Creates a connection error.
    pub fn connection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates an operation error for a row.
    pub fn operation(
        operation: impl Into<String>,
        table: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            operation: operation.into(),
            table: table.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_display() {
        let err = ConfigDbError::operation("hset", "PORT", "Ethernet0", "Connection refused");
        assert_eq!(
            err.to_string(),
            "Database operation failed: hset PORT|Ethernet0: Connection refused"
        );
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConfigDbError::connection("redis://127.0.0.1:6379/4", "timeout");
        assert!(err.to_string().contains("redis://127.0.0.1:6379/4"));
    }
}
