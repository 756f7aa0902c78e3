use std::fmt;

use crate::ledger::LedgerError;

/// Failure categories of the Postgres ledger
#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    /// Connection pool is exhausted
    PoolExhausted,
    /// Record not found
    NotFound { entity: String, id: String },
    /// Unique constraint violation (e.g., duplicate key)
    UniqueConstraintViolation { constraint: String },
    /// Foreign key constraint violation
    ForeignKeyViolation { constraint: String },
    /// Check constraint violation (negative balance or amount)
    CheckViolation { constraint: String },
    /// Query execution error
    QueryError { message: String },
    /// Lock conflict or serialization failure; the transaction may be retried
    SerializationFailure { message: String },
    /// Transaction begin/commit/rollback error
    TransactionError { message: String },
    /// Database connection error
    ConnectionError { message: String },
    /// Stored value does not fit the ledger's types
    InvalidValue { column: String, message: String },
    /// Configuration error
    ConfigError { message: String },
    /// Unknown error
    Unknown { message: String },
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub context: Option<String>,
    pub is_retryable: bool,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        let is_retryable = matches!(
            kind,
            DatabaseErrorKind::PoolExhausted
                | DatabaseErrorKind::ConnectionError { .. }
                | DatabaseErrorKind::SerializationFailure { .. }
        );

        Self {
            kind,
            context: None,
            is_retryable,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.is_retryable
    }

    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::InvalidValue {
            column: column.into(),
            message: message.into(),
        })
    }

    /// Map SQLx error to our custom error type
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            }),
            sqlx::Error::PoolTimedOut => Self::new(DatabaseErrorKind::PoolExhausted),
            sqlx::Error::PoolClosed => Self::new(DatabaseErrorKind::ConnectionError {
                message: "Connection pool is closed".to_string(),
            }),
            sqlx::Error::Configuration(msg) => Self::new(DatabaseErrorKind::ConfigError {
                message: msg.to_string(),
            }),
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.code().as_deref() {
                    // Postgres SQLSTATE codes
                    Some("23505") => {
                        Self::new(DatabaseErrorKind::UniqueConstraintViolation { constraint })
                    }
                    Some("23503") => {
                        Self::new(DatabaseErrorKind::ForeignKeyViolation { constraint })
                    }
                    Some("23514") => Self::new(DatabaseErrorKind::CheckViolation { constraint }),
                    Some("40001") | Some("40P01") => {
                        Self::new(DatabaseErrorKind::SerializationFailure {
                            message: db_err.message().to_string(),
                        })
                    }
                    _ => Self::new(DatabaseErrorKind::QueryError {
                        message: db_err.message().to_string(),
                    }),
                }
            }
            sqlx::Error::Io(io_err) => Self::new(DatabaseErrorKind::ConnectionError {
                message: io_err.to_string(),
            }),
            _ => Self::new(DatabaseErrorKind::Unknown {
                message: error.to_string(),
            }),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match &self.kind {
            DatabaseErrorKind::PoolExhausted => {
                "Database connection pool exhausted. Please try again.".to_string()
            }
            DatabaseErrorKind::NotFound { entity, id } => {
                format!("{} with ID '{}' not found", entity, id)
            }
            DatabaseErrorKind::UniqueConstraintViolation { constraint } => {
                format!("Unique constraint '{}' violated", constraint)
            }
            DatabaseErrorKind::ForeignKeyViolation { constraint } => {
                format!("Referenced record missing (constraint '{}')", constraint)
            }
            DatabaseErrorKind::CheckViolation { constraint } => {
                format!("Check constraint '{}' violated", constraint)
            }
            DatabaseErrorKind::QueryError { message } => {
                format!("Database query failed: {}", message)
            }
            DatabaseErrorKind::SerializationFailure { message } => {
                format!("Concurrent update conflict: {}", message)
            }
            DatabaseErrorKind::TransactionError { message } => {
                format!("Transaction failed: {}", message)
            }
            DatabaseErrorKind::ConnectionError { message } => {
                format!("Database connection error: {}", message)
            }
            DatabaseErrorKind::InvalidValue { column, message } => {
                format!("Invalid value in column '{}': {}", column, message)
            }
            DatabaseErrorKind::ConfigError { message } => {
                format!("Database configuration error: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => {
                format!("Unknown database error: {}", message)
            }
        };

        if let Some(context) = &self.context {
            write!(f, "{} ({})", message, context)
        } else {
            write!(f, "{}", message)
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<DatabaseError> for LedgerError {
    fn from(err: DatabaseError) -> Self {
        if err.is_retryable() {
            LedgerError::unavailable(err.to_string())
        } else {
            LedgerError::storage(err.to_string())
        }
    }
}
