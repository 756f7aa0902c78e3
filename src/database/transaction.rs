use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, error as log_error};

/// Database transaction wrapper for atomic groups
/// Dropping it without `commit` rolls every statement back
pub struct DatabaseTransaction {
    transaction: Option<Transaction<'static, Postgres>>,
}

impl DatabaseTransaction {
    /// Begin a new transaction
    pub async fn begin(pool: &PgPool) -> DbResult<Self> {
        debug!("Beginning database transaction");

        let transaction = pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        Ok(Self {
            transaction: Some(transaction),
        })
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> DbResult<()> {
        let tx = self.transaction.take().ok_or_else(completed)?;
        debug!("Committing transaction");

        tx.commit().await.map_err(|e| {
            log_error!("Failed to commit transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })
    }

    /// Rollback the transaction
    pub async fn rollback(mut self) -> DbResult<()> {
        let tx = self.transaction.take().ok_or_else(completed)?;
        debug!("Rolling back transaction");

        tx.rollback().await.map_err(|e| {
            log_error!("Failed to rollback transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })
    }

    /// Connection to run the transaction's statements on
    pub fn conn(&mut self) -> DbResult<&mut PgConnection> {
        self.transaction.as_deref_mut().ok_or_else(completed)
    }
}

fn completed() -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::TransactionError {
        message: "Transaction already completed".to_string(),
    })
}
