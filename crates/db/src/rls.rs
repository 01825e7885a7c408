//! Row-Level Security (RLS) context management.
//!
//! Every partition-bound unit of work runs in a transaction that carries
//! `app.current_partition`, the setting the `partition_isolation` policies
//! on `locations` and `location_types` compare against `resource_path`.
//!
//! # Usage
//!
//! ```ignore
//! use locus_db::rls::RlsConnection;
//!
//! let rls = RlsConnection::new(&db, &partition).await?;
//! let rows = Locations::find().all(rls.transaction()).await?;
//! rls.commit().await?;
//! ```

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, Statement,
    TransactionTrait,
};

use locus_shared::types::PartitionKey;

/// Session setting read by the partition policies.
pub const PARTITION_SETTING: &str = "app.current_partition";

/// A transaction scoped to one partition.
pub struct RlsConnection {
    txn: DatabaseTransaction,
}

impl RlsConnection {
    /// Begins a transaction and sets the partition context for it.
    ///
    /// The setting is transaction-local, so it disappears on commit or
    /// rollback and never leaks to the next user of the pooled connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or the
    /// context cannot be set.
    pub async fn new(db: &DatabaseConnection, partition: &PartitionKey) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        set_rls_context(&txn, partition).await?;
        Ok(Self { txn })
    }

    /// The underlying transaction.
    #[must_use]
    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Commits the transaction. Dropping an uncommitted `RlsConnection`
    /// rolls back.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub async fn commit(self) -> Result<(), DbErr> {
        self.txn.commit().await
    }
}

/// Extension trait for `DatabaseConnection` to open partition-scoped transactions.
#[async_trait::async_trait]
pub trait RlsExt {
    /// Opens a transaction bound to `partition`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be created.
    async fn with_partition(&self, partition: &PartitionKey) -> Result<RlsConnection, DbErr>;
}

#[async_trait::async_trait]
impl RlsExt for DatabaseConnection {
    async fn with_partition(&self, partition: &PartitionKey) -> Result<RlsConnection, DbErr> {
        RlsConnection::new(self, partition).await
    }
}

/// Sets the partition context on an existing transaction.
///
/// # Errors
///
/// Returns an error if the context cannot be set.
pub async fn set_rls_context(
    txn: &DatabaseTransaction,
    partition: &PartitionKey,
) -> Result<(), DbErr> {
    txn.execute(context_statement(partition)).await?;
    Ok(())
}

/// `set_config(.., true)` is the parameterizable form of `SET LOCAL`.
fn context_statement(partition: &PartitionKey) -> Statement {
    Statement::from_sql_and_values(
        DbBackend::Postgres,
        format!("SELECT set_config('{PARTITION_SETTING}', $1, true)"),
        [partition.as_str().into()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_statement_binds_partition() {
        let partition = PartitionKey::new("tenant'; DROP TABLE locations; --").unwrap();
        let stmt = context_statement(&partition);

        assert_eq!(
            stmt.sql,
            "SELECT set_config('app.current_partition', $1, true)"
        );
        assert_eq!(
            stmt.values.map(|v| v.0.len()),
            Some(1),
            "partition must be bound, not interpolated"
        );
    }
}
