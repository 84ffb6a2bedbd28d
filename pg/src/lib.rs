//! PostgreSQL target driver for reltrain.
//!
//! Implements the core [`TargetDriver`] seam over `tokio-postgres`. One
//! driver is one connection; transactions are driver state opened with
//! `BEGIN` and closed with `COMMIT`/`ROLLBACK` through the simple query
//! protocol, so multi-statement change fragments run in declared order
//! inside the open transaction. Audit rows are inserted with bound
//! parameters, never by string concatenation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use reltrain_core::config::DatabaseTarget;
use reltrain_core::driver::{AuditEntry, Connector, TargetDriver};
use reltrain_core::error::DriverError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idempotent DDL for the audit table. `table` comes from operator config.
pub fn audit_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    change_log_id BIGSERIAL PRIMARY KEY,
    release_version TEXT NOT NULL,
    change_version INT NOT NULL,
    execution_time TIMESTAMPTZ NOT NULL,
    executor_name TEXT,
    executor_ip TEXT,
    description TEXT
)"
    )
}

fn insert_audit_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} \
         (release_version, change_version, execution_time, executor_name, executor_ip, description) \
         VALUES ($1, $2, $3, $4, $5, $6)"
    )
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, tokio_postgres::Error>>,
) -> Result<T, DriverError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(|e| DriverError::Sql(e.to_string())),
        Err(_) => Err(DriverError::Timeout(limit.as_secs())),
    }
}

/// Opens one [`PgDriver`] per configured target.
pub struct PgConnector {
    statement_timeout: Duration,
}

impl PgConnector {
    pub fn new(statement_timeout_secs: u64) -> Self {
        Self {
            statement_timeout: Duration::from_secs(statement_timeout_secs),
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn TargetDriver>, DriverError> {
        let driver = PgDriver::connect(&target.url, self.statement_timeout).await?;
        Ok(Box::new(driver))
    }
}

/// One connection to one target database.
pub struct PgDriver {
    client: Client,
    connection: JoinHandle<()>,
    statement_timeout: Duration,
}

impl PgDriver {
    /// Connect and apply the statement timeout server-side as well, so a
    /// hung DDL is cancelled by the database even if the client lingers.
    pub async fn connect(url: &str, statement_timeout: Duration) -> Result<Self, DriverError> {
        let connect = tokio_postgres::connect(url, NoTls);
        let (client, connection) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| DriverError::Connect(format!("timed out after {CONNECT_TIMEOUT:?}")))?
            .map_err(|e| DriverError::Connect(e.to_string()))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "postgres connection closed with error");
            }
        });

        let driver = Self {
            client,
            connection,
            statement_timeout,
        };
        driver
            .simple(&format!(
                "SET statement_timeout = {}",
                statement_timeout.as_millis()
            ))
            .await?;
        Ok(driver)
    }

    async fn simple(&self, sql: &str) -> Result<(), DriverError> {
        with_timeout(self.statement_timeout, self.client.batch_execute(sql)).await
    }
}

impl Drop for PgDriver {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

#[async_trait]
impl TargetDriver for PgDriver {
    async fn ensure_audit_table(&mut self, table: &str) -> Result<(), DriverError> {
        self.simple(&audit_table_ddl(table))
            .await
            .map_err(audit_err)
    }

    async fn logged_releases(&mut self, table: &str) -> Result<Vec<String>, DriverError> {
        let sql = format!("SELECT DISTINCT release_version FROM {table}");
        let rows = with_timeout(self.statement_timeout, self.client.query(sql.as_str(), &[]))
            .await
            .map_err(audit_err)?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn max_logged_version(
        &mut self,
        table: &str,
        release: &str,
    ) -> Result<i32, DriverError> {
        let sql = format!(
            "SELECT COALESCE(MAX(change_version), 0) FROM {table} WHERE release_version = $1"
        );
        let row = with_timeout(
            self.statement_timeout,
            self.client.query_one(sql.as_str(), &[&release]),
        )
        .await
        .map_err(audit_err)?;
        Ok(row.get(0))
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        self.simple("BEGIN").await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), DriverError> {
        self.simple(sql).await
    }

    async fn append_audit(&mut self, table: &str, entry: &AuditEntry) -> Result<(), DriverError> {
        let sql = insert_audit_sql(table);
        let params: &[&(dyn ToSql + Sync)] = &[
            &entry.release,
            &entry.version,
            &entry.executed_at,
            &entry.executor,
            &entry.executor_addr,
            &entry.description,
        ];
        with_timeout(self.statement_timeout, self.client.execute(sql.as_str(), params))
            .await
            .map_err(audit_err)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.simple("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.simple("ROLLBACK").await
    }
}

/// Reclassify audit-table access failures so the engine can tell them
/// apart from failures in the operator's own SQL.
fn audit_err(e: DriverError) -> DriverError {
    match e {
        DriverError::Sql(message) => DriverError::Audit(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_is_idempotent_and_qualified() {
        let ddl = audit_table_ddl("public._reltrain_change_log");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS public._reltrain_change_log"));
        assert!(ddl.contains("release_version TEXT NOT NULL"));
        assert!(ddl.contains("change_version INT NOT NULL"));
        assert!(ddl.contains("execution_time TIMESTAMPTZ NOT NULL"));
    }

    #[test]
    fn audit_insert_is_parameterized() {
        let sql = insert_audit_sql("public.log");
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5, $6)"));
        assert!(!sql.contains('\''));
    }
}
