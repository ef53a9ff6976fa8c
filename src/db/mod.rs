mod clients;
mod leads;
mod ledger;
mod services;

use crate::cascade::{CascadeReport, DeletedRows, DeletionPlan};
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Child column → parent table pairs checked by [`Database::audit_integrity`].
const REFERENCE_CHECKS: &[(&str, &str, &str)] = &[
    ("client_services", "client_id", "clients"),
    ("service_deliverables", "service_id", "client_services"),
    ("work_activity_logs", "service_id", "client_services"),
    ("service_reports", "service_id", "client_services"),
    ("client_payments", "client_id", "clients"),
    ("client_payments", "service_id", "client_services"),
    ("transactions", "client_id", "clients"),
    ("transactions", "service_id", "client_services"),
    ("calendar_events", "client_id", "clients"),
    ("calendar_events", "service_id", "client_services"),
    ("invoices", "client_id", "clients"),
    ("client_users", "client_id", "clients"),
];

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

/// Typed accessors over one open connection or transaction.
pub struct Store<'conn> {
    conn: &'conn Connection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanCount {
    pub table: String,
    pub column: String,
    pub rows: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub orphans: Vec<OrphanCount>,
    /// Relationships live as both a lead and the client it came from or became.
    pub dual_representations: i64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.dual_representations == 0 && self.orphans.iter().all(|entry| entry.rows == 0)
    }

    pub fn orphan_rows(&self) -> i64 {
        self.orphans.iter().map(|entry| entry.rows).sum()
    }
}

impl Database {
    pub fn new(path: &Path, busy_timeout: Duration) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_schema_extensions()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock_conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    /// Runs `work` inside one `BEGIN IMMEDIATE` transaction. The write lock is
    /// held from the first statement; an error from `work` drops the
    /// transaction uncommitted, which rolls everything back.
    pub fn transaction<T>(
        &self,
        operation: &str,
        entity_id: &str,
        work: impl FnOnce(&Store<'_>) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|error| AppError::from(error).in_operation(operation, entity_id))?;
        let store = Store { conn: &tx };
        let value = work(&store).map_err(|error| error.in_operation(operation, entity_id))?;
        tx.commit()
            .map_err(|error| AppError::from(error).in_operation(operation, entity_id))?;
        Ok(value)
    }

    /// Read-only access outside an explicit transaction.
    pub fn read<T>(&self, work: impl FnOnce(&Store<'_>) -> AppResult<T>) -> AppResult<T> {
        let conn = self.lock_conn()?;
        let store = Store { conn: &conn };
        work(&store)
    }

    pub fn audit_integrity(&self) -> AppResult<IntegrityReport> {
        let conn = self.lock_conn()?;
        let mut orphans = Vec::with_capacity(REFERENCE_CHECKS.len());
        for (table, column, parent) in REFERENCE_CHECKS {
            let sql = format!(
                "SELECT COUNT(1) FROM {table} child
                 WHERE child.{column} IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.id = child.{column})"
            );
            let rows: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            orphans.push(OrphanCount {
                table: table.to_string(),
                column: column.to_string(),
                rows,
            });
        }

        let dual_representations: i64 = conn.query_row(
            "SELECT
               (SELECT COUNT(1) FROM leads l
                 WHERE l.converted_from_client_id IS NOT NULL
                   AND EXISTS (SELECT 1 FROM clients c WHERE c.id = l.converted_from_client_id))
             + (SELECT COUNT(1) FROM clients c
                 WHERE c.converted_from_lead_id IS NOT NULL
                   AND EXISTS (SELECT 1 FROM leads l WHERE l.id = c.converted_from_lead_id))",
            [],
            |row| row.get(0),
        )?;

        Ok(IntegrityReport {
            orphans,
            dual_representations,
        })
    }

    #[cfg(test)]
    pub(crate) fn execute_batch_for_tests(&self, sql: &str) -> AppResult<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn ensure_schema_extensions(&self) -> AppResult<()> {
        let conn = self.lock_conn()?;

        if !column_exists(&conn, "leads", "was_confirmed_client")? {
            conn.execute(
                "ALTER TABLE leads ADD COLUMN was_confirmed_client INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }
        if !column_exists(&conn, "leads", "converted_from_client_id")? {
            conn.execute("ALTER TABLE leads ADD COLUMN converted_from_client_id TEXT", [])?;
        }
        if !column_exists(&conn, "leads", "preserved_client_data")? {
            conn.execute("ALTER TABLE leads ADD COLUMN preserved_client_data TEXT", [])?;
        }

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_leads_converted_from_client ON leads(converted_from_client_id);
             CREATE INDEX IF NOT EXISTS idx_clients_converted_from_lead ON clients(converted_from_lead_id);
             CREATE INDEX IF NOT EXISTS idx_clients_status ON clients(status);",
        )?;

        Ok(())
    }
}

impl Store<'_> {
    /// Executes `plan` step by step in its declared order.
    pub fn execute_plan(&self, plan: &DeletionPlan) -> AppResult<CascadeReport> {
        let mut report = CascadeReport::default();
        for step in &plan.steps {
            let placeholders = (1..=step.keys.len())
                .map(|position| format!("?{}", position))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                step.node.table.as_str(),
                step.node.key_column(),
                placeholders
            );
            let rows = self
                .conn
                .execute(&sql, rusqlite::params_from_iter(step.keys.iter()))?;
            tracing::debug!(
                table = step.node.table.as_str(),
                column = step.node.key_column(),
                rows,
                "cascade step executed"
            );
            report.steps.push(DeletedRows {
                table: step.node.table,
                scope: step.node.scope,
                rows,
            });
        }
        Ok(report)
    }
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

fn parse_optional_time(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_time(&value)).transpose()
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| conversion_error(error.to_string()))
}

fn parse_optional_date(raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|value| parse_date(&value)).transpose()
}

fn parse_string_list(raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str::<Vec<String>>(raw)
        .map_err(|error| conversion_error(format!("Malformed string list '{}': {}", raw, error)))
}

fn parse_enum<T>(raw: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| conversion_error(format!("Unknown {} '{}'", kind, raw)))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::Database;
    use rusqlite::Connection;
    use std::time::Duration;

    #[test]
    fn fresh_database_passes_integrity_audit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db"), Duration::from_millis(500)).expect("db");
        let report = db.audit_integrity().expect("audit");
        assert!(report.is_clean());
        assert_eq!(report.orphans.len(), 12);
    }

    #[test]
    fn legacy_lead_table_gains_conversion_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&db_path).expect("open");
            conn.execute_batch(
                "CREATE TABLE leads (
                   id TEXT PRIMARY KEY, name TEXT NOT NULL, email TEXT, phone TEXT, company TEXT,
                   country TEXT, source TEXT, stage TEXT NOT NULL, estimated_value REAL,
                   estimated_currency TEXT, deal_value REAL, deal_currency TEXT, main_package_id TEXT,
                   negotiator_id TEXT, notes TEXT, created_at TEXT NOT NULL, updated_at TEXT NOT NULL
                 );",
            )
            .expect("legacy schema");
        }

        let db = Database::new(&db_path, Duration::from_millis(500)).expect("db");
        let conn = db.lock_conn().expect("conn");
        assert!(super::column_exists(&conn, "leads", "preserved_client_data").expect("column"));
        assert!(super::column_exists(&conn, "leads", "was_confirmed_client").expect("column"));
    }

    #[test]
    fn malformed_list_columns_fail_the_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db"), Duration::from_millis(500)).expect("db");
        db.execute_batch_for_tests(
            "INSERT INTO clients (id, name, status, sales_owners_json, assigned_staff_json, created_at, updated_at)
             VALUES ('c-1', 'Acme', 'active', '[\"emp-1\"', '[]', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO client_services (id, client_id, name, start_date, status, price, currency, assignees_json, created_at)
             VALUES ('s-1', 'c-1', 'SEO', '2024-01-01', 'in_progress', 10.0, 'USD', 'emp-2', '2024-01-01T00:00:00Z');",
        )
        .expect("seed");

        let error = db.read(|store| store.get_client("c-1")).expect_err("bad sales owners");
        assert_eq!(error.code(), "TRANSACTION_FAILURE");
        assert!(error.to_string().contains("Malformed string list"), "{}", error);
        let error = db
            .read(|store| store.list_services_for_client("c-1"))
            .expect_err("bad assignees");
        assert_eq!(error.code(), "TRANSACTION_FAILURE");
    }

    #[test]
    fn audit_counts_rows_pointing_at_missing_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db"), Duration::from_millis(500)).expect("db");
        db.execute_batch_for_tests(
            "INSERT INTO service_deliverables (id, service_id, name, kind, target_count, completed_count, created_at)
             VALUES ('d-1', 'missing-service', 'Posts', 'countable', 4, 0, '2024-01-01T00:00:00Z');
             INSERT INTO invoices (id, client_id, number, amount, currency, issued_on, created_at)
             VALUES ('i-1', 'missing-client', 'INV-1', 10.0, 'USD', '2024-01-01', '2024-01-01T00:00:00Z');",
        )
        .expect("seed orphans");

        let report = db.audit_integrity().expect("audit");
        assert!(!report.is_clean());
        assert_eq!(report.orphan_rows(), 2);
    }
}
