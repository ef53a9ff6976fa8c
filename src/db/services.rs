use super::{
    format_date, parse_date, parse_enum, parse_optional_date, parse_optional_time, parse_string_list, parse_time,
    Store,
};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ClientService, DeliverableKind, MainPackage, ServiceDeliverable, ServiceReport, ServiceStatus,
    WorkActivityLog,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

const SERVICE_COLUMNS: &str = "id, client_id, main_package_id, name, start_date, end_date, status, price,
     currency, assignees_json, notes, completed_at, created_at";

impl Store<'_> {
    pub fn insert_service(&self, service: &ClientService) -> AppResult<()> {
        if !service.status.is_persistable() {
            return Err(AppError::Validation(format!(
                "service status '{}' is computed and cannot be stored",
                service.status.as_str()
            )));
        }
        self.conn.execute(
            "INSERT INTO client_services (
               id, client_id, main_package_id, name, start_date, end_date, status, price, currency,
               assignees_json, notes, completed_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                service.id,
                service.client_id,
                service.main_package_id,
                service.name,
                format_date(service.start_date),
                service.end_date.map(format_date),
                service.status.as_str(),
                service.price,
                service.currency,
                serde_json::to_string(&service.assignees)?,
                service.notes,
                service.completed_at.map(|value| value.to_rfc3339()),
                service.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_service(&self, service_id: &str) -> AppResult<Option<ClientService>> {
        let sql = format!("SELECT {} FROM client_services WHERE id = ?1", SERVICE_COLUMNS);
        self.conn
            .query_row(&sql, [service_id], parse_service_row)
            .optional()
            .map_err(AppError::from)
    }

    /// Takes the write lock on the service row and confirms it exists.
    pub fn lock_service(&self, service_id: &str) -> AppResult<()> {
        let changed = self
            .conn
            .execute("UPDATE client_services SET id = id WHERE id = ?1", [service_id])?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("service {} does not exist", service_id)));
        }
        Ok(())
    }

    pub fn list_services_for_client(&self, client_id: &str) -> AppResult<Vec<ClientService>> {
        let sql = format!(
            "SELECT {} FROM client_services WHERE client_id = ?1 ORDER BY start_date ASC, created_at ASC, id ASC",
            SERVICE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([client_id], parse_service_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn service_ids_for_client(&self, client_id: &str) -> AppResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM client_services WHERE client_id = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map([client_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_service_status(
        &self,
        service_id: &str,
        status: ServiceStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        if !status.is_persistable() {
            return Err(AppError::Validation(format!(
                "service status '{}' is computed and cannot be stored",
                status.as_str()
            )));
        }
        let changed = self.conn.execute(
            "UPDATE client_services SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.as_str(), completed_at.map(|value| value.to_rfc3339()), service_id],
        )?;
        Ok(changed > 0)
    }

    pub fn insert_deliverable(&self, deliverable: &ServiceDeliverable) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO service_deliverables (id, service_id, name, kind, target_count, completed_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                deliverable.id,
                deliverable.service_id,
                deliverable.name,
                deliverable.kind.as_str(),
                deliverable.target_count,
                deliverable.completed_count,
                deliverable.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_deliverables_for_service(&self, service_id: &str) -> AppResult<Vec<ServiceDeliverable>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, service_id, name, kind, target_count, completed_count, created_at
             FROM service_deliverables WHERE service_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([service_id], |row| {
                Ok(ServiceDeliverable {
                    id: row.get(0)?,
                    service_id: row.get(1)?,
                    name: row.get(2)?,
                    kind: parse_enum(&row.get::<_, String>(3)?, "deliverable kind", DeliverableKind::parse)?,
                    target_count: row.get(4)?,
                    completed_count: row.get(5)?,
                    created_at: parse_time(&row.get::<_, String>(6)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_work_log(&self, log: &WorkActivityLog) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO work_activity_logs (id, service_id, user_id, description, minutes, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                log.id,
                log.service_id,
                log.user_id,
                log.description,
                log.minutes,
                log.logged_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_service_report(&self, report: &ServiceReport) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO service_reports (id, service_id, title, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.id,
                report.service_id,
                report.title,
                report.body,
                report.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_main_package(&self, package: &MainPackage) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO main_packages (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![package.id, package.name, package.is_active, package.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn main_package_is_active(&self, package_id: &str) -> AppResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM main_packages WHERE id = ?1 AND is_active = 1",
            [package_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn main_package_exists(&self, package_id: &str) -> AppResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM main_packages WHERE id = ?1",
            [package_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Oldest active package; the fallback target for drafts without one.
    pub fn first_active_main_package(&self) -> AppResult<Option<MainPackage>> {
        self.conn
            .query_row(
                "SELECT id, name, is_active, created_at FROM main_packages
                 WHERE is_active = 1 ORDER BY created_at ASC, id ASC LIMIT 1",
                [],
                |row| {
                    Ok(MainPackage {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        is_active: row.get::<_, i32>(2)? != 0,
                        created_at: parse_time(&row.get::<_, String>(3)?)?,
                    })
                },
            )
            .optional()
            .map_err(AppError::from)
    }
}

fn parse_service_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientService> {
    Ok(ClientService {
        id: row.get(0)?,
        client_id: row.get(1)?,
        main_package_id: row.get(2)?,
        name: row.get(3)?,
        start_date: parse_date(&row.get::<_, String>(4)?)?,
        end_date: parse_optional_date(row.get(5)?)?,
        status: parse_enum(&row.get::<_, String>(6)?, "service status", ServiceStatus::parse)?,
        price: row.get(7)?,
        currency: row.get(8)?,
        assignees: parse_string_list(&row.get::<_, String>(9)?)?,
        notes: row.get(10)?,
        completed_at: parse_optional_time(row.get(11)?)?,
        created_at: parse_time(&row.get::<_, String>(12)?)?,
    })
}
