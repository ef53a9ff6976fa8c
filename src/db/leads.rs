use super::{parse_enum, parse_time, Store};
use crate::errors::{AppError, AppResult};
use crate::models::{Lead, LeadStage};
use crate::snapshot::SnapshotBlob;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

const LEAD_COLUMNS: &str = "id, name, email, phone, company, country, source, stage, estimated_value,
     estimated_currency, deal_value, deal_currency, main_package_id, negotiator_id, notes,
     was_confirmed_client, converted_from_client_id, preserved_client_data, created_at, updated_at";

impl Store<'_> {
    pub fn insert_lead(&self, lead: &Lead) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO leads (
               id, name, email, phone, company, country, source, stage, estimated_value,
               estimated_currency, deal_value, deal_currency, main_package_id, negotiator_id, notes,
               was_confirmed_client, converted_from_client_id, preserved_client_data, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                lead.id,
                lead.name,
                lead.email,
                lead.phone,
                lead.company,
                lead.country,
                lead.source,
                lead.stage.as_str(),
                lead.estimated_value,
                lead.estimated_currency,
                lead.deal_value,
                lead.deal_currency,
                lead.main_package_id,
                lead.negotiator_id,
                lead.notes,
                lead.was_confirmed_client,
                lead.converted_from_client_id,
                lead.preserved_client_data.as_ref().map(SnapshotBlob::as_str),
                lead.created_at.to_rfc3339(),
                lead.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_lead(&self, lead_id: &str) -> AppResult<Option<Lead>> {
        let sql = format!("SELECT {} FROM leads WHERE id = ?1", LEAD_COLUMNS);
        self.conn
            .query_row(&sql, [lead_id], parse_lead_row)
            .optional()
            .map_err(AppError::from)
    }

    /// Takes the write lock on the lead row and confirms it exists.
    pub fn lock_lead(&self, lead_id: &str) -> AppResult<()> {
        let changed = self
            .conn
            .execute("UPDATE leads SET id = id WHERE id = ?1", [lead_id])?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("lead {} does not exist", lead_id)));
        }
        Ok(())
    }

    pub fn list_leads(&self, stage: Option<LeadStage>) -> AppResult<Vec<Lead>> {
        let rows = match stage {
            Some(stage) => {
                let sql = format!(
                    "SELECT {} FROM leads WHERE stage = ?1 ORDER BY created_at DESC, id ASC",
                    LEAD_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([stage.as_str()], parse_lead_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("SELECT {} FROM leads ORDER BY created_at DESC, id ASC", LEAD_COLUMNS);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], parse_lead_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn update_lead_stage(&self, lead_id: &str, stage: LeadStage, now: DateTime<Utc>) -> AppResult<bool> {
        let changed = self.conn.execute(
            "UPDATE leads SET stage = ?1, updated_at = ?2 WHERE id = ?3",
            params![stage.as_str(), now.to_rfc3339(), lead_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_lead(&self, lead_id: &str) -> AppResult<bool> {
        let changed = self.conn.execute("DELETE FROM leads WHERE id = ?1", [lead_id])?;
        Ok(changed > 0)
    }

    pub fn find_lead_by_origin_client(&self, client_id: &str) -> AppResult<Option<Lead>> {
        let sql = format!(
            "SELECT {} FROM leads WHERE converted_from_client_id = ?1 ORDER BY created_at DESC LIMIT 1",
            LEAD_COLUMNS
        );
        self.conn
            .query_row(&sql, [client_id], parse_lead_row)
            .optional()
            .map_err(AppError::from)
    }
}

fn parse_lead_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        company: row.get(4)?,
        country: row.get(5)?,
        source: row.get(6)?,
        stage: parse_enum(&row.get::<_, String>(7)?, "lead stage", LeadStage::parse)?,
        estimated_value: row.get(8)?,
        estimated_currency: row.get(9)?,
        deal_value: row.get(10)?,
        deal_currency: row.get(11)?,
        main_package_id: row.get(12)?,
        negotiator_id: row.get(13)?,
        notes: row.get(14)?,
        was_confirmed_client: row.get::<_, i32>(15)? != 0,
        converted_from_client_id: row.get(16)?,
        preserved_client_data: row
            .get::<_, Option<String>>(17)?
            .map(SnapshotBlob::from_stored),
        created_at: parse_time(&row.get::<_, String>(18)?)?,
        updated_at: parse_time(&row.get::<_, String>(19)?)?,
    })
}
