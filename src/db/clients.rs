use super::{parse_enum, parse_optional_time, parse_string_list, parse_time, Store};
use crate::errors::{AppError, AppResult};
use crate::models::{Client, ClientStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

const CLIENT_COLUMNS: &str = "id, name, email, phone, company, country, status, sales_owner_id,
     sales_owners_json, assigned_staff_json, converted_from_lead_id, lead_created_at, notes,
     created_at, updated_at";

impl Store<'_> {
    pub fn insert_client(&self, client: &Client) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO clients (
               id, name, email, phone, company, country, status, sales_owner_id, sales_owners_json,
               assigned_staff_json, converted_from_lead_id, lead_created_at, notes, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                client.id,
                client.name,
                client.email,
                client.phone,
                client.company,
                client.country,
                client.status.as_str(),
                client.sales_owner_id,
                serde_json::to_string(&client.sales_owners)?,
                serde_json::to_string(&client.assigned_staff)?,
                client.converted_from_lead_id,
                client.lead_created_at.map(|value| value.to_rfc3339()),
                client.notes,
                client.created_at.to_rfc3339(),
                client.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_client(&self, client_id: &str) -> AppResult<Option<Client>> {
        let sql = format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS);
        self.conn
            .query_row(&sql, [client_id], parse_client_row)
            .optional()
            .map_err(AppError::from)
    }

    /// Takes the write lock on the client row and confirms it exists.
    pub fn lock_client(&self, client_id: &str) -> AppResult<()> {
        let changed = self
            .conn
            .execute("UPDATE clients SET id = id WHERE id = ?1", [client_id])?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("client {} does not exist", client_id)));
        }
        Ok(())
    }

    pub fn client_exists(&self, client_id: &str) -> AppResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM clients WHERE id = ?1",
            [client_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_clients(&self, status: Option<ClientStatus>) -> AppResult<Vec<Client>> {
        let mut sql = format!("SELECT {} FROM clients", CLIENT_COLUMNS);
        let mut values: Vec<String> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" WHERE status = ?1");
            values.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), parse_client_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_client_status(
        &self,
        client_id: &str,
        status: ClientStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let changed = self.conn.execute(
            "UPDATE clients SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.to_rfc3339(), client_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_client(&self, client_id: &str) -> AppResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM clients WHERE id = ?1", [client_id])?;
        Ok(changed > 0)
    }
}

fn parse_client_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        company: row.get(4)?,
        country: row.get(5)?,
        status: parse_enum(&row.get::<_, String>(6)?, "client status", ClientStatus::parse)?,
        sales_owner_id: row.get(7)?,
        sales_owners: parse_string_list(&row.get::<_, String>(8)?)?,
        assigned_staff: parse_string_list(&row.get::<_, String>(9)?)?,
        converted_from_lead_id: row.get(10)?,
        lead_created_at: parse_optional_time(row.get(11)?)?,
        notes: row.get(12)?,
        created_at: parse_time(&row.get::<_, String>(13)?)?,
        updated_at: parse_time(&row.get::<_, String>(14)?)?,
    })
}
