use super::{format_date, parse_optional_date, parse_optional_time, parse_time, Store};
use crate::errors::AppResult;
use crate::models::{CalendarEvent, ClientPayment, ClientUser, FinanceTransaction, Invoice};
use rusqlite::params;

impl Store<'_> {
    pub fn insert_payment(&self, payment: &ClientPayment) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO client_payments (id, client_id, service_id, amount, currency, due_date, paid_at, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                payment.id,
                payment.client_id,
                payment.service_id,
                payment.amount,
                payment.currency,
                payment.due_date.map(format_date),
                payment.paid_at.map(|value| value.to_rfc3339()),
                payment.notes,
                payment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_payments_for_client(&self, client_id: &str) -> AppResult<Vec<ClientPayment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, service_id, amount, currency, due_date, paid_at, notes, created_at
             FROM client_payments WHERE client_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([client_id], |row| {
                Ok(ClientPayment {
                    id: row.get(0)?,
                    client_id: row.get(1)?,
                    service_id: row.get(2)?,
                    amount: row.get(3)?,
                    currency: row.get(4)?,
                    due_date: parse_optional_date(row.get(5)?)?,
                    paid_at: parse_optional_time(row.get(6)?)?,
                    notes: row.get(7)?,
                    created_at: parse_time(&row.get::<_, String>(8)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_transaction(&self, transaction: &FinanceTransaction) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO transactions (id, client_id, service_id, kind, amount, currency, occurred_on, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                transaction.id,
                transaction.client_id,
                transaction.service_id,
                transaction.kind.as_str(),
                transaction.amount,
                transaction.currency,
                format_date(transaction.occurred_on),
                transaction.description,
                transaction.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_calendar_event(&self, event: &CalendarEvent) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO calendar_events (id, client_id, service_id, title, starts_at, ends_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.client_id,
                event.service_id,
                event.title,
                event.starts_at.to_rfc3339(),
                event.ends_at.map(|value| value.to_rfc3339()),
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_invoice(&self, invoice: &Invoice) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO invoices (id, client_id, number, amount, currency, issued_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                invoice.id,
                invoice.client_id,
                invoice.number,
                invoice.amount,
                invoice.currency,
                format_date(invoice.issued_on),
                invoice.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_client_user(&self, user: &ClientUser) -> AppResult<()> {
        self.conn.execute(
            "INSERT INTO client_users (id, client_id, email, display_name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.client_id,
                user.email,
                user.display_name,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
