use super::LifecycleEngine;
use crate::cascade::{plan_service_deletion, CascadeReport};
use crate::db::Store;
use crate::errors::{AppError, AppResult};
use crate::models::{
    CalendarEvent, ClientPayment, ClientService, ClientUser, DeliverableDraft, DeliverableKind, FinanceTransaction,
    Invoice, IssueInvoicePayload, RecordPaymentPayload, RecordTransactionPayload, ScheduleEventPayload,
    ServiceDeliverable, ServiceDraft, ServiceReport, ServiceStatus, WorkActivityLog,
};
use crate::validation;
use chrono::Utc;
use uuid::Uuid;

impl LifecycleEngine {
    pub fn add_service(&self, client_id: &str, draft: ServiceDraft) -> AppResult<ClientService> {
        validation::service_draft(&draft)?;
        self.db.transaction("add_service", client_id, |store| {
            store.lock_client(client_id)?;
            let service = self.service_from_draft(store, client_id, &draft)?;
            store.insert_service(&service)?;
            tracing::info!(client_id = %client_id, service_id = %service.id, "added service");
            Ok(service)
        })
    }

    /// Sets `completed_at` on entry to `completed` and clears it on the way out.
    pub fn update_service_status(&self, service_id: &str, status: ServiceStatus) -> AppResult<ClientService> {
        if !status.is_persistable() {
            return Err(AppError::Validation(format!(
                "service status '{}' is computed and cannot be set",
                status.as_str()
            )));
        }
        self.db.transaction("update_service_status", service_id, |store| {
            store.lock_service(service_id)?;
            let mut service = require_service(store, service_id, None)?;
            let completed_at = match (service.status, status) {
                (ServiceStatus::Completed, ServiceStatus::Completed) => service.completed_at,
                (_, ServiceStatus::Completed) => Some(Utc::now()),
                _ => None,
            };
            store.update_service_status(service_id, status, completed_at)?;
            service.status = status;
            service.completed_at = completed_at;
            Ok(service)
        })
    }

    /// Removes one service and its dependents; the owning client is untouched.
    pub fn delete_client_service(&self, service_id: &str) -> AppResult<CascadeReport> {
        self.db.transaction("delete_client_service", service_id, |store| {
            store.lock_service(service_id)?;
            let report = store.execute_plan(&plan_service_deletion(service_id)?)?;
            tracing::info!(
                service_id = %service_id,
                rows = report.total_rows(),
                "deleted client service"
            );
            Ok(report)
        })
    }

    pub fn add_deliverable(&self, service_id: &str, draft: DeliverableDraft) -> AppResult<ServiceDeliverable> {
        if draft.name.trim().is_empty() {
            return Err(AppError::Validation("deliverable name is required".to_string()));
        }
        let (target_count, completed_count) = match draft.kind {
            DeliverableKind::Boolean => (1, draft.completed_count.clamp(0, 1)),
            DeliverableKind::Countable => (draft.target_count, draft.completed_count),
        };
        if target_count < 0 || completed_count < 0 {
            return Err(AppError::Validation("deliverable counts cannot be negative".to_string()));
        }
        self.db.transaction("add_deliverable", service_id, |store| {
            store.lock_service(service_id)?;
            let deliverable = ServiceDeliverable {
                id: Uuid::new_v4().to_string(),
                service_id: service_id.to_string(),
                name: draft.name.trim().to_string(),
                kind: draft.kind,
                target_count,
                completed_count,
                created_at: Utc::now(),
            };
            store.insert_deliverable(&deliverable)?;
            Ok(deliverable)
        })
    }

    pub fn record_payment(&self, payload: RecordPaymentPayload) -> AppResult<ClientPayment> {
        validation::amount("payment amount", payload.amount)?;
        validation::currency(&payload.currency)?;
        self.db.transaction("record_payment", &payload.client_id, |store| {
            store.lock_client(&payload.client_id)?;
            if let Some(service_id) = payload.service_id.as_deref() {
                require_service(store, service_id, Some(&payload.client_id))?;
            }
            let payment = ClientPayment {
                id: Uuid::new_v4().to_string(),
                client_id: payload.client_id.clone(),
                service_id: payload.service_id.clone(),
                amount: payload.amount,
                currency: payload.currency.clone(),
                due_date: payload.due_date,
                paid_at: payload.paid_at,
                notes: payload.notes.clone(),
                created_at: Utc::now(),
            };
            store.insert_payment(&payment)?;
            Ok(payment)
        })
    }

    pub fn record_transaction(&self, payload: RecordTransactionPayload) -> AppResult<FinanceTransaction> {
        validation::amount("transaction amount", payload.amount)?;
        validation::currency(&payload.currency)?;
        let transaction = FinanceTransaction {
            id: Uuid::new_v4().to_string(),
            client_id: payload.client_id.clone(),
            service_id: payload.service_id.clone(),
            kind: payload.kind,
            amount: payload.amount,
            currency: payload.currency.clone(),
            occurred_on: payload.occurred_on,
            description: payload.description.clone(),
            created_at: Utc::now(),
        };
        self.db.transaction("record_transaction", &transaction.id, |store| {
            require_links(store, payload.client_id.as_deref(), payload.service_id.as_deref())?;
            store.insert_transaction(&transaction)?;
            Ok(transaction.clone())
        })
    }

    pub fn schedule_event(&self, payload: ScheduleEventPayload) -> AppResult<CalendarEvent> {
        if payload.title.trim().is_empty() {
            return Err(AppError::Validation("event title is required".to_string()));
        }
        if matches!(payload.ends_at, Some(ends_at) if ends_at < payload.starts_at) {
            return Err(AppError::Validation("event ends before it starts".to_string()));
        }
        let event = CalendarEvent {
            id: Uuid::new_v4().to_string(),
            client_id: payload.client_id.clone(),
            service_id: payload.service_id.clone(),
            title: payload.title.trim().to_string(),
            starts_at: payload.starts_at,
            ends_at: payload.ends_at,
            created_at: Utc::now(),
        };
        self.db.transaction("schedule_event", &event.id, |store| {
            require_links(store, payload.client_id.as_deref(), payload.service_id.as_deref())?;
            store.insert_calendar_event(&event)?;
            Ok(event.clone())
        })
    }

    pub fn issue_invoice(&self, payload: IssueInvoicePayload) -> AppResult<Invoice> {
        validation::amount("invoice amount", payload.amount)?;
        validation::currency(&payload.currency)?;
        if payload.number.trim().is_empty() {
            return Err(AppError::Validation("invoice number is required".to_string()));
        }
        self.db.transaction("issue_invoice", &payload.client_id, |store| {
            store.lock_client(&payload.client_id)?;
            let invoice = Invoice {
                id: Uuid::new_v4().to_string(),
                client_id: payload.client_id.clone(),
                number: payload.number.trim().to_string(),
                amount: payload.amount,
                currency: payload.currency.clone(),
                issued_on: payload.issued_on,
                created_at: Utc::now(),
            };
            store.insert_invoice(&invoice)?;
            Ok(invoice)
        })
    }

    pub fn add_client_user(&self, client_id: &str, email: &str, display_name: Option<&str>) -> AppResult<ClientUser> {
        let email = email.trim();
        validation::email(email)?;
        self.db.transaction("add_client_user", client_id, |store| {
            store.lock_client(client_id)?;
            let user = ClientUser {
                id: Uuid::new_v4().to_string(),
                client_id: client_id.to_string(),
                email: email.to_string(),
                display_name: display_name.map(str::to_string),
                created_at: Utc::now(),
            };
            store.insert_client_user(&user)?;
            Ok(user)
        })
    }

    pub fn log_work(
        &self,
        service_id: &str,
        user_id: &str,
        description: &str,
        minutes: i64,
    ) -> AppResult<WorkActivityLog> {
        if minutes <= 0 {
            return Err(AppError::Validation("logged minutes must be positive".to_string()));
        }
        self.db.transaction("log_work", service_id, |store| {
            store.lock_service(service_id)?;
            let log = WorkActivityLog {
                id: Uuid::new_v4().to_string(),
                service_id: service_id.to_string(),
                user_id: user_id.to_string(),
                description: description.trim().to_string(),
                minutes,
                logged_at: Utc::now(),
            };
            store.insert_work_log(&log)?;
            Ok(log)
        })
    }

    pub fn file_service_report(&self, service_id: &str, title: &str, body: &str) -> AppResult<ServiceReport> {
        if title.trim().is_empty() {
            return Err(AppError::Validation("report title is required".to_string()));
        }
        self.db.transaction("file_service_report", service_id, |store| {
            store.lock_service(service_id)?;
            let report = ServiceReport {
                id: Uuid::new_v4().to_string(),
                service_id: service_id.to_string(),
                title: title.trim().to_string(),
                body: body.to_string(),
                created_at: Utc::now(),
            };
            store.insert_service_report(&report)?;
            Ok(report)
        })
    }
}

fn require_service(store: &Store<'_>, service_id: &str, client_id: Option<&str>) -> AppResult<ClientService> {
    let service = store
        .get_service(service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {} does not exist", service_id)))?;
    if let Some(client_id) = client_id {
        if service.client_id != client_id {
            return Err(AppError::Validation(format!(
                "service {} does not belong to client {}",
                service_id, client_id
            )));
        }
    }
    Ok(service)
}

fn require_links(store: &Store<'_>, client_id: Option<&str>, service_id: Option<&str>) -> AppResult<()> {
    if let Some(client_id) = client_id {
        if !store.client_exists(client_id)? {
            return Err(AppError::NotFound(format!("client {} does not exist", client_id)));
        }
    }
    if let Some(service_id) = service_id {
        require_service(store, service_id, client_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cascade::Table;
    use crate::config::{DefaultPackagePolicy, LifecycleConfig};
    use crate::lifecycle::LifecycleEngine;
    use crate::models::{
        ClientDraft, ClientWithService, DeliverableDraft, DeliverableKind, RecordPaymentPayload,
        RecordTransactionPayload, ScheduleEventPayload, ServiceDraft, ServiceStatus, TransactionKind,
    };
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn setup() -> (TempDir, LifecycleEngine, ClientWithService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LifecycleConfig {
            database_path: dir.path().join("test.db"),
            default_package_policy: DefaultPackagePolicy::AllowNull,
            ..LifecycleConfig::default()
        };
        let engine = LifecycleEngine::new(config).expect("engine");
        let created = engine
            .create_client_with_service(
                ClientDraft {
                    name: "Initech".to_string(),
                    ..ClientDraft::default()
                },
                service_draft("Content Retainer"),
            )
            .expect("create");
        (dir, engine, created)
    }

    fn service_draft(name: &str) -> ServiceDraft {
        ServiceDraft {
            main_package_id: None,
            name: name.to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1).expect("date"),
            end_date: None,
            status: None,
            price: 800.0,
            currency: "GBP".to_string(),
            assignees: vec![],
            notes: None,
        }
    }

    #[test]
    fn completion_timestamp_follows_status() {
        let (_dir, engine, created) = setup();
        let done = engine
            .update_service_status(&created.service.id, ServiceStatus::Completed)
            .expect("complete");
        assert!(done.completed_at.is_some());

        let reopened = engine
            .update_service_status(&created.service.id, ServiceStatus::InProgress)
            .expect("reopen");
        assert!(reopened.completed_at.is_none());

        let error = engine
            .update_service_status(&created.service.id, ServiceStatus::Delayed)
            .expect_err("computed status");
        assert_eq!(error.code(), "VALIDATION_FAILURE");
    }

    #[test]
    fn deleting_a_service_leaves_siblings_and_client_rows() {
        let (_dir, engine, created) = setup();
        let client_id = created.client.id.clone();
        let sibling = engine.add_service(&client_id, service_draft("Ads")).expect("sibling");

        engine
            .add_deliverable(
                &created.service.id,
                DeliverableDraft {
                    name: "Articles".to_string(),
                    kind: DeliverableKind::Countable,
                    target_count: 8,
                    completed_count: 2,
                },
            )
            .expect("deliverable");
        engine
            .log_work(&created.service.id, "emp-1", "Drafted outline", 45)
            .expect("work log");
        engine
            .file_service_report(&created.service.id, "February", "All on track")
            .expect("report");
        engine
            .record_payment(RecordPaymentPayload {
                client_id: client_id.clone(),
                service_id: Some(created.service.id.clone()),
                amount: 400.0,
                currency: "GBP".to_string(),
                due_date: None,
                paid_at: None,
                notes: None,
            })
            .expect("service payment");
        engine
            .record_payment(RecordPaymentPayload {
                client_id: client_id.clone(),
                service_id: None,
                amount: 50.0,
                currency: "GBP".to_string(),
                due_date: None,
                paid_at: None,
                notes: Some("setup fee".to_string()),
            })
            .expect("client payment");

        let report = engine.delete_client_service(&created.service.id).expect("delete");
        assert_eq!(report.rows_for(Table::ServiceDeliverables), 1);
        assert_eq!(report.rows_for(Table::WorkActivityLogs), 1);
        assert_eq!(report.rows_for(Table::ServiceReports), 1);
        assert_eq!(report.rows_for(Table::ClientPayments), 1);
        assert_eq!(report.rows_for(Table::ClientServices), 1);

        let detail = engine.get_client_detail(&client_id).expect("detail").expect("client");
        assert_eq!(detail.services.len(), 1);
        assert_eq!(detail.services[0].id, sibling.id);
        let payments = engine
            .database()
            .read(|store| store.list_payments_for_client(&client_id))
            .expect("payments");
        assert_eq!(payments.len(), 1);
        assert!(engine.audit_integrity().expect("audit").is_clean());
    }

    #[test]
    fn dependents_require_existing_parents() {
        let (_dir, engine, created) = setup();
        let error = engine
            .log_work("missing-service", "emp-1", "Nothing", 10)
            .expect_err("missing service");
        assert_eq!(error.code(), "NOT_FOUND");

        let error = engine
            .record_transaction(RecordTransactionPayload {
                client_id: Some("missing-client".to_string()),
                service_id: None,
                kind: TransactionKind::Income,
                amount: 10.0,
                currency: "GBP".to_string(),
                occurred_on: NaiveDate::from_ymd_opt(2024, 2, 3).expect("date"),
                description: None,
            })
            .expect_err("missing client");
        assert_eq!(error.code(), "NOT_FOUND");

        let other = engine
            .create_client_with_service(
                ClientDraft {
                    name: "Hooli".to_string(),
                    ..ClientDraft::default()
                },
                service_draft("SEO"),
            )
            .expect("other client");
        let error = engine
            .schedule_event(ScheduleEventPayload {
                client_id: Some(created.client.id.clone()),
                service_id: Some(other.service.id.clone()),
                title: "Kickoff".to_string(),
                starts_at: Utc::now(),
                ends_at: None,
            })
            .expect_err("foreign service");
        assert_eq!(error.code(), "VALIDATION_FAILURE");
    }

    #[test]
    fn client_users_need_a_well_formed_email() {
        let (_dir, engine, created) = setup();
        for bad in ["portal@initech", "portal initech@x.test", "@initech.test"] {
            let error = engine
                .add_client_user(&created.client.id, bad, None)
                .expect_err("malformed email");
            assert_eq!(error.code(), "VALIDATION_FAILURE");
        }
        let user = engine
            .add_client_user(&created.client.id, " portal@initech.test ", Some("Portal"))
            .expect("user");
        assert_eq!(user.email, "portal@initech.test");
    }
}
