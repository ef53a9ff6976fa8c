mod delivery;

use crate::cascade::plan_client_deletion;
use crate::config::{DefaultPackagePolicy, LifecycleConfig};
use crate::db::{Database, IntegrityReport, Store};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Client, ClientDetail, ClientDraft, ClientService, ClientStatus, ClientTransition, ClientWithService,
    CreateLeadPayload, DeleteClientOutcome, Lead, LeadStage, MainPackage, ServiceDraft, ServiceStatus, ServiceWithDeliverables,
};
use crate::snapshot;
use crate::validation;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

const CLIENT_CONVERSION_SOURCE: &str = "client_conversion";

/// Orchestrates lead/client transitions. Holds no entity state between calls;
/// every public operation is one store transaction.
#[derive(Debug, Clone)]
pub struct LifecycleEngine {
    db: Arc<Database>,
    config: LifecycleConfig,
}

impl LifecycleEngine {
    pub fn new(config: LifecycleConfig) -> AppResult<Self> {
        config.validate()?;
        let db = Database::new(&config.database_path, config.busy_timeout())?;
        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Promotes a lead. A lead carrying a snapshot gets its former client graph
    /// back; any other lead becomes a fresh client with one seeded service.
    /// The lead row is deleted last, in the same transaction.
    pub fn convert_lead_to_client(&self, lead_id: &str) -> AppResult<Client> {
        self.db.transaction("convert_lead_to_client", lead_id, |store| {
            store.lock_lead(lead_id)?;
            let lead = store
                .get_lead(lead_id)?
                .ok_or_else(|| AppError::NotFound(format!("lead {} does not exist", lead_id)))?;

            let (client, services) = match &lead.preserved_client_data {
                Some(blob) => {
                    let restored = snapshot::restore(blob, &lead)?;
                    let mut services = restored.services;
                    for entry in &mut services {
                        entry.service.main_package_id =
                            self.restored_main_package(store, entry.service.main_package_id.take())?;
                    }
                    (restored.client, services)
                }
                None => self.synthesize_client(store, &lead)?,
            };

            store.insert_client(&client)?;
            for entry in &services {
                store.insert_service(&entry.service)?;
                for deliverable in &entry.deliverables {
                    store.insert_deliverable(deliverable)?;
                }
            }
            store.delete_lead(lead_id)?;

            tracing::info!(
                lead_id = %lead_id,
                client_id = %client.id,
                services = services.len(),
                restored = lead.has_preserved_client_data(),
                "converted lead to client"
            );
            Ok(client)
        })
    }

    /// Demotes a client. The lead is inserted first, carrying a snapshot of the
    /// client graph; the client subtree is then removed in cascade order.
    pub fn convert_client_to_lead(&self, client_id: &str) -> AppResult<Lead> {
        self.db.transaction("convert_client_to_lead", client_id, |store| {
            store.lock_client(client_id)?;
            let client = store
                .get_client(client_id)?
                .ok_or_else(|| AppError::NotFound(format!("client {} does not exist", client_id)))?;
            let services = load_service_graph(store, client_id)?;

            let blob = snapshot::encode(&snapshot::capture(&client, &services))?;
            let lead = demoted_lead(&client, &services, blob);
            store.insert_lead(&lead)?;

            let service_ids = services.iter().map(|entry| entry.service.id.clone()).collect();
            let report = store.execute_plan(&plan_client_deletion(client_id, service_ids)?)?;
            store.delete_client(client_id)?;

            tracing::info!(
                client_id = %client_id,
                lead_id = %lead.id,
                services = services.len(),
                dependent_rows = report.total_rows(),
                "converted client to lead"
            );
            Ok(lead)
        })
    }

    pub fn archive_client(&self, client_id: &str) -> AppResult<Client> {
        self.transition_client(client_id, ClientTransition::Archive)
    }

    pub fn restore_client(&self, client_id: &str) -> AppResult<Client> {
        self.transition_client(client_id, ClientTransition::Restore)
    }

    pub fn reactivate_client(&self, client_id: &str) -> AppResult<Client> {
        self.transition_client(client_id, ClientTransition::Reactivate)
    }

    pub fn mark_client_completed(&self, client_id: &str) -> AppResult<Client> {
        self.transition_client(client_id, ClientTransition::MarkCompleted)
    }

    /// Hard delete regardless of status. Callers decide when that is allowed.
    pub fn delete_client(&self, client_id: &str) -> AppResult<bool> {
        self.db.transaction("delete_client", client_id, |store| {
            store.lock_client(client_id)?;
            let service_ids = store.service_ids_for_client(client_id)?;
            let report = store.execute_plan(&plan_client_deletion(client_id, service_ids)?)?;
            let deleted = store.delete_client(client_id)?;
            tracing::info!(
                client_id = %client_id,
                dependent_rows = report.total_rows(),
                "deleted client"
            );
            Ok(deleted)
        })
    }

    /// Archives a live client; removes one that is already archived. The
    /// status check and the action share one transaction.
    pub fn archive_or_delete_client(&self, client_id: &str) -> AppResult<DeleteClientOutcome> {
        self.db.transaction("delete_client", client_id, |store| {
            store.lock_client(client_id)?;
            let client = store
                .get_client(client_id)?
                .ok_or_else(|| AppError::NotFound(format!("client {} does not exist", client_id)))?;

            if client.status == ClientStatus::Archived {
                let service_ids = store.service_ids_for_client(client_id)?;
                let report = store.execute_plan(&plan_client_deletion(client_id, service_ids)?)?;
                store.delete_client(client_id)?;
                tracing::info!(
                    client_id = %client_id,
                    dependent_rows = report.total_rows(),
                    "deleted archived client"
                );
                return Ok(DeleteClientOutcome::Deleted);
            }

            store.update_client_status(client_id, ClientStatus::Archived, Utc::now())?;
            tracing::info!(
                client_id = %client_id,
                from = client.status.as_str(),
                "archived client on delete request"
            );
            Ok(DeleteClientOutcome::Archived)
        })
    }

    pub fn create_client_with_service(
        &self,
        client_draft: ClientDraft,
        service_draft: ServiceDraft,
    ) -> AppResult<ClientWithService> {
        validation::client_draft(&client_draft)?;
        validation::service_draft(&service_draft)?;
        let client_id = Uuid::new_v4().to_string();
        self.db.transaction("create_client_with_service", &client_id, |store| {
            let now = Utc::now();
            let sales_owners = if client_draft.sales_owners.is_empty() {
                client_draft.sales_owner_id.iter().cloned().collect()
            } else {
                client_draft.sales_owners.clone()
            };
            let client = Client {
                id: client_id.clone(),
                name: client_draft.name.trim().to_string(),
                email: client_draft.email.clone(),
                phone: client_draft.phone.clone(),
                company: client_draft.company.clone(),
                country: client_draft.country.clone(),
                status: ClientStatus::Active,
                sales_owner_id: client_draft.sales_owner_id.clone(),
                sales_owners,
                assigned_staff: client_draft.assigned_staff.clone(),
                converted_from_lead_id: None,
                lead_created_at: None,
                notes: client_draft.notes.clone(),
                created_at: now,
                updated_at: now,
            };
            let service = self.service_from_draft(store, &client.id, &service_draft)?;

            store.insert_client(&client)?;
            store.insert_service(&service)?;

            tracing::info!(
                client_id = %client.id,
                service_id = %service.id,
                main_package_id = service.main_package_id.as_deref().unwrap_or("none"),
                "created client with first service"
            );
            Ok(ClientWithService { client, service })
        })
    }

    pub fn create_lead(&self, payload: CreateLeadPayload) -> AppResult<Lead> {
        validation::lead_payload(&payload)?;
        let lead_id = Uuid::new_v4().to_string();
        self.db.transaction("create_lead", &lead_id, |store| {
            let now = Utc::now();
            let lead = Lead {
                id: lead_id.clone(),
                name: payload.name.trim().to_string(),
                email: payload.email.clone(),
                phone: payload.phone.clone(),
                company: payload.company.clone(),
                country: payload.country.clone(),
                source: payload.source.clone(),
                stage: payload.stage.unwrap_or(LeadStage::New),
                estimated_value: payload.estimated_value,
                estimated_currency: payload.estimated_currency.clone(),
                deal_value: payload.deal_value,
                deal_currency: payload.deal_currency.clone(),
                main_package_id: payload.main_package_id.clone(),
                negotiator_id: payload.negotiator_id.clone(),
                notes: payload.notes.clone(),
                was_confirmed_client: false,
                converted_from_client_id: None,
                preserved_client_data: None,
                created_at: now,
                updated_at: now,
            };
            store.insert_lead(&lead)?;
            Ok(lead)
        })
    }

    pub fn update_lead_stage(&self, lead_id: &str, stage: LeadStage) -> AppResult<Lead> {
        self.db.transaction("update_lead_stage", lead_id, |store| {
            store.lock_lead(lead_id)?;
            store.update_lead_stage(lead_id, stage, Utc::now())?;
            store
                .get_lead(lead_id)?
                .ok_or_else(|| AppError::NotFound(format!("lead {} does not exist", lead_id)))
        })
    }

    pub fn create_main_package(&self, name: &str) -> AppResult<MainPackage> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("main package name is required".to_string()));
        }
        let package = MainPackage {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.db.transaction("create_main_package", &package.id, |store| {
            store.insert_main_package(&package)?;
            Ok(package.clone())
        })
    }

    pub fn get_lead(&self, lead_id: &str) -> AppResult<Option<Lead>> {
        self.db.read(|store| store.get_lead(lead_id))
    }

    pub fn list_leads(&self, stage: Option<LeadStage>) -> AppResult<Vec<Lead>> {
        self.db.read(|store| store.list_leads(stage))
    }

    pub fn get_client(&self, client_id: &str) -> AppResult<Option<Client>> {
        self.db.read(|store| store.get_client(client_id))
    }

    pub fn list_clients(&self, status: Option<ClientStatus>) -> AppResult<Vec<Client>> {
        self.db.read(|store| store.list_clients(status))
    }

    pub fn get_client_detail(&self, client_id: &str) -> AppResult<Option<ClientDetail>> {
        self.db.read(|store| {
            let Some(client) = store.get_client(client_id)? else {
                return Ok(None);
            };
            let services = store.list_services_for_client(client_id)?;
            Ok(Some(ClientDetail { client, services }))
        })
    }

    pub fn audit_integrity(&self) -> AppResult<IntegrityReport> {
        self.db.audit_integrity()
    }

    fn transition_client(&self, client_id: &str, transition: ClientTransition) -> AppResult<Client> {
        self.db.transaction(transition.as_str(), client_id, |store| {
            store.lock_client(client_id)?;
            let mut client = store
                .get_client(client_id)?
                .ok_or_else(|| AppError::NotFound(format!("client {} does not exist", client_id)))?;

            let target = transition.target();
            if client.status == target {
                return Ok(client);
            }
            if !transition.allowed_from(client.status) {
                return Err(AppError::InvalidTransition(format!(
                    "cannot move client from '{}' to '{}'",
                    client.status.as_str(),
                    target.as_str()
                )));
            }

            let now = Utc::now();
            store.update_client_status(client_id, target, now)?;
            tracing::info!(
                client_id = %client_id,
                from = client.status.as_str(),
                to = target.as_str(),
                "client status changed"
            );
            client.status = target;
            client.updated_at = now;
            Ok(client)
        })
    }

    /// Applies the configured policy when `requested` is absent or does not
    /// name an active package. Never returns a dangling id.
    fn resolve_main_package(&self, store: &Store<'_>, requested: Option<&str>) -> AppResult<Option<String>> {
        if let Some(package_id) = requested {
            if store.main_package_is_active(package_id)? {
                return Ok(Some(package_id.to_string()));
            }
            tracing::warn!(package_id = %package_id, "main package missing or inactive");
        }

        match self.config.default_package_policy {
            DefaultPackagePolicy::Fallback => match store.first_active_main_package()? {
                Some(package) => Ok(Some(package.id)),
                None => {
                    tracing::warn!("no active main package to fall back to; storing service without one");
                    Ok(None)
                }
            },
            DefaultPackagePolicy::Fail => Err(AppError::Validation(match requested {
                Some(package_id) => format!("main package {} is missing or inactive", package_id),
                None => "a main package is required".to_string(),
            })),
            DefaultPackagePolicy::AllowNull => Ok(None),
        }
    }

    /// Keeps a snapshot's package reference unless the package row is gone.
    /// A dangling id is replaced by the fallback package when the policy
    /// allows it and dropped otherwise; restores never fail on packages.
    fn restored_main_package(&self, store: &Store<'_>, captured: Option<String>) -> AppResult<Option<String>> {
        let Some(package_id) = captured else {
            return Ok(None);
        };
        if store.main_package_exists(&package_id)? {
            return Ok(Some(package_id));
        }
        tracing::warn!(package_id = %package_id, "restored service references a deleted main package");
        match self.config.default_package_policy {
            DefaultPackagePolicy::Fallback => Ok(store.first_active_main_package()?.map(|package| package.id)),
            DefaultPackagePolicy::Fail | DefaultPackagePolicy::AllowNull => Ok(None),
        }
    }

    fn service_from_draft(
        &self,
        store: &Store<'_>,
        client_id: &str,
        draft: &ServiceDraft,
    ) -> AppResult<ClientService> {
        let status = draft.status.unwrap_or(ServiceStatus::NotStarted);
        let now = Utc::now();
        Ok(ClientService {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            main_package_id: self.resolve_main_package(store, draft.main_package_id.as_deref())?,
            name: draft.name.trim().to_string(),
            start_date: draft.start_date,
            end_date: draft.end_date,
            status,
            price: draft.price,
            currency: draft.currency.clone(),
            assignees: draft.assignees.clone(),
            notes: draft.notes.clone(),
            completed_at: (status == ServiceStatus::Completed).then_some(now),
            created_at: now,
        })
    }

    fn synthesize_client(
        &self,
        store: &Store<'_>,
        lead: &Lead,
    ) -> AppResult<(Client, Vec<ServiceWithDeliverables>)> {
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4().to_string(),
            name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            company: lead.company.clone(),
            country: lead.country.clone(),
            status: ClientStatus::Active,
            sales_owner_id: lead.negotiator_id.clone(),
            sales_owners: lead.negotiator_id.iter().cloned().collect(),
            assigned_staff: Vec::new(),
            converted_from_lead_id: Some(lead.id.clone()),
            lead_created_at: Some(lead.created_at),
            notes: lead.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        let service = ClientService {
            id: Uuid::new_v4().to_string(),
            client_id: client.id.clone(),
            main_package_id: self.resolve_main_package(store, lead.main_package_id.as_deref())?,
            name: self.config.converted_service_name.clone(),
            start_date: now.date_naive(),
            end_date: None,
            status: ServiceStatus::NotStarted,
            price: lead.deal_value.or(lead.estimated_value).unwrap_or(0.0),
            currency: lead
                .deal_currency
                .clone()
                .or_else(|| lead.estimated_currency.clone())
                .unwrap_or_else(|| self.config.default_currency.clone()),
            assignees: Vec::new(),
            notes: lead.notes.clone(),
            completed_at: None,
            created_at: now,
        };
        Ok((
            client,
            vec![ServiceWithDeliverables {
                service,
                deliverables: Vec::new(),
            }],
        ))
    }
}

fn load_service_graph(store: &Store<'_>, client_id: &str) -> AppResult<Vec<ServiceWithDeliverables>> {
    store
        .list_services_for_client(client_id)?
        .into_iter()
        .map(|service| {
            let deliverables = store.list_deliverables_for_service(&service.id)?;
            Ok(ServiceWithDeliverables { service, deliverables })
        })
        .collect()
}

fn demoted_lead(client: &Client, services: &[ServiceWithDeliverables], blob: snapshot::SnapshotBlob) -> Lead {
    let now = Utc::now();
    let deal_currency = services.first().map(|entry| entry.service.currency.clone());
    // Only same-currency prices are summed; conversion happens elsewhere.
    let deal_value = deal_currency.as_ref().map(|currency| {
        services
            .iter()
            .filter(|entry| &entry.service.currency == currency)
            .map(|entry| entry.service.price)
            .sum::<f64>()
    });

    let digest = service_history_digest(services, now.date_naive());
    let notes = match client.notes.as_deref().map(str::trim) {
        Some(existing) if !existing.is_empty() => format!("{}\n\n{}", existing, digest),
        _ => digest,
    };

    Lead {
        id: Uuid::new_v4().to_string(),
        name: client.name.clone(),
        email: client.email.clone(),
        phone: client.phone.clone(),
        company: client.company.clone(),
        country: client.country.clone(),
        source: Some(CLIENT_CONVERSION_SOURCE.to_string()),
        stage: LeadStage::Negotiation,
        estimated_value: deal_value,
        estimated_currency: deal_currency.clone(),
        deal_value,
        deal_currency,
        main_package_id: services
            .iter()
            .find_map(|entry| entry.service.main_package_id.clone()),
        negotiator_id: client
            .sales_owner_id
            .clone()
            .or_else(|| client.sales_owners.first().cloned()),
        notes: Some(notes),
        was_confirmed_client: true,
        converted_from_client_id: Some(client.id.clone()),
        preserved_client_data: Some(blob),
        created_at: now,
        updated_at: now,
    }
}

fn service_history_digest(services: &[ServiceWithDeliverables], converted_on: NaiveDate) -> String {
    let mut lines = vec![format!("Service history at conversion to lead ({}):", converted_on)];
    if services.is_empty() {
        lines.push("- no services on record".to_string());
    }
    for entry in services {
        let service = &entry.service;
        let period = match service.end_date {
            Some(end_date) => format!("{} to {}", service.start_date, end_date),
            None => format!("{} to ongoing", service.start_date),
        };
        lines.push(format!(
            "- {} ({}): {} {}, {}",
            service.name,
            service.status.as_str(),
            format_amount(service.price),
            service.currency,
            period
        ));
    }
    lines.join("\n")
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
