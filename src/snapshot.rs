//! Snapshot codec for client demotion.
//!
//! A client demoted to a lead keeps its full service graph in
//! `leads.preserved_client_data`. The stored shape is a versioned, tagged
//! record owned by this module; nothing else reads it. The record structs are
//! separate from the live models: changing what a snapshot holds means adding
//! a new `PreservedClientData` variant.

use crate::errors::{AppError, AppResult};
use crate::models::{
    Client, ClientService, ClientStatus, DeliverableKind, Lead, ServiceDeliverable, ServiceStatus,
    ServiceWithDeliverables,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encoded snapshot as stored on the lead row. Opaque outside this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotBlob(String);

impl SnapshotBlob {
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum PreservedClientData {
    #[serde(rename = "1")]
    V1(SnapshotV1),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotV1 {
    pub captured_at: DateTime<Utc>,
    pub client: ClientRecordV1,
    pub services: Vec<ServiceRecordV1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecordV1 {
    pub original_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
    pub status: ClientStatus,
    pub sales_owner_id: Option<String>,
    pub sales_owners: Vec<String>,
    pub assigned_staff: Vec<String>,
    pub converted_from_lead_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecordV1 {
    pub original_id: String,
    pub main_package_id: Option<String>,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: ServiceStatus,
    pub price: f64,
    pub currency: String,
    pub assignees: Vec<String>,
    pub notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deliverables: Vec<DeliverableRecordV1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableRecordV1 {
    pub name: String,
    pub kind: DeliverableKind,
    pub target_count: i64,
    pub completed_count: i64,
}

/// Fresh rows materialized from a snapshot, ready to insert.
#[derive(Debug, Clone)]
pub struct RestoredClient {
    pub client: Client,
    pub services: Vec<ServiceWithDeliverables>,
}

pub fn capture(client: &Client, services: &[ServiceWithDeliverables]) -> PreservedClientData {
    PreservedClientData::V1(SnapshotV1 {
        captured_at: Utc::now(),
        client: ClientRecordV1 {
            original_id: client.id.clone(),
            name: client.name.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
            company: client.company.clone(),
            country: client.country.clone(),
            status: client.status,
            sales_owner_id: client.sales_owner_id.clone(),
            sales_owners: client.sales_owners.clone(),
            assigned_staff: client.assigned_staff.clone(),
            converted_from_lead_id: client.converted_from_lead_id.clone(),
            notes: client.notes.clone(),
            created_at: client.created_at,
        },
        services: services
            .iter()
            .map(|entry| ServiceRecordV1 {
                original_id: entry.service.id.clone(),
                main_package_id: entry.service.main_package_id.clone(),
                name: entry.service.name.clone(),
                start_date: entry.service.start_date,
                end_date: entry.service.end_date,
                status: entry.service.status,
                price: entry.service.price,
                currency: entry.service.currency.clone(),
                assignees: entry.service.assignees.clone(),
                notes: entry.service.notes.clone(),
                completed_at: entry.service.completed_at,
                deliverables: entry
                    .deliverables
                    .iter()
                    .map(|deliverable| DeliverableRecordV1 {
                        name: deliverable.name.clone(),
                        kind: deliverable.kind,
                        target_count: deliverable.target_count,
                        completed_count: deliverable.completed_count,
                    })
                    .collect(),
            })
            .collect(),
    })
}

pub fn encode(data: &PreservedClientData) -> AppResult<SnapshotBlob> {
    Ok(SnapshotBlob(serde_json::to_string(data)?))
}

pub fn decode(blob: &SnapshotBlob) -> AppResult<PreservedClientData> {
    serde_json::from_str::<PreservedClientData>(blob.as_str())
        .map_err(|error| AppError::SnapshotCorrupt(error.to_string()))
}

/// Rebuilds a client graph from the snapshot carried by `lead`. Every row gets
/// a new identity; the client comes back `active` and inherits the lead's
/// creation time as its pipeline age.
pub fn restore(blob: &SnapshotBlob, lead: &Lead) -> AppResult<RestoredClient> {
    let PreservedClientData::V1(snapshot) = decode(blob)?;
    check_required(&snapshot)?;

    let now = Utc::now();
    let client_id = Uuid::new_v4().to_string();
    let record = snapshot.client;
    let client = Client {
        id: client_id.clone(),
        name: record.name,
        email: record.email,
        phone: record.phone,
        company: record.company,
        country: record.country,
        status: ClientStatus::Active,
        sales_owner_id: record.sales_owner_id,
        sales_owners: record.sales_owners,
        assigned_staff: record.assigned_staff,
        converted_from_lead_id: Some(lead.id.clone()),
        lead_created_at: Some(lead.created_at),
        notes: record.notes,
        created_at: now,
        updated_at: now,
    };

    let services = snapshot
        .services
        .into_iter()
        .map(|entry| {
            let service_id = Uuid::new_v4().to_string();
            let deliverables = entry
                .deliverables
                .into_iter()
                .map(|deliverable| ServiceDeliverable {
                    id: Uuid::new_v4().to_string(),
                    service_id: service_id.clone(),
                    name: deliverable.name,
                    kind: deliverable.kind,
                    target_count: deliverable.target_count,
                    completed_count: deliverable.completed_count,
                    created_at: now,
                })
                .collect();
            ServiceWithDeliverables {
                service: ClientService {
                    id: service_id,
                    client_id: client_id.clone(),
                    main_package_id: entry.main_package_id,
                    name: entry.name,
                    start_date: entry.start_date,
                    end_date: entry.end_date,
                    status: entry.status,
                    price: entry.price,
                    currency: entry.currency,
                    assignees: entry.assignees,
                    notes: entry.notes,
                    completed_at: entry.completed_at,
                    created_at: now,
                },
                deliverables,
            }
        })
        .collect();

    Ok(RestoredClient { client, services })
}

fn check_required(snapshot: &SnapshotV1) -> AppResult<()> {
    if snapshot.client.name.trim().is_empty() {
        return Err(AppError::SnapshotCorrupt(format!(
            "client {} has no name",
            snapshot.client.original_id
        )));
    }
    for service in &snapshot.services {
        if service.name.trim().is_empty() {
            return Err(AppError::SnapshotCorrupt(format!(
                "service {} has no name",
                service.original_id
            )));
        }
        if service.currency.trim().is_empty() {
            return Err(AppError::SnapshotCorrupt(format!(
                "service {} has no currency",
                service.original_id
            )));
        }
        if !service.status.is_persistable() {
            return Err(AppError::SnapshotCorrupt(format!(
                "service {} carries computed status '{}'",
                service.original_id,
                service.status.as_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{capture, decode, encode, restore, PreservedClientData, SnapshotBlob};
    use crate::models::{
        Client, ClientService, ClientStatus, DeliverableKind, Lead, LeadStage, ServiceDeliverable,
        ServiceStatus, ServiceWithDeliverables,
    };
    use chrono::{Duration, NaiveDate, Utc};

    fn sample_client() -> Client {
        let now = Utc::now();
        Client {
            id: "client-1".to_string(),
            name: "Acme".to_string(),
            email: Some("ops@acme.test".to_string()),
            phone: None,
            company: Some("Acme Ltd".to_string()),
            country: Some("DE".to_string()),
            status: ClientStatus::OnHold,
            sales_owner_id: Some("emp-7".to_string()),
            sales_owners: vec!["emp-7".to_string()],
            assigned_staff: vec!["emp-2".to_string(), "emp-3".to_string()],
            converted_from_lead_id: None,
            lead_created_at: None,
            notes: Some("priority account".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_services() -> Vec<ServiceWithDeliverables> {
        vec![ServiceWithDeliverables {
            service: ClientService {
                id: "svc-1".to_string(),
                client_id: "client-1".to_string(),
                main_package_id: Some("pkg-1".to_string()),
                name: "SEO Package".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
                end_date: NaiveDate::from_ymd_opt(2024, 6, 30),
                status: ServiceStatus::InProgress,
                price: 500.0,
                currency: "USD".to_string(),
                assignees: vec!["emp-2".to_string()],
                notes: None,
                completed_at: None,
                created_at: Utc::now(),
            },
            deliverables: vec![ServiceDeliverable {
                id: "del-1".to_string(),
                service_id: "svc-1".to_string(),
                name: "Backlinks".to_string(),
                kind: DeliverableKind::Countable,
                target_count: 20,
                completed_count: 8,
                created_at: Utc::now(),
            }],
        }]
    }

    fn consuming_lead(blob: Option<SnapshotBlob>) -> Lead {
        let created = Utc::now() - Duration::days(30);
        Lead {
            id: "lead-9".to_string(),
            name: "Acme".to_string(),
            email: None,
            phone: None,
            company: None,
            country: None,
            source: None,
            stage: LeadStage::Negotiation,
            estimated_value: None,
            estimated_currency: None,
            deal_value: None,
            deal_currency: None,
            main_package_id: None,
            negotiator_id: None,
            notes: None,
            was_confirmed_client: true,
            converted_from_client_id: Some("client-1".to_string()),
            preserved_client_data: blob,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn restore_regenerates_ids_and_forces_active() {
        let blob = encode(&capture(&sample_client(), &sample_services())).expect("encode");
        let lead = consuming_lead(Some(blob.clone()));

        let restored = restore(&blob, &lead).expect("restore");
        assert_ne!(restored.client.id, "client-1");
        assert_eq!(restored.client.status, ClientStatus::Active);
        assert_eq!(restored.client.name, "Acme");
        assert_eq!(restored.client.assigned_staff.len(), 2);
        assert_eq!(restored.client.lead_created_at, Some(lead.created_at));
        assert_eq!(restored.client.converted_from_lead_id.as_deref(), Some("lead-9"));

        assert_eq!(restored.services.len(), 1);
        let entry = &restored.services[0];
        assert_ne!(entry.service.id, "svc-1");
        assert_eq!(entry.service.client_id, restored.client.id);
        assert_eq!(entry.service.status, ServiceStatus::InProgress);
        assert_eq!(entry.deliverables.len(), 1);
        assert_eq!(entry.deliverables[0].service_id, entry.service.id);
        assert_eq!(entry.deliverables[0].completed_count, 8);
    }

    #[test]
    fn snapshot_is_tagged_with_version() {
        let blob = encode(&capture(&sample_client(), &[])).expect("encode");
        let value: serde_json::Value = serde_json::from_str(blob.as_str()).expect("json");
        assert_eq!(value["version"], "1");
        assert!(matches!(decode(&blob).expect("decode"), PreservedClientData::V1(_)));
    }

    #[test]
    fn unknown_version_is_corrupt() {
        let blob = SnapshotBlob::from_stored(r#"{"version":"7","client":{}}"#.to_string());
        let error = restore(&blob, &consuming_lead(None)).expect_err("must fail");
        assert_eq!(error.code(), "SNAPSHOT_CORRUPT");
    }

    #[test]
    fn missing_required_fields_are_corrupt() {
        let blob = encode(&capture(&sample_client(), &sample_services())).expect("encode");
        let mut value: serde_json::Value = serde_json::from_str(blob.as_str()).expect("json");
        value["services"][0]
            .as_object_mut()
            .expect("service object")
            .remove("price");
        let damaged = SnapshotBlob::from_stored(value.to_string());
        let error = restore(&damaged, &consuming_lead(None)).expect_err("must fail");
        assert_eq!(error.code(), "SNAPSHOT_CORRUPT");
    }

    #[test]
    fn blank_client_name_is_corrupt() {
        let mut client = sample_client();
        client.name = "  ".to_string();
        let blob = encode(&capture(&client, &[])).expect("encode");
        let error = restore(&blob, &consuming_lead(None)).expect_err("must fail");
        assert_eq!(error.code(), "SNAPSHOT_CORRUPT");
    }

    #[test]
    fn garbage_text_is_corrupt() {
        let blob = SnapshotBlob::from_stored("not json".to_string());
        assert_eq!(decode(&blob).expect_err("must fail").code(), "SNAPSHOT_CORRUPT");
    }
}
