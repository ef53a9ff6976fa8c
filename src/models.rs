use crate::snapshot::SnapshotBlob;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    New,
    Contacted,
    ProposalSent,
    Negotiation,
    Won,
    Lost,
}

impl LeadStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::ProposalSent => "proposal_sent",
            Self::Negotiation => "negotiation",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "proposal_sent" => Some(Self::ProposalSent),
            "negotiation" => Some(Self::Negotiation),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Active,
    OnHold,
    Completed,
    Archived,
}

impl ClientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "on_hold" => Some(Self::OnHold),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Status-only moves on a client. Deletion and conversion are not transitions:
/// they remove the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientTransition {
    Archive,
    Restore,
    Reactivate,
    MarkCompleted,
}

impl ClientTransition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Archive => "archive_client",
            Self::Restore => "restore_client",
            Self::Reactivate => "reactivate_client",
            Self::MarkCompleted => "mark_client_completed",
        }
    }

    pub fn target(self) -> ClientStatus {
        match self {
            Self::Archive => ClientStatus::Archived,
            Self::Restore | Self::Reactivate => ClientStatus::Active,
            Self::MarkCompleted => ClientStatus::Completed,
        }
    }

    pub fn allowed_from(self, current: ClientStatus) -> bool {
        matches!(
            (self, current),
            (Self::Archive, ClientStatus::Active | ClientStatus::OnHold | ClientStatus::Completed)
                | (Self::Restore, ClientStatus::Archived)
                | (Self::Reactivate, ClientStatus::Completed)
                | (Self::MarkCompleted, ClientStatus::Active | ClientStatus::OnHold)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    NotStarted,
    InProgress,
    Completed,
    OnHold,
    /// Never persisted; derived by [`ClientService::effective_status`].
    Delayed,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
            Self::Delayed => "delayed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "on_hold" => Some(Self::OnHold),
            "delayed" => Some(Self::Delayed),
            _ => None,
        }
    }

    pub fn is_persistable(self) -> bool {
        !matches!(self, Self::Delayed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableKind {
    Countable,
    Boolean,
}

impl DeliverableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Countable => "countable",
            Self::Boolean => "boolean",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "countable" => Some(Self::Countable),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
    pub source: Option<String>,
    pub stage: LeadStage,
    pub estimated_value: Option<f64>,
    pub estimated_currency: Option<String>,
    pub deal_value: Option<f64>,
    pub deal_currency: Option<String>,
    pub main_package_id: Option<String>,
    pub negotiator_id: Option<String>,
    pub notes: Option<String>,
    pub was_confirmed_client: bool,
    pub converted_from_client_id: Option<String>,
    #[serde(skip_serializing)]
    pub preserved_client_data: Option<SnapshotBlob>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn has_preserved_client_data(&self) -> bool {
        self.preserved_client_data.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
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
    pub lead_created_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientService {
    pub id: String,
    pub client_id: String,
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
    pub created_at: DateTime<Utc>,
}

impl ClientService {
    /// `delayed` is computed: the end date has passed and the work is not done.
    pub fn effective_status(&self, today: NaiveDate) -> ServiceStatus {
        match (self.status, self.end_date) {
            (ServiceStatus::Completed, _) => ServiceStatus::Completed,
            (status, Some(end_date)) if end_date < today && status != ServiceStatus::OnHold => {
                ServiceStatus::Delayed
            }
            (status, _) => status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeliverable {
    pub id: String,
    pub service_id: String,
    pub name: String,
    pub kind: DeliverableKind,
    pub target_count: i64,
    pub completed_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceWithDeliverables {
    pub service: ClientService,
    pub deliverables: Vec<ServiceDeliverable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPayment {
    pub id: String,
    pub client_id: String,
    pub service_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceTransaction {
    pub id: String,
    pub client_id: Option<String>,
    pub service_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: f64,
    pub currency: String,
    pub occurred_on: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub client_id: Option<String>,
    pub service_id: Option<String>,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub client_id: String,
    pub number: String,
    pub amount: f64,
    pub currency: String,
    pub issued_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUser {
    pub id: String,
    pub client_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkActivityLog {
    pub id: String,
    pub service_id: String,
    pub user_id: String,
    pub description: String,
    pub minutes: i64,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReport {
    pub id: String,
    pub service_id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainPackage {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientWithService {
    pub client: Client,
    pub service: ClientService,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    pub client: Client,
    pub services: Vec<ClientService>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadPayload {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
    pub source: Option<String>,
    pub stage: Option<LeadStage>,
    pub estimated_value: Option<f64>,
    pub estimated_currency: Option<String>,
    pub deal_value: Option<f64>,
    pub deal_currency: Option<String>,
    pub main_package_id: Option<String>,
    pub negotiator_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientDraft {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
    pub sales_owner_id: Option<String>,
    #[serde(default)]
    pub sales_owners: Vec<String>,
    #[serde(default)]
    pub assigned_staff: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDraft {
    pub main_package_id: Option<String>,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: Option<ServiceStatus>,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableDraft {
    pub name: String,
    pub kind: DeliverableKind,
    pub target_count: i64,
    #[serde(default)]
    pub completed_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentPayload {
    pub client_id: String,
    pub service_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTransactionPayload {
    pub client_id: Option<String>,
    pub service_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: f64,
    pub currency: String,
    pub occurred_on: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEventPayload {
    pub client_id: Option<String>,
    pub service_id: Option<String>,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueInvoicePayload {
    pub client_id: String,
    pub number: String,
    pub amount: f64,
    pub currency: String,
    pub issued_on: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteClientResponse {
    pub client_id: String,
    pub outcome: DeleteClientOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteClientOutcome {
    Archived,
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::{ClientService, ClientStatus, ClientTransition, ServiceStatus};
    use chrono::{NaiveDate, Utc};

    fn service(status: ServiceStatus, end_date: Option<NaiveDate>) -> ClientService {
        ClientService {
            id: "svc-1".to_string(),
            client_id: "client-1".to_string(),
            main_package_id: None,
            name: "SEO Package".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            end_date,
            status,
            price: 500.0,
            currency: "USD".to_string(),
            assignees: vec![],
            notes: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn transitions_follow_the_status_machine() {
        assert!(ClientTransition::Archive.allowed_from(ClientStatus::Active));
        assert!(ClientTransition::Restore.allowed_from(ClientStatus::Archived));
        assert!(ClientTransition::MarkCompleted.allowed_from(ClientStatus::Active));
        assert!(ClientTransition::Reactivate.allowed_from(ClientStatus::Completed));
        assert!(!ClientTransition::Restore.allowed_from(ClientStatus::Completed));
        assert!(!ClientTransition::Reactivate.allowed_from(ClientStatus::Archived));
        assert!(!ClientTransition::MarkCompleted.allowed_from(ClientStatus::Archived));
        assert_eq!(ClientTransition::Reactivate.target(), ClientStatus::Active);
    }

    #[test]
    fn delayed_is_derived_from_end_date() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).expect("date");
        let overdue = service(ServiceStatus::InProgress, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(overdue.effective_status(today), ServiceStatus::Delayed);

        let done = service(ServiceStatus::Completed, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(done.effective_status(today), ServiceStatus::Completed);

        let open_ended = service(ServiceStatus::NotStarted, None);
        assert_eq!(open_ended.effective_status(today), ServiceStatus::NotStarted);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            ClientStatus::Active,
            ClientStatus::OnHold,
            ClientStatus::Completed,
            ClientStatus::Archived,
        ] {
            assert_eq!(ClientStatus::parse(status.as_str()), Some(status));
        }
        assert!(ServiceStatus::parse("delayed").is_some());
        assert!(!ServiceStatus::Delayed.is_persistable());
    }
}
