//! Handler surface for UI callers. Entity ids are checked here, draft checks
//! live in the engine, blocking store work runs off the async executor, and
//! every failure reaches the caller as a `"CODE: message"` string.

use crate::errors::AppResult;
use crate::lifecycle::LifecycleEngine;
use crate::models::{
    Client, ClientDraft, ClientWithService, DeleteClientResponse, Lead, ServiceDraft,
};
use crate::{to_client_error, validation};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LifecycleApi {
    engine: Arc<LifecycleEngine>,
}

impl LifecycleApi {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    pub async fn convert_lead(&self, lead_id: String) -> Result<Client, String> {
        let lead_id = validation::entity_id("lead", &lead_id).map_err(to_client_error)?;
        self.run_blocking(move |engine| engine.convert_lead_to_client(&lead_id))
            .await
    }

    pub async fn convert_client(&self, client_id: String) -> Result<Lead, String> {
        let client_id = validation::entity_id("client", &client_id).map_err(to_client_error)?;
        self.run_blocking(move |engine| engine.convert_client_to_lead(&client_id))
            .await
    }

    /// First call archives; deleting an already archived client removes it.
    pub async fn delete_client(&self, client_id: String) -> Result<DeleteClientResponse, String> {
        let client_id = validation::entity_id("client", &client_id).map_err(to_client_error)?;
        self.run_blocking(move |engine| {
            let outcome = engine.archive_or_delete_client(&client_id)?;
            Ok(DeleteClientResponse { client_id, outcome })
        })
        .await
    }

    pub async fn create_client_with_service(
        &self,
        client: ClientDraft,
        service: ServiceDraft,
    ) -> Result<ClientWithService, String> {
        self.run_blocking(move |engine| engine.create_client_with_service(client, service))
            .await
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&LifecycleEngine) -> AppResult<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        match tokio::task::spawn_blocking(move || work(engine.as_ref())).await {
            Ok(result) => result.map_err(to_client_error),
            Err(error) => Err(to_client_error(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleApi;
    use crate::config::{DefaultPackagePolicy, LifecycleConfig};
    use crate::lifecycle::LifecycleEngine;
    use crate::models::{ClientDraft, ClientStatus, DeleteClientOutcome, ServiceDraft};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn api() -> (TempDir, LifecycleApi) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LifecycleConfig {
            database_path: dir.path().join("api.db"),
            default_package_policy: DefaultPackagePolicy::AllowNull,
            ..LifecycleConfig::default()
        };
        let engine = LifecycleEngine::new(config).expect("engine");
        (dir, LifecycleApi::new(Arc::new(engine)))
    }

    fn drafts() -> (ClientDraft, ServiceDraft) {
        (
            ClientDraft {
                name: "Umbrella".to_string(),
                ..ClientDraft::default()
            },
            ServiceDraft {
                main_package_id: None,
                name: "Social".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 5, 1).expect("date"),
                end_date: None,
                status: None,
                price: 300.0,
                currency: "EUR".to_string(),
                assignees: vec![],
                notes: None,
            },
        )
    }

    #[tokio::test]
    async fn delete_archives_first_then_removes() {
        let (_dir, api) = api();
        let (client, service) = drafts();
        let created = api.create_client_with_service(client, service).await.expect("create");
        let id = created.client.id.clone();

        let first = api.delete_client(id.clone()).await.expect("archive");
        assert_eq!(first.outcome, DeleteClientOutcome::Archived);
        let stored = api.engine().get_client(&id).expect("get").expect("still there");
        assert_eq!(stored.status, ClientStatus::Archived);

        let second = api.delete_client(id.clone()).await.expect("delete");
        assert_eq!(second.outcome, DeleteClientOutcome::Deleted);
        assert!(api.engine().get_client(&id).expect("get").is_none());
        assert!(api.engine().audit_integrity().expect("audit").is_clean());
    }

    #[tokio::test]
    async fn failures_surface_as_coded_strings() {
        let (_dir, api) = api();
        let error = api.convert_lead("no-such-lead".to_string()).await.expect_err("missing");
        assert!(error.starts_with("NOT_FOUND:"), "{}", error);

        let error = api.convert_client("   ".to_string()).await.expect_err("blank id");
        assert!(error.starts_with("VALIDATION_FAILURE:"), "{}", error);

        let (client, mut service) = drafts();
        service.currency = "euro".to_string();
        let error = api
            .create_client_with_service(client, service)
            .await
            .expect_err("bad currency");
        assert!(error.starts_with("VALIDATION_FAILURE:"), "{}", error);
    }

    #[tokio::test]
    async fn round_trip_through_handlers() {
        let (_dir, api) = api();
        let (client, service) = drafts();
        let created = api.create_client_with_service(client, service).await.expect("create");

        let lead = api.convert_client(created.client.id.clone()).await.expect("demote");
        assert!(lead.was_confirmed_client);
        let restored = api.convert_lead(lead.id.clone()).await.expect("promote");
        assert_eq!(restored.name, "Umbrella");
        assert_eq!(restored.converted_from_lead_id.as_deref(), Some(lead.id.as_str()));
    }
}
