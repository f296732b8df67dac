use std::sync::Arc;

use crate::domain::account::errors::AccountError;
use crate::domain::account::models::Campaign;
use crate::domain::account::models::Integration;
use crate::domain::account::models::IntegrationMap;
use crate::domain::account::models::SetupStatus;
use crate::domain::account::models::Workspace;
use crate::domain::storage::ports::StorageAdapter;
use crate::domain::timestamp_now;
use crate::domain::user::models::UserId;
use crate::domain::Blob;

/// Onboarding, integrations and campaigns of a signed-in user.
pub struct AccountService {
    storage: Arc<dyn StorageAdapter>,
}

impl AccountService {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Record a pending setup for a freshly registered user.
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn initialize_setup(&self, user_id: &UserId) -> Result<(), AccountError> {
        self.storage
            .save_setup_status(user_id, SetupStatus::pending())
            .await?;
        Ok(())
    }

    /// Retrieve a user's onboarding state.
    ///
    /// # Returns
    /// Stored status, or a pending one if none was recorded
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn setup_status(&self, user_id: &UserId) -> Result<SetupStatus, AccountError> {
        Ok(self
            .storage
            .get_setup_status(user_id)
            .await?
            .unwrap_or_else(SetupStatus::pending))
    }

    /// Finish onboarding and create the default workspace.
    ///
    /// # Arguments
    /// * `user_id` - User completing setup
    /// * `setup_data` - Answers collected during onboarding
    ///
    /// # Returns
    /// The created workspace
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn complete_setup(
        &self,
        user_id: &UserId,
        setup_data: Blob,
    ) -> Result<Workspace, AccountError> {
        let now = timestamp_now();

        self.storage
            .save_setup_status(user_id, SetupStatus::completed(setup_data, now))
            .await?;

        let workspace = Workspace::default_for(user_id, now);
        self.storage
            .save_workspace(user_id, workspace.clone())
            .await?;

        tracing::info!(user_id = %user_id, workspace_id = %workspace.id, "Setup completed");

        Ok(workspace)
    }

    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn workspace(&self, user_id: &UserId) -> Result<Option<Workspace>, AccountError> {
        Ok(self.storage.get_workspace(user_id).await?)
    }

    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn integrations(&self, user_id: &UserId) -> Result<IntegrationMap, AccountError> {
        Ok(self.storage.list_integrations(user_id).await?)
    }

    /// Retrieve one integration's data.
    ///
    /// # Errors
    /// * `IntegrationNotFound` - The integration is not configured
    /// * `Storage` - Storage operation failed
    pub async fn integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<Blob, AccountError> {
        self.storage
            .get_integration(user_id, category, provider)
            .await?
            .ok_or_else(|| AccountError::IntegrationNotFound {
                category: category.to_string(),
                provider: provider.to_string(),
            })
    }

    /// Connect or reconfigure an integration.
    ///
    /// # Returns
    /// The stored data, stamped with `connectedAt` and `status`
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn connect_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
        data: Blob,
    ) -> Result<Blob, AccountError> {
        let integration =
            Integration::connected(user_id.clone(), category, provider, data, timestamp_now());
        let data = integration.data.clone();

        self.storage.upsert_integration(integration).await?;
        tracing::info!(user_id = %user_id, category, provider, "Integration connected");

        Ok(data)
    }

    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn disconnect_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<(), AccountError> {
        self.storage
            .delete_integration(user_id, category, provider)
            .await?;
        tracing::info!(user_id = %user_id, category, provider, "Integration disconnected");
        Ok(())
    }

    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, AccountError> {
        Ok(self.storage.list_campaigns(user_id).await?)
    }

    /// Create a campaign from free-form fields.
    ///
    /// # Returns
    /// The stored campaign with a generated id
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn create_campaign(
        &self,
        user_id: &UserId,
        fields: Blob,
    ) -> Result<Campaign, AccountError> {
        let created_at = timestamp_now();
        let campaign = Campaign {
            id: Campaign::generate_id(created_at),
            user_id: user_id.clone(),
            created_at,
            fields,
        };

        Ok(self.storage.save_campaign(campaign).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::storage::ports::mocks::MockStorage;

    #[tokio::test]
    async fn test_setup_status_defaults_to_pending() {
        let mut storage = MockStorage::new();
        storage
            .expect_get_setup_status()
            .times(1)
            .returning(|_| Ok(None));

        let service = AccountService::new(Arc::new(storage));

        let status = service
            .setup_status(&UserId::from_string("u1"))
            .await
            .unwrap();
        assert_eq!(status, SetupStatus::pending());
    }

    #[tokio::test]
    async fn test_complete_setup() {
        let mut storage = MockStorage::new();
        storage
            .expect_save_setup_status()
            .withf(|user_id, status| {
                user_id.as_str() == "u1"
                    && status.is_setup_complete
                    && status.completed_at.is_some()
                    && status.setup_data.as_ref().map(|d| d["goal"] == "leads") == Some(true)
            })
            .times(1)
            .returning(|_, _| Ok(()));
        storage
            .expect_save_workspace()
            .withf(|user_id, workspace| {
                user_id.as_str() == "u1"
                    && workspace.id.starts_with("ws_u1_")
                    && workspace.name == "Default Workspace"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = AccountService::new(Arc::new(storage));

        let mut setup_data = Blob::new();
        setup_data.insert("goal".to_string(), json!("leads"));

        let workspace = service
            .complete_setup(&UserId::from_string("u1"), setup_data)
            .await
            .unwrap();
        assert_eq!(
            workspace.id,
            format!("ws_u1_{}", workspace.created_at.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_connect_integration_stamps_data() {
        let mut storage = MockStorage::new();
        storage
            .expect_upsert_integration()
            .withf(|integration| {
                integration.category == "ads"
                    && integration.provider == "meta"
                    && integration.data["status"] == "connected"
                    && integration.data["accountId"] == "act_1"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = AccountService::new(Arc::new(storage));

        let mut data = Blob::new();
        data.insert("accountId".to_string(), json!("act_1"));

        let stored = service
            .connect_integration(&UserId::from_string("u1"), "ads", "meta", data)
            .await
            .unwrap();
        assert!(stored["connectedAt"].is_string());
    }

    #[tokio::test]
    async fn test_missing_integration() {
        let mut storage = MockStorage::new();
        storage
            .expect_get_integration()
            .times(1)
            .returning(|_, _, _| Ok(None));

        let service = AccountService::new(Arc::new(storage));

        let result = service
            .integration(&UserId::from_string("u1"), "ads", "meta")
            .await;
        assert!(matches!(
            result,
            Err(AccountError::IntegrationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_campaign() {
        let mut storage = MockStorage::new();
        storage
            .expect_save_campaign()
            .times(1)
            .returning(|campaign| Ok(campaign));

        let service = AccountService::new(Arc::new(storage));

        let mut fields = Blob::new();
        fields.insert("name".to_string(), json!("Launch"));

        let campaign = service
            .create_campaign(&UserId::from_string("u1"), fields)
            .await
            .unwrap();
        assert!(campaign.id.starts_with("camp_"));
        assert_eq!(campaign.user_id.as_str(), "u1");
        assert_eq!(campaign.fields["name"], "Launch");
    }
}
