use async_trait::async_trait;

use crate::domain::account::models::Campaign;
use crate::domain::account::models::Integration;
use crate::domain::account::models::IntegrationMap;
use crate::domain::account::models::SetupStatus;
use crate::domain::account::models::Workspace;
use crate::domain::client::models::BillingEntry;
use crate::domain::client::models::Client;
use crate::domain::client::models::ClientCampaign;
use crate::domain::client::models::ClientId;
use crate::domain::client::models::ClientUpdate;
use crate::domain::client::models::OAuthCredential;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::Blob;
use crate::storage::errors::StorageError;

/// Persistence contract shared by every storage backend.
///
/// Single-entity lookups report absence as `Ok(None)`. Keyed writes are
/// upserts serialized by the datastore's unique constraints.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Insert a user, or update the one already registered under the email.
    ///
    /// # Arguments
    /// * `user` - Candidate row; its id and created_at are used only on insert
    ///
    /// # Returns
    /// The stored user: first writer's id and created_at, latest password
    /// hash and name
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn create_or_update_user_by_email(&self, user: NewUser) -> Result<User, StorageError>;

    /// Retrieve user by email address.
    ///
    /// # Arguments
    /// * `email` - Email in any case; normalized before the lookup
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    /// Retrieve user by identifier.
    ///
    /// # Arguments
    /// * `id` - User ID
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, StorageError>;

    /// Retrieve a user's onboarding state.
    ///
    /// # Returns
    /// Optional setup status (None before sign-up recorded one)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn get_setup_status(&self, user_id: &UserId)
        -> Result<Option<SetupStatus>, StorageError>;

    /// Replace a user's onboarding state.
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn save_setup_status(
        &self,
        user_id: &UserId,
        status: SetupStatus,
    ) -> Result<(), StorageError>;

    /// Retrieve a user's workspace.
    ///
    /// # Returns
    /// Optional workspace (None until setup completes)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn get_workspace(&self, user_id: &UserId) -> Result<Option<Workspace>, StorageError>;

    /// Replace a user's workspace.
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn save_workspace(
        &self,
        user_id: &UserId,
        workspace: Workspace,
    ) -> Result<(), StorageError>;

    /// Retrieve all integrations of a user.
    ///
    /// # Returns
    /// Nested mapping category -> provider -> data (empty if none)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn list_integrations(&self, user_id: &UserId) -> Result<IntegrationMap, StorageError>;

    /// Retrieve one integration's data.
    ///
    /// # Returns
    /// Optional data (None if not configured)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn get_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<Option<Blob>, StorageError>;

    /// Insert or replace an integration keyed by (user, category, provider).
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn upsert_integration(&self, integration: Integration) -> Result<(), StorageError>;

    /// Remove an integration. Removing an absent integration succeeds.
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn delete_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<(), StorageError>;

    /// Retrieve a user's campaigns.
    ///
    /// # Returns
    /// Campaigns in ascending creation order
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn list_campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, StorageError>;

    /// Insert a campaign, or replace the fields of the one with the same id.
    ///
    /// # Returns
    /// The stored campaign; owner and created_at come from the first insert
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn save_campaign(&self, campaign: Campaign) -> Result<Campaign, StorageError>;

    /// Retrieve every client.
    ///
    /// # Returns
    /// Clients in ascending creation order
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn list_clients(&self) -> Result<Vec<Client>, StorageError>;

    /// Insert or replace a client keyed by id.
    ///
    /// # Returns
    /// The stored client
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn create_client(&self, client: Client) -> Result<Client, StorageError>;

    /// Retrieve client by identifier.
    ///
    /// # Returns
    /// Optional client (None if not found)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StorageError>;

    /// Read, merge and write back a partial update.
    ///
    /// # Arguments
    /// * `id` - Client ID to update
    /// * `update` - Fields to replace; extra fields merge key by key
    ///
    /// # Returns
    /// Updated client, or None if the client does not exist
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn update_client(
        &self,
        id: &ClientId,
        update: ClientUpdate,
    ) -> Result<Option<Client>, StorageError>;

    /// Add token usage and cost to a client's running totals in one write.
    ///
    /// # Returns
    /// Updated client, or None if the client does not exist
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn increment_client_usage(
        &self,
        id: &ClientId,
        tokens_used: i64,
        cost: f64,
    ) -> Result<Option<Client>, StorageError>;

    /// Delete a client with its OAuth credentials, campaigns, billing ledger
    /// and admin memberships.
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn delete_client(&self, id: &ClientId) -> Result<(), StorageError>;

    /// Grant an admin access to a client. Granting twice is a no-op.
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn add_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError>;

    /// # Errors
    /// * `Database` - Database operation failed
    async fn remove_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError>;

    /// Retrieve the clients an admin manages.
    ///
    /// # Returns
    /// Client ids in ascending order
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn list_admin_clients(&self, admin_id: &UserId) -> Result<Vec<ClientId>, StorageError>;

    /// Insert or replace a credential keyed by (client, platform).
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn save_client_oauth(&self, credential: OAuthCredential) -> Result<(), StorageError>;

    /// # Returns
    /// Optional credential (None if the platform is not connected)
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn get_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<Option<OAuthCredential>, StorageError>;

    /// # Errors
    /// * `Database` - Database operation failed
    async fn delete_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<(), StorageError>;

    /// Retrieve a client's campaigns.
    ///
    /// # Returns
    /// Campaigns in ascending id order
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn list_client_campaigns(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ClientCampaign>, StorageError>;

    /// Replace a client's whole campaign set. An empty set leaves no rows.
    ///
    /// # Arguments
    /// * `client_id` - Owner of the set
    /// * `campaigns` - New set; each campaign is re-owned by `client_id`
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn save_client_campaigns(
        &self,
        client_id: &ClientId,
        campaigns: Vec<ClientCampaign>,
    ) -> Result<(), StorageError>;

    /// Append a row to a client's billing ledger.
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn append_billing_entry(
        &self,
        client_id: &ClientId,
        entry: BillingEntry,
    ) -> Result<(), StorageError>;

    /// Retrieve a client's billing ledger.
    ///
    /// # Returns
    /// Entries in ascending timestamp order, ties in insertion order
    ///
    /// # Errors
    /// * `Database` - Database operation failed
    async fn list_billing_entries(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<BillingEntry>, StorageError>;
}

#[cfg(test)]
pub mod mocks {
    use mockall::mock;

    use super::*;

    mock! {
        pub Storage {}

        #[async_trait]
        impl StorageAdapter for Storage {
            async fn create_or_update_user_by_email(&self, user: NewUser) -> Result<User, StorageError>;
            async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;
            async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, StorageError>;
            async fn get_setup_status(&self, user_id: &UserId) -> Result<Option<SetupStatus>, StorageError>;
            async fn save_setup_status(&self, user_id: &UserId, status: SetupStatus) -> Result<(), StorageError>;
            async fn get_workspace(&self, user_id: &UserId) -> Result<Option<Workspace>, StorageError>;
            async fn save_workspace(&self, user_id: &UserId, workspace: Workspace) -> Result<(), StorageError>;
            async fn list_integrations(&self, user_id: &UserId) -> Result<IntegrationMap, StorageError>;
            async fn get_integration(&self, user_id: &UserId, category: &str, provider: &str) -> Result<Option<Blob>, StorageError>;
            async fn upsert_integration(&self, integration: Integration) -> Result<(), StorageError>;
            async fn delete_integration(&self, user_id: &UserId, category: &str, provider: &str) -> Result<(), StorageError>;
            async fn list_campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, StorageError>;
            async fn save_campaign(&self, campaign: Campaign) -> Result<Campaign, StorageError>;
            async fn list_clients(&self) -> Result<Vec<Client>, StorageError>;
            async fn create_client(&self, client: Client) -> Result<Client, StorageError>;
            async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StorageError>;
            async fn update_client(&self, id: &ClientId, update: ClientUpdate) -> Result<Option<Client>, StorageError>;
            async fn increment_client_usage(&self, id: &ClientId, tokens_used: i64, cost: f64) -> Result<Option<Client>, StorageError>;
            async fn delete_client(&self, id: &ClientId) -> Result<(), StorageError>;
            async fn add_admin_client(&self, admin_id: &UserId, client_id: &ClientId) -> Result<(), StorageError>;
            async fn remove_admin_client(&self, admin_id: &UserId, client_id: &ClientId) -> Result<(), StorageError>;
            async fn list_admin_clients(&self, admin_id: &UserId) -> Result<Vec<ClientId>, StorageError>;
            async fn save_client_oauth(&self, credential: OAuthCredential) -> Result<(), StorageError>;
            async fn get_client_oauth(&self, client_id: &ClientId, platform: &str) -> Result<Option<OAuthCredential>, StorageError>;
            async fn delete_client_oauth(&self, client_id: &ClientId, platform: &str) -> Result<(), StorageError>;
            async fn list_client_campaigns(&self, client_id: &ClientId) -> Result<Vec<ClientCampaign>, StorageError>;
            async fn save_client_campaigns(&self, client_id: &ClientId, campaigns: Vec<ClientCampaign>) -> Result<(), StorageError>;
            async fn append_billing_entry(&self, client_id: &ClientId, entry: BillingEntry) -> Result<(), StorageError>;
            async fn list_billing_entries(&self, client_id: &ClientId) -> Result<Vec<BillingEntry>, StorageError>;
        }
    }
}
