use std::sync::Arc;

use serde_json::Value;

use crate::domain::client::errors::ClientError;
use crate::domain::client::models::BillingEntry;
use crate::domain::client::models::Client;
use crate::domain::client::models::ClientCampaign;
use crate::domain::client::models::ClientId;
use crate::domain::client::models::ClientPlan;
use crate::domain::client::models::ClientUpdate;
use crate::domain::client::models::OAuthCredential;
use crate::domain::storage::ports::StorageAdapter;
use crate::domain::timestamp_now;
use crate::domain::user::models::UserId;
use crate::domain::Blob;

/// Fresh ids drawn before giving up on a crowded id space.
const CLIENT_ID_ATTEMPTS: usize = 5;

/// Managed-client lifecycle on behalf of an admin user.
pub struct ClientService {
    storage: Arc<dyn StorageAdapter>,
}

impl ClientService {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Create a client on a trial and grant the creating admin access.
    ///
    /// # Arguments
    /// * `admin_id` - Admin creating the client
    /// * `plan` - Plan name; decides the token allowance
    /// * `fields` - Descriptive fields (name, industry, ...)
    ///
    /// # Returns
    /// The stored client
    ///
    /// # Errors
    /// * `IdUnavailable` - Every generated id was already taken
    /// * `Storage` - Storage operation failed
    pub async fn create_client(
        &self,
        admin_id: &UserId,
        plan: &str,
        mut fields: Blob,
    ) -> Result<Client, ClientError> {
        fields.insert("plan".to_string(), Value::String(plan.to_string()));
        fields.insert("createdBy".to_string(), Value::String(admin_id.to_string()));

        let mut client = Client::on_trial(ClientPlan::from_name(plan), fields, timestamp_now());
        let mut attempt = 1;
        while self.storage.get_client(&client.id).await?.is_some() {
            if attempt == CLIENT_ID_ATTEMPTS {
                return Err(ClientError::IdUnavailable(attempt));
            }
            tracing::debug!(client_id = %client.id, "Generated client id already taken");
            client.id = ClientId::new();
            attempt += 1;
        }
        let client = self.storage.create_client(client).await?;
        self.storage.add_admin_client(admin_id, &client.id).await?;

        tracing::info!(client_id = %client.id, admin_id = %admin_id, "Client created");

        Ok(client)
    }

    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn list_clients(&self) -> Result<Vec<Client>, ClientError> {
        Ok(self.storage.list_clients().await?)
    }

    /// Retrieve the clients an admin manages, skipping memberships whose
    /// client no longer exists.
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn admin_clients(&self, admin_id: &UserId) -> Result<Vec<Client>, ClientError> {
        let mut clients = Vec::new();
        for client_id in self.storage.list_admin_clients(admin_id).await? {
            if let Some(client) = self.storage.get_client(&client_id).await? {
                clients.push(client);
            }
        }
        Ok(clients)
    }

    /// # Errors
    /// * `NotFound` - Client does not exist
    /// * `Storage` - Storage operation failed
    pub async fn get_client(&self, client_id: &ClientId) -> Result<Client, ClientError> {
        self.storage
            .get_client(client_id)
            .await?
            .ok_or_else(|| ClientError::NotFound(client_id.to_string()))
    }

    /// Apply a partial update and stamp who made it.
    ///
    /// # Errors
    /// * `NotFound` - Client does not exist
    /// * `Storage` - Storage operation failed
    pub async fn update_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
        mut update: ClientUpdate,
    ) -> Result<Client, ClientError> {
        update.fields.insert(
            "updatedAt".to_string(),
            Value::String(timestamp_now().to_rfc3339()),
        );
        update
            .fields
            .insert("updatedBy".to_string(), Value::String(admin_id.to_string()));

        self.storage
            .update_client(client_id, update)
            .await?
            .ok_or_else(|| ClientError::NotFound(client_id.to_string()))
    }

    /// Delete a client and everything scoped to it.
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn delete_client(&self, client_id: &ClientId) -> Result<(), ClientError> {
        self.storage.delete_client(client_id).await?;
        tracing::info!(client_id = %client_id, "Client deleted");
        Ok(())
    }

    /// Store an OAuth credential and mark the platform as connected.
    ///
    /// # Arguments
    /// * `admin_id` - Admin connecting the platform
    /// * `client_id` - Client granting access
    /// * `platform` - Platform name (google, meta, ...)
    /// * `data` - Tokens and metadata returned by the provider
    ///
    /// # Returns
    /// The client with the platform in its connected accounts
    ///
    /// # Errors
    /// * `NotFound` - Client does not exist
    /// * `Storage` - Storage operation failed
    pub async fn connect_oauth(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
        platform: &str,
        data: Blob,
    ) -> Result<Client, ClientError> {
        let mut client = self.get_client(client_id).await?;

        self.storage
            .save_client_oauth(OAuthCredential {
                client_id: client_id.clone(),
                platform: platform.to_string(),
                data,
                connected_at: timestamp_now(),
                connected_by: admin_id.clone(),
            })
            .await?;

        if !client.connect_account(platform) {
            return Ok(client);
        }

        let update = ClientUpdate {
            connected_accounts: Some(client.connected_accounts),
            ..Default::default()
        };
        let client = self.update_client(admin_id, client_id, update).await?;

        tracing::info!(client_id = %client_id, platform, "OAuth platform connected");

        Ok(client)
    }

    /// Remove an OAuth credential and unmark the platform.
    ///
    /// # Errors
    /// * `NotFound` - Client does not exist
    /// * `Storage` - Storage operation failed
    pub async fn disconnect_oauth(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<Client, ClientError> {
        let mut client = self.get_client(client_id).await?;

        self.storage.delete_client_oauth(client_id, platform).await?;

        if !client.disconnect_account(platform) {
            return Ok(client);
        }

        let update = ClientUpdate {
            connected_accounts: Some(client.connected_accounts),
            ..Default::default()
        };
        let client = self.update_client(admin_id, client_id, update).await?;

        tracing::info!(client_id = %client_id, platform, "OAuth platform disconnected");

        Ok(client)
    }

    /// # Returns
    /// The stored credential, or None if the platform is not connected
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn oauth_credential(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<Option<OAuthCredential>, ClientError> {
        Ok(self.storage.get_client_oauth(client_id, platform).await?)
    }

    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn campaigns(&self, client_id: &ClientId) -> Result<Vec<ClientCampaign>, ClientError> {
        Ok(self.storage.list_client_campaigns(client_id).await?)
    }

    /// Replace a client's campaign set.
    ///
    /// # Errors
    /// * `NotFound` - Client does not exist
    /// * `Storage` - Storage operation failed
    pub async fn replace_campaigns(
        &self,
        client_id: &ClientId,
        campaigns: Vec<ClientCampaign>,
    ) -> Result<Vec<ClientCampaign>, ClientError> {
        self.get_client(client_id).await?;

        self.storage
            .save_client_campaigns(client_id, campaigns)
            .await?;

        Ok(self.storage.list_client_campaigns(client_id).await?)
    }

    /// Charge token usage to a client and append it to the ledger.
    ///
    /// # Arguments
    /// * `admin_id` - Admin the usage is billed through
    /// * `client_id` - Client consuming the tokens
    /// * `tokens_used` - Tokens consumed, not negative
    /// * `cost` - Cost of the usage, not negative
    ///
    /// # Returns
    /// The client with accumulated usage
    ///
    /// # Errors
    /// * `InvalidUsage` - Negative tokens or cost
    /// * `NotFound` - Client does not exist
    /// * `Storage` - Storage operation failed
    pub async fn record_token_usage(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
        tokens_used: i64,
        cost: f64,
    ) -> Result<Client, ClientError> {
        if tokens_used < 0 || cost < 0.0 || cost.is_nan() {
            return Err(ClientError::InvalidUsage(format!(
                "tokens_used={}, cost={}",
                tokens_used, cost
            )));
        }

        self.storage
            .increment_client_usage(client_id, tokens_used, cost)
            .await?
            .ok_or_else(|| ClientError::NotFound(client_id.to_string()))?;
        let client = self
            .update_client(admin_id, client_id, ClientUpdate::default())
            .await?;

        self.storage
            .append_billing_entry(
                client_id,
                BillingEntry {
                    timestamp: timestamp_now(),
                    tokens_used,
                    cost,
                    admin_id: admin_id.clone(),
                },
            )
            .await?;

        if client.tokens_used > client.tokens_limit {
            tracing::warn!(
                client_id = %client_id,
                tokens_used = client.tokens_used,
                tokens_limit = client.tokens_limit,
                "Client exceeded its token allowance"
            );
        }

        Ok(client)
    }

    /// # Returns
    /// Ledger entries in ascending timestamp order
    ///
    /// # Errors
    /// * `Storage` - Storage operation failed
    pub async fn billing_history(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<BillingEntry>, ClientError> {
        Ok(self.storage.list_billing_entries(client_id).await?)
    }
}
