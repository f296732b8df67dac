use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use tokio::sync::RwLock;

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
use crate::domain::storage::errors::StorageError;
use crate::domain::storage::ports::StorageAdapter;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::Blob;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    users_by_email: HashMap<String, UserId>,
    setup: HashMap<UserId, SetupStatus>,
    workspaces: HashMap<UserId, Workspace>,
    integrations: BTreeMap<(UserId, String, String), Blob>,
    campaigns: HashMap<String, Campaign>,
    clients: HashMap<ClientId, Client>,
    admin_clients: BTreeSet<(UserId, ClientId)>,
    client_oauth: HashMap<(ClientId, String), OAuthCredential>,
    client_campaigns: HashMap<ClientId, Vec<ClientCampaign>>,
    billing: HashMap<ClientId, Vec<BillingEntry>>,
}

/// Process-local storage backend.
///
/// Each call holds the lock for its whole body, so every operation,
/// including the cascading delete, is atomic.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorage {
    async fn create_or_update_user_by_email(&self, user: NewUser) -> Result<User, StorageError> {
        let mut tables = self.tables.write().await;
        let email = user.email.as_str().to_string();

        if let Some(id) = tables.users_by_email.get(&email).cloned() {
            if let Some(existing) = tables.users.get_mut(&id) {
                existing.password_hash = user.password_hash;
                existing.name = user.name;
                return Ok(existing.clone());
            }
        }

        let user = user.into_user();
        tables.users_by_email.insert(email, user.id.clone());
        tables.users.insert(user.id.clone(), user.clone());

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let tables = self.tables.read().await;

        Ok(tables
            .users_by_email
            .get(&EmailAddress::normalize(email))
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, StorageError> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn get_setup_status(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SetupStatus>, StorageError> {
        Ok(self.tables.read().await.setup.get(user_id).cloned())
    }

    async fn save_setup_status(
        &self,
        user_id: &UserId,
        status: SetupStatus,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .setup
            .insert(user_id.clone(), status);
        Ok(())
    }

    async fn get_workspace(&self, user_id: &UserId) -> Result<Option<Workspace>, StorageError> {
        Ok(self.tables.read().await.workspaces.get(user_id).cloned())
    }

    async fn save_workspace(
        &self,
        user_id: &UserId,
        workspace: Workspace,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .workspaces
            .insert(user_id.clone(), workspace);
        Ok(())
    }

    async fn list_integrations(&self, user_id: &UserId) -> Result<IntegrationMap, StorageError> {
        let tables = self.tables.read().await;
        let mut integrations = IntegrationMap::new();

        for ((owner, category, provider), data) in &tables.integrations {
            if owner == user_id {
                integrations
                    .entry(category.clone())
                    .or_default()
                    .insert(provider.clone(), data.clone());
            }
        }

        Ok(integrations)
    }

    async fn get_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<Option<Blob>, StorageError> {
        let key = (user_id.clone(), category.to_string(), provider.to_string());
        Ok(self.tables.read().await.integrations.get(&key).cloned())
    }

    async fn upsert_integration(&self, integration: Integration) -> Result<(), StorageError> {
        let key = (
            integration.user_id,
            integration.category,
            integration.provider,
        );
        self.tables
            .write()
            .await
            .integrations
            .insert(key, integration.data);
        Ok(())
    }

    async fn delete_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<(), StorageError> {
        let key = (user_id.clone(), category.to_string(), provider.to_string());
        self.tables.write().await.integrations.remove(&key);
        Ok(())
    }

    async fn list_campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, StorageError> {
        let tables = self.tables.read().await;

        let mut campaigns: Vec<Campaign> = tables
            .campaigns
            .values()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(campaigns)
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<Campaign, StorageError> {
        let mut tables = self.tables.write().await;

        let stored = match tables.campaigns.entry(campaign.id.clone()) {
            Entry::Occupied(entry) if entry.get().user_id != campaign.user_id => {
                return Err(StorageError::owner_mismatch("campaigns", campaign.id));
            }
            Entry::Occupied(mut entry) => {
                entry.get_mut().fields = campaign.fields;
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(campaign).clone(),
        };

        Ok(stored)
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StorageError> {
        let tables = self.tables.read().await;

        let mut clients: Vec<Client> = tables.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(clients)
    }

    async fn create_client(&self, client: Client) -> Result<Client, StorageError> {
        self.tables
            .write()
            .await
            .clients
            .insert(client.id.clone(), client.clone());
        Ok(client)
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StorageError> {
        Ok(self.tables.read().await.clients.get(id).cloned())
    }

    async fn update_client(
        &self,
        id: &ClientId,
        update: ClientUpdate,
    ) -> Result<Option<Client>, StorageError> {
        let mut tables = self.tables.write().await;

        Ok(tables.clients.get_mut(id).map(|client| {
            client.apply(update);
            client.clone()
        }))
    }

    async fn increment_client_usage(
        &self,
        id: &ClientId,
        tokens_used: i64,
        cost: f64,
    ) -> Result<Option<Client>, StorageError> {
        let mut tables = self.tables.write().await;

        Ok(tables.clients.get_mut(id).map(|client| {
            client.tokens_used = client.tokens_used.saturating_add(tokens_used);
            client.monthly_spend += cost;
            client.clone()
        }))
    }

    async fn delete_client(&self, id: &ClientId) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;

        tables.client_oauth.retain(|(client_id, _), _| client_id != id);
        tables.client_campaigns.remove(id);
        tables.billing.remove(id);
        tables.admin_clients.retain(|(_, client_id)| client_id != id);
        tables.clients.remove(id);

        Ok(())
    }

    async fn add_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .admin_clients
            .insert((admin_id.clone(), client_id.clone()));
        Ok(())
    }

    async fn remove_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .admin_clients
            .remove(&(admin_id.clone(), client_id.clone()));
        Ok(())
    }

    async fn list_admin_clients(&self, admin_id: &UserId) -> Result<Vec<ClientId>, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .admin_clients
            .iter()
            .filter(|(admin, _)| admin == admin_id)
            .map(|(_, client_id)| client_id.clone())
            .collect())
    }

    async fn save_client_oauth(&self, credential: OAuthCredential) -> Result<(), StorageError> {
        let key = (credential.client_id.clone(), credential.platform.clone());
        self.tables
            .write()
            .await
            .client_oauth
            .insert(key, credential);
        Ok(())
    }

    async fn get_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<Option<OAuthCredential>, StorageError> {
        let key = (client_id.clone(), platform.to_string());
        Ok(self.tables.read().await.client_oauth.get(&key).cloned())
    }

    async fn delete_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<(), StorageError> {
        let key = (client_id.clone(), platform.to_string());
        self.tables.write().await.client_oauth.remove(&key);
        Ok(())
    }

    async fn list_client_campaigns(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ClientCampaign>, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .client_campaigns
            .get(client_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_client_campaigns(
        &self,
        client_id: &ClientId,
        campaigns: Vec<ClientCampaign>,
    ) -> Result<(), StorageError> {
        let campaigns = ClientCampaign::replacement_set(client_id, campaigns);
        let mut tables = self.tables.write().await;

        if campaigns.is_empty() {
            tables.client_campaigns.remove(client_id);
        } else {
            tables.client_campaigns.insert(client_id.clone(), campaigns);
        }

        Ok(())
    }

    async fn append_billing_entry(
        &self,
        client_id: &ClientId,
        entry: BillingEntry,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let ledger = tables.billing.entry(client_id.clone()).or_default();

        // Keep the ledger sorted by timestamp; equal timestamps stay in
        // insertion order.
        let position = ledger.partition_point(|e| e.timestamp <= entry.timestamp);
        ledger.insert(position, entry);

        Ok(())
    }

    async fn list_billing_entries(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<BillingEntry>, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .billing
            .get(client_id)
            .cloned()
            .unwrap_or_default())
    }
}
