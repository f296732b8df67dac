use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::bson::Bson;
use mongodb::bson::Document;
use mongodb::error::ErrorKind;
use mongodb::error::WriteFailure;
use mongodb::options::ClientOptions;
use mongodb::options::FindOneAndUpdateOptions;
use mongodb::options::FindOptions;
use mongodb::options::IndexOptions;
use mongodb::options::ReplaceOptions;
use mongodb::options::ReturnDocument;
use mongodb::options::UpdateOptions;
use mongodb::Client as MongoClient;
use mongodb::Collection;
use mongodb::Database;
use mongodb::IndexModel;
use serde::Deserialize;
use serde::Serialize;

use super::format_timestamp;
use super::parse_timestamp;
use super::PoolError;
use crate::config::required;
use crate::config::ConfigurationError;
use crate::config::MongoConfig;
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

const DEFAULT_DATABASE: &str = "campaign_ai";
const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Serialize, Deserialize)]
struct UserDoc {
    #[serde(rename = "_id")]
    id: String,
    email: String,
    password_hash: String,
    name: Option<String>,
    created_at: String,
}

impl TryFrom<UserDoc> for User {
    type Error = StorageError;

    fn try_from(doc: UserDoc) -> Result<Self, Self::Error> {
        Ok(User {
            created_at: parse_timestamp("users", &doc.created_at)?,
            id: UserId::from_string(doc.id),
            email: doc.email,
            password_hash: doc.password_hash,
            name: doc.name,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SetupDoc {
    #[serde(rename = "_id")]
    user_id: String,
    is_setup_complete: bool,
    completed_at: Option<String>,
    setup_data: Option<Blob>,
}

impl TryFrom<SetupDoc> for SetupStatus {
    type Error = StorageError;

    fn try_from(doc: SetupDoc) -> Result<Self, Self::Error> {
        Ok(SetupStatus {
            is_setup_complete: doc.is_setup_complete,
            completed_at: doc
                .completed_at
                .map(|t| parse_timestamp("user_setup", &t))
                .transpose()?,
            setup_data: doc.setup_data,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkspaceDoc {
    #[serde(rename = "_id")]
    user_id: String,
    workspace_id: String,
    name: String,
    created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IntegrationDoc {
    user_id: String,
    category: String,
    provider: String,
    data: Blob,
}

#[derive(Debug, Serialize, Deserialize)]
struct CampaignDoc {
    #[serde(rename = "_id")]
    id: String,
    user_id: String,
    created_at: String,
    fields: Blob,
}

impl TryFrom<CampaignDoc> for Campaign {
    type Error = StorageError;

    fn try_from(doc: CampaignDoc) -> Result<Self, Self::Error> {
        Ok(Campaign {
            created_at: parse_timestamp("campaigns", &doc.created_at)?,
            id: doc.id,
            user_id: UserId::from_string(doc.user_id),
            fields: doc.fields,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ClientDoc {
    #[serde(rename = "_id")]
    id: String,
    created_at: String,
    status: String,
    tokens_used: i64,
    tokens_limit: i64,
    monthly_spend: f64,
    connected_accounts: Vec<String>,
    fields: Blob,
}

impl From<&Client> for ClientDoc {
    fn from(client: &Client) -> Self {
        ClientDoc {
            id: client.id.as_str().to_string(),
            created_at: format_timestamp(&client.created_at),
            status: client.status.as_str().to_string(),
            tokens_used: client.tokens_used,
            tokens_limit: client.tokens_limit,
            monthly_spend: client.monthly_spend,
            connected_accounts: client.connected_accounts.clone(),
            fields: client.fields.clone(),
        }
    }
}

impl TryFrom<ClientDoc> for Client {
    type Error = StorageError;

    fn try_from(doc: ClientDoc) -> Result<Self, Self::Error> {
        Ok(Client {
            created_at: parse_timestamp("clients", &doc.created_at)?,
            id: ClientId::from_string(doc.id),
            status: doc.status.into(),
            tokens_used: doc.tokens_used,
            tokens_limit: doc.tokens_limit,
            monthly_spend: doc.monthly_spend,
            connected_accounts: doc.connected_accounts,
            fields: doc.fields,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AdminClientDoc {
    admin_id: String,
    client_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OAuthDoc {
    client_id: String,
    platform: String,
    data: Blob,
    connected_at: String,
    connected_by: String,
}

impl TryFrom<OAuthDoc> for OAuthCredential {
    type Error = StorageError;

    fn try_from(doc: OAuthDoc) -> Result<Self, Self::Error> {
        Ok(OAuthCredential {
            connected_at: parse_timestamp("client_oauth", &doc.connected_at)?,
            client_id: ClientId::from_string(doc.client_id),
            platform: doc.platform,
            data: doc.data,
            connected_by: UserId::from_string(doc.connected_by),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ClientCampaignDoc {
    client_id: String,
    id: String,
    fields: Blob,
}

#[derive(Debug, Serialize, Deserialize)]
struct BillingDoc {
    client_id: String,
    recorded_at: String,
    tokens_used: i64,
    cost: f64,
    admin_id: String,
}

impl TryFrom<BillingDoc> for BillingEntry {
    type Error = StorageError;

    fn try_from(doc: BillingDoc) -> Result<Self, Self::Error> {
        Ok(BillingEntry {
            timestamp: parse_timestamp("client_billing", &doc.recorded_at)?,
            tokens_used: doc.tokens_used,
            cost: doc.cost,
            admin_id: UserId::from_string(doc.admin_id),
        })
    }
}

/// MongoDB storage backend.
///
/// Multi-document operations are not transactional: a client cascade
/// removes children first, so an interrupted delete never leaves orphans
/// behind a missing client.
pub struct MongoStorage {
    users: Collection<UserDoc>,
    setup: Collection<SetupDoc>,
    workspaces: Collection<WorkspaceDoc>,
    integrations: Collection<IntegrationDoc>,
    campaigns: Collection<CampaignDoc>,
    clients: Collection<ClientDoc>,
    admin_clients: Collection<AdminClientDoc>,
    client_oauth: Collection<OAuthDoc>,
    client_campaigns: Collection<ClientCampaignDoc>,
    billing: Collection<BillingDoc>,
}

impl MongoStorage {
    pub fn new(database: &Database) -> Self {
        Self {
            users: database.collection("users"),
            setup: database.collection("user_setup"),
            workspaces: database.collection("user_workspace"),
            integrations: database.collection("user_integrations"),
            campaigns: database.collection("campaigns"),
            clients: database.collection("clients"),
            admin_clients: database.collection("admin_clients"),
            client_oauth: database.collection("client_oauth"),
            client_campaigns: database.collection("client_campaigns"),
            billing: database.collection("client_billing"),
        }
    }

    /// Connect and make sure the unique indexes exist.
    ///
    /// # Arguments
    /// * `config` - Connection URI and database name
    /// * `max_connections` - Driver pool size
    /// * `acquire_timeout` - Connect and server selection timeout
    ///
    /// # Returns
    /// Storage bound to the configured database
    ///
    /// # Errors
    /// * `Configuration` - URI missing or malformed
    /// * `Storage` - Server unreachable or index creation failed
    pub async fn connect(
        config: &MongoConfig,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let uri = required(&config.uri, "storage.mongo.uri")?;
        let database = config
            .database
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_DATABASE);

        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            ConfigurationError::InvalidParameter {
                name: "storage.mongo.uri",
                reason: e.to_string(),
            }
        })?;
        options.max_pool_size = Some(max_connections);
        options.connect_timeout = Some(acquire_timeout);
        options.server_selection_timeout = Some(acquire_timeout);

        let client = MongoClient::with_options(options).map_err(StorageError::from)?;
        let storage = Self::new(&client.database(database));
        storage
            .ensure_indexes()
            .await
            .map_err(StorageError::from)?;

        tracing::info!(max_connections, database, "MongoDB client created");

        Ok(storage)
    }

    async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        self.users
            .create_index(unique_index(doc! { "email": 1 }), None)
            .await?;
        self.integrations
            .create_index(
                unique_index(doc! { "user_id": 1, "category": 1, "provider": 1 }),
                None,
            )
            .await?;
        self.campaigns
            .create_index(index(doc! { "user_id": 1, "created_at": 1 }), None)
            .await?;
        self.admin_clients
            .create_index(unique_index(doc! { "admin_id": 1, "client_id": 1 }), None)
            .await?;
        self.client_oauth
            .create_index(unique_index(doc! { "client_id": 1, "platform": 1 }), None)
            .await?;
        self.client_campaigns
            .create_index(unique_index(doc! { "client_id": 1, "id": 1 }), None)
            .await?;
        self.billing
            .create_index(index(doc! { "client_id": 1, "recorded_at": 1 }), None)
            .await?;

        Ok(())
    }

    async fn upsert_user(&self, user: &NewUser) -> mongodb::error::Result<()> {
        self.users
            .update_one(
                doc! { "email": user.email.as_str() },
                doc! {
                    "$set": {
                        "password_hash": user.password_hash.as_str(),
                        "name": user.name.as_deref(),
                    },
                    "$setOnInsert": {
                        "_id": user.id.as_str(),
                        "created_at": format_timestamp(&user.created_at),
                    },
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;

        Ok(())
    }

    /// Read, merge and replace the whole document. Used only when an extra
    /// field key cannot be addressed as a dotted path.
    async fn replace_client(
        &self,
        id: &ClientId,
        update: ClientUpdate,
    ) -> Result<Option<Client>, StorageError> {
        let Some(mut client) = self.get_client(id).await? else {
            return Ok(None);
        };

        client.apply(update);

        let result = self
            .clients
            .replace_one(doc! { "_id": id.as_str() }, ClientDoc::from(&client), None)
            .await?;

        // Deleted between the read and the write.
        if result.matched_count == 0 {
            return Ok(None);
        }

        Ok(Some(client))
    }
}

/// `$set` document for a partial client update, or None when an extra
/// field key contains `.` or starts with `$`.
fn client_update_set(update: &ClientUpdate) -> Result<Option<Document>, StorageError> {
    let mut set = Document::new();

    if let Some(status) = &update.status {
        set.insert("status", status.as_str());
    }
    if let Some(tokens_used) = update.tokens_used {
        set.insert("tokens_used", tokens_used);
    }
    if let Some(tokens_limit) = update.tokens_limit {
        set.insert("tokens_limit", tokens_limit);
    }
    if let Some(monthly_spend) = update.monthly_spend {
        set.insert("monthly_spend", monthly_spend);
    }
    if let Some(connected_accounts) = &update.connected_accounts {
        set.insert("connected_accounts", connected_accounts.clone());
    }
    for (key, value) in &update.fields {
        if key.is_empty() || key.contains('.') || key.starts_with('$') {
            return Ok(None);
        }
        let value = mongodb::bson::to_bson(value)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        set.insert(format!("fields.{}", key), value);
    }

    Ok(Some(set))
}

fn index(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn unique_index(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn upsert() -> ReplaceOptions {
    ReplaceOptions::builder().upsert(true).build()
}

fn sorted(sort: Document) -> FindOptions {
    FindOptions::builder().sort(sort).build()
}

fn to_bson(blob: &Blob) -> Result<Bson, StorageError> {
    mongodb::bson::to_bson(blob).map_err(|e| StorageError::Encoding(e.to_string()))
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(failure)) if failure.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl StorageAdapter for MongoStorage {
    async fn create_or_update_user_by_email(&self, user: NewUser) -> Result<User, StorageError> {
        // Two concurrent upserts on a new email can both miss and race on
        // the unique index; the loser retries as an update.
        if let Err(e) = self.upsert_user(&user).await {
            if !is_duplicate_key(&e) {
                return Err(e.into());
            }
            tracing::debug!(email = %user.email, "Retrying user upsert after duplicate key");
            self.upsert_user(&user).await?;
        }

        let stored = self
            .users
            .find_one(doc! { "email": user.email.as_str() }, None)
            .await?
            .ok_or_else(|| StorageError::corrupt("users", "upserted user not found"))?;

        stored.try_into()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.users
            .find_one(doc! { "email": EmailAddress::normalize(email) }, None)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, StorageError> {
        self.users
            .find_one(doc! { "_id": id.as_str() }, None)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn get_setup_status(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SetupStatus>, StorageError> {
        self.setup
            .find_one(doc! { "_id": user_id.as_str() }, None)
            .await?
            .map(SetupStatus::try_from)
            .transpose()
    }

    async fn save_setup_status(
        &self,
        user_id: &UserId,
        status: SetupStatus,
    ) -> Result<(), StorageError> {
        let doc = SetupDoc {
            user_id: user_id.as_str().to_string(),
            is_setup_complete: status.is_setup_complete,
            completed_at: status.completed_at.as_ref().map(format_timestamp),
            setup_data: status.setup_data,
        };
        self.setup
            .replace_one(doc! { "_id": user_id.as_str() }, doc, upsert())
            .await?;

        Ok(())
    }

    async fn get_workspace(&self, user_id: &UserId) -> Result<Option<Workspace>, StorageError> {
        self.workspaces
            .find_one(doc! { "_id": user_id.as_str() }, None)
            .await?
            .map(|doc| {
                Ok(Workspace {
                    created_at: parse_timestamp("user_workspace", &doc.created_at)?,
                    id: doc.workspace_id,
                    name: doc.name,
                })
            })
            .transpose()
    }

    async fn save_workspace(
        &self,
        user_id: &UserId,
        workspace: Workspace,
    ) -> Result<(), StorageError> {
        let doc = WorkspaceDoc {
            user_id: user_id.as_str().to_string(),
            created_at: format_timestamp(&workspace.created_at),
            workspace_id: workspace.id,
            name: workspace.name,
        };
        self.workspaces
            .replace_one(doc! { "_id": user_id.as_str() }, doc, upsert())
            .await?;

        Ok(())
    }

    async fn list_integrations(&self, user_id: &UserId) -> Result<IntegrationMap, StorageError> {
        let docs: Vec<IntegrationDoc> = self
            .integrations
            .find(doc! { "user_id": user_id.as_str() }, None)
            .await?
            .try_collect()
            .await?;

        let mut integrations = IntegrationMap::new();
        for doc in docs {
            integrations
                .entry(doc.category)
                .or_default()
                .insert(doc.provider, doc.data);
        }

        Ok(integrations)
    }

    async fn get_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<Option<Blob>, StorageError> {
        let doc = self
            .integrations
            .find_one(
                doc! { "user_id": user_id.as_str(), "category": category, "provider": provider },
                None,
            )
            .await?;

        Ok(doc.map(|d| d.data))
    }

    async fn upsert_integration(&self, integration: Integration) -> Result<(), StorageError> {
        let filter = doc! {
            "user_id": integration.user_id.as_str(),
            "category": integration.category.as_str(),
            "provider": integration.provider.as_str(),
        };
        let doc = IntegrationDoc {
            user_id: integration.user_id.as_str().to_string(),
            category: integration.category,
            provider: integration.provider,
            data: integration.data,
        };
        self.integrations.replace_one(filter, doc, upsert()).await?;

        Ok(())
    }

    async fn delete_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<(), StorageError> {
        self.integrations
            .delete_one(
                doc! { "user_id": user_id.as_str(), "category": category, "provider": provider },
                None,
            )
            .await?;

        Ok(())
    }

    async fn list_campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, StorageError> {
        let docs: Vec<CampaignDoc> = self
            .campaigns
            .find(
                doc! { "user_id": user_id.as_str() },
                sorted(doc! { "created_at": 1, "_id": 1 }),
            )
            .await?
            .try_collect()
            .await?;

        docs.into_iter().map(Campaign::try_from).collect()
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<Campaign, StorageError> {
        // The owner is part of the filter, so an id held by another user
        // turns the upsert into a duplicate `_id` insert.
        let filter = doc! { "_id": campaign.id.as_str(), "user_id": campaign.user_id.as_str() };
        let update = doc! {
            "$set": { "fields": to_bson(&campaign.fields)? },
            "$setOnInsert": {
                "created_at": format_timestamp(&campaign.created_at),
            },
        };

        if let Err(e) = self
            .campaigns
            .update_one(
                filter.clone(),
                update.clone(),
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
        {
            if !is_duplicate_key(&e) {
                return Err(e.into());
            }
            // Either a racing insert by the same owner, or another owner's id.
            let result = self.campaigns.update_one(filter, update, None).await?;
            if result.matched_count == 0 {
                return Err(StorageError::owner_mismatch("campaigns", campaign.id));
            }
        }

        let stored = self
            .campaigns
            .find_one(doc! { "_id": campaign.id.as_str() }, None)
            .await?
            .ok_or_else(|| StorageError::corrupt("campaigns", "upserted campaign not found"))?;

        stored.try_into()
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StorageError> {
        let docs: Vec<ClientDoc> = self
            .clients
            .find(None, sorted(doc! { "created_at": 1, "_id": 1 }))
            .await?
            .try_collect()
            .await?;

        docs.into_iter().map(Client::try_from).collect()
    }

    async fn create_client(&self, client: Client) -> Result<Client, StorageError> {
        self.clients
            .replace_one(
                doc! { "_id": client.id.as_str() },
                ClientDoc::from(&client),
                upsert(),
            )
            .await?;

        Ok(client)
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StorageError> {
        self.clients
            .find_one(doc! { "_id": id.as_str() }, None)
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn update_client(
        &self,
        id: &ClientId,
        update: ClientUpdate,
    ) -> Result<Option<Client>, StorageError> {
        let Some(set) = client_update_set(&update)? else {
            return self.replace_client(id, update).await;
        };
        if set.is_empty() {
            return self.get_client(id).await;
        }

        self.clients
            .find_one_and_update(
                doc! { "_id": id.as_str() },
                doc! { "$set": set },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn increment_client_usage(
        &self,
        id: &ClientId,
        tokens_used: i64,
        cost: f64,
    ) -> Result<Option<Client>, StorageError> {
        self.clients
            .find_one_and_update(
                doc! { "_id": id.as_str() },
                doc! { "$inc": { "tokens_used": tokens_used, "monthly_spend": cost } },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn delete_client(&self, id: &ClientId) -> Result<(), StorageError> {
        let children = doc! { "client_id": id.as_str() };

        self.client_oauth.delete_many(children.clone(), None).await?;
        self.client_campaigns
            .delete_many(children.clone(), None)
            .await?;
        self.billing.delete_many(children.clone(), None).await?;
        self.admin_clients.delete_many(children, None).await?;
        self.clients
            .delete_one(doc! { "_id": id.as_str() }, None)
            .await?;

        Ok(())
    }

    async fn add_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError> {
        let doc = AdminClientDoc {
            admin_id: admin_id.as_str().to_string(),
            client_id: client_id.as_str().to_string(),
        };
        self.admin_clients
            .replace_one(
                doc! { "admin_id": admin_id.as_str(), "client_id": client_id.as_str() },
                doc,
                upsert(),
            )
            .await?;

        Ok(())
    }

    async fn remove_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError> {
        self.admin_clients
            .delete_one(
                doc! { "admin_id": admin_id.as_str(), "client_id": client_id.as_str() },
                None,
            )
            .await?;

        Ok(())
    }

    async fn list_admin_clients(&self, admin_id: &UserId) -> Result<Vec<ClientId>, StorageError> {
        let docs: Vec<AdminClientDoc> = self
            .admin_clients
            .find(
                doc! { "admin_id": admin_id.as_str() },
                sorted(doc! { "client_id": 1 }),
            )
            .await?
            .try_collect()
            .await?;

        Ok(docs
            .into_iter()
            .map(|d| ClientId::from_string(d.client_id))
            .collect())
    }

    async fn save_client_oauth(&self, credential: OAuthCredential) -> Result<(), StorageError> {
        let filter = doc! {
            "client_id": credential.client_id.as_str(),
            "platform": credential.platform.as_str(),
        };
        let doc = OAuthDoc {
            client_id: credential.client_id.as_str().to_string(),
            connected_at: format_timestamp(&credential.connected_at),
            connected_by: credential.connected_by.as_str().to_string(),
            platform: credential.platform,
            data: credential.data,
        };
        self.client_oauth.replace_one(filter, doc, upsert()).await?;

        Ok(())
    }

    async fn get_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<Option<OAuthCredential>, StorageError> {
        self.client_oauth
            .find_one(
                doc! { "client_id": client_id.as_str(), "platform": platform },
                None,
            )
            .await?
            .map(OAuthCredential::try_from)
            .transpose()
    }

    async fn delete_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<(), StorageError> {
        self.client_oauth
            .delete_one(
                doc! { "client_id": client_id.as_str(), "platform": platform },
                None,
            )
            .await?;

        Ok(())
    }

    async fn list_client_campaigns(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ClientCampaign>, StorageError> {
        let docs: Vec<ClientCampaignDoc> = self
            .client_campaigns
            .find(
                doc! { "client_id": client_id.as_str() },
                sorted(doc! { "id": 1 }),
            )
            .await?
            .try_collect()
            .await?;

        Ok(docs
            .into_iter()
            .map(|d| ClientCampaign {
                id: d.id,
                client_id: ClientId::from_string(d.client_id),
                fields: d.fields,
            })
            .collect())
    }

    async fn save_client_campaigns(
        &self,
        client_id: &ClientId,
        campaigns: Vec<ClientCampaign>,
    ) -> Result<(), StorageError> {
        let docs: Vec<ClientCampaignDoc> = ClientCampaign::replacement_set(client_id, campaigns)
            .into_iter()
            .map(|c| ClientCampaignDoc {
                client_id: c.client_id.as_str().to_string(),
                id: c.id,
                fields: c.fields,
            })
            .collect();

        self.client_campaigns
            .delete_many(doc! { "client_id": client_id.as_str() }, None)
            .await?;
        if !docs.is_empty() {
            self.client_campaigns.insert_many(docs, None).await?;
        }

        Ok(())
    }

    async fn append_billing_entry(
        &self,
        client_id: &ClientId,
        entry: BillingEntry,
    ) -> Result<(), StorageError> {
        let doc = BillingDoc {
            client_id: client_id.as_str().to_string(),
            recorded_at: format_timestamp(&entry.timestamp),
            tokens_used: entry.tokens_used,
            cost: entry.cost,
            admin_id: entry.admin_id.as_str().to_string(),
        };
        self.billing.insert_one(doc, None).await?;

        Ok(())
    }

    async fn list_billing_entries(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<BillingEntry>, StorageError> {
        // Generated ObjectIds grow with insertion, which breaks timestamp ties.
        let docs: Vec<BillingDoc> = self
            .billing
            .find(
                doc! { "client_id": client_id.as_str() },
                sorted(doc! { "recorded_at": 1, "_id": 1 }),
            )
            .await?
            .try_collect()
            .await?;

        docs.into_iter().map(BillingEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_client_document_round_trip() {
        let mut fields = Blob::new();
        fields.insert("name".to_string(), json!("Acme"));
        fields.insert("budget".to_string(), json!(1200.5));
        fields.insert("tags".to_string(), json!(["retail", "q3"]));

        let client = Client {
            id: ClientId::from_string("123-456-789"),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            status: "trial".into(),
            tokens_used: 40,
            tokens_limit: 2500,
            monthly_spend: 3.25,
            connected_accounts: vec!["google".to_string()],
            fields,
        };

        let bson = mongodb::bson::to_document(&ClientDoc::from(&client)).unwrap();
        assert_eq!(bson.get_str("_id").unwrap(), "123-456-789");
        assert_eq!(bson.get_str("created_at").unwrap(), "2024-05-01T09:30:00.000000Z");

        let doc: ClientDoc = mongodb::bson::from_document(bson).unwrap();
        assert_eq!(Client::try_from(doc).unwrap(), client);
    }

    #[test]
    fn test_client_update_sets_only_present_fields() {
        let mut fields = Blob::new();
        fields.insert("updatedBy".to_string(), json!("admin-1"));
        let update = ClientUpdate {
            tokens_limit: Some(50_000),
            fields,
            ..Default::default()
        };

        let set = client_update_set(&update).unwrap().unwrap();
        assert_eq!(set, doc! { "tokens_limit": 50_000_i64, "fields.updatedBy": "admin-1" });

        let mut fields = Blob::new();
        fields.insert("a.b".to_string(), json!(1));
        let dotted = ClientUpdate {
            fields,
            ..Default::default()
        };
        assert!(client_update_set(&dotted).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_timestamp_is_reported() {
        let doc = BillingDoc {
            client_id: "123-456-789".to_string(),
            recorded_at: "not a time".to_string(),
            tokens_used: 1,
            cost: 0.1,
            admin_id: "admin".to_string(),
        };

        assert!(matches!(
            BillingEntry::try_from(doc),
            Err(StorageError::Corrupt { table: "client_billing", .. })
        ));
    }
}
