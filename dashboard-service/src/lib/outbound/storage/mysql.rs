use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::FromRow;
use sqlx::MySql;
use sqlx::MySqlPool;
use sqlx::QueryBuilder;

use super::PoolError;
use crate::config::required;
use crate::config::MySqlConfig;
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
const DEADLOCK_SQLSTATE: &str = "40001";
const UPSERT_ATTEMPTS: usize = 3;
const CLIENT_COLUMNS: &str = "id, created_at, status, tokens_used, tokens_limit, monthly_spend, connected_accounts, fields";

/// MySQL storage backend.
///
/// Opaque records are stored as serialized JSON text and timestamps as
/// `DATETIME(6)` in UTC.
pub struct MySqlStorage {
    pool: MySqlPool,
}

impl MySqlStorage {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Open a pool and apply pending migrations.
    ///
    /// # Arguments
    /// * `config` - Host, credentials and optional port and database
    /// * `max_connections` - Pool size
    /// * `acquire_timeout` - Longest wait for a pooled connection
    ///
    /// # Returns
    /// Storage backed by a migrated database
    ///
    /// # Errors
    /// * `Configuration` - Host, username or password missing
    /// * `Storage` - Connection or migration failed
    pub async fn connect(
        config: &MySqlConfig,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let host = required(&config.host, "storage.mysql.host")?;
        let username = required(&config.username, "storage.mysql.username")?;
        let password = required(&config.password, "storage.mysql.password")?;
        let database = config
            .database
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_DATABASE);

        let mut options = MySqlConnectOptions::new()
            .host(host)
            .username(username)
            .password(password)
            .database(database);
        if let Some(port) = config.port {
            options = options.port(port);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(StorageError::from)?;
        tracing::info!(
            max_connections,
            host,
            database,
            "Database connection pool created"
        );

        sqlx::migrate!("./migrations/mysql")
            .run(&pool)
            .await
            .map_err(StorageError::from)?;
        tracing::info!(database = "mysql", "Database migrations completed");

        Ok(Self::new(pool))
    }

    async fn upsert_user(&self, user: &NewUser) -> Result<User, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                password_hash = VALUES(password_hash),
                name = VALUES(name)
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.email.as_str())
        .bind(&user.password_hash)
        .bind(user.name.as_deref())
        .bind(user.created_at.naive_utc())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, name, created_at FROM users WHERE email = ?",
        )
        .bind(user.email.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.into())
    }
}

/// InnoDB can pick an upsert racing on the same unique key as a deadlock
/// victim (SQLSTATE 40001); the transaction is safe to run again.
fn is_deadlock(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(DEADLOCK_SQLSTATE))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: DeserializeOwned>(table: &'static str, text: &str) -> Result<T, StorageError> {
    serde_json::from_str(text).map_err(|e| StorageError::corrupt(table, e.to_string()))
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    name: Option<String>,
    created_at: NaiveDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_string(row.id),
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            created_at: row.created_at.and_utc(),
        }
    }
}

#[derive(FromRow)]
struct SetupRow {
    is_setup_complete: bool,
    completed_at: Option<NaiveDateTime>,
    setup_data: Option<String>,
}

impl TryFrom<SetupRow> for SetupStatus {
    type Error = StorageError;

    fn try_from(row: SetupRow) -> Result<Self, Self::Error> {
        Ok(SetupStatus {
            is_setup_complete: row.is_setup_complete,
            completed_at: row.completed_at.map(|t| t.and_utc()),
            setup_data: row
                .setup_data
                .map(|text| from_json("user_setup", &text))
                .transpose()?,
        })
    }
}

#[derive(FromRow)]
struct WorkspaceRow {
    workspace_id: String,
    name: String,
    created_at: NaiveDateTime,
}

#[derive(FromRow)]
struct IntegrationRow {
    category: String,
    provider: String,
    data: String,
}

#[derive(FromRow)]
struct CampaignRow {
    id: String,
    user_id: String,
    created_at: NaiveDateTime,
    fields: String,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = StorageError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        Ok(Campaign {
            fields: from_json("campaigns", &row.fields)?,
            id: row.id,
            user_id: UserId::from_string(row.user_id),
            created_at: row.created_at.and_utc(),
        })
    }
}

#[derive(FromRow)]
struct ClientRow {
    id: String,
    created_at: NaiveDateTime,
    status: String,
    tokens_used: i64,
    tokens_limit: i64,
    monthly_spend: f64,
    connected_accounts: String,
    fields: String,
}

impl TryFrom<ClientRow> for Client {
    type Error = StorageError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        Ok(Client {
            connected_accounts: from_json("clients", &row.connected_accounts)?,
            fields: from_json("clients", &row.fields)?,
            id: ClientId::from_string(row.id),
            created_at: row.created_at.and_utc(),
            status: row.status.into(),
            tokens_used: row.tokens_used,
            tokens_limit: row.tokens_limit,
            monthly_spend: row.monthly_spend,
        })
    }
}

#[derive(FromRow)]
struct OAuthRow {
    client_id: String,
    platform: String,
    data: String,
    connected_at: NaiveDateTime,
    connected_by: String,
}

impl TryFrom<OAuthRow> for OAuthCredential {
    type Error = StorageError;

    fn try_from(row: OAuthRow) -> Result<Self, Self::Error> {
        Ok(OAuthCredential {
            data: from_json("client_oauth", &row.data)?,
            client_id: ClientId::from_string(row.client_id),
            platform: row.platform,
            connected_at: row.connected_at.and_utc(),
            connected_by: UserId::from_string(row.connected_by),
        })
    }
}

#[derive(FromRow)]
struct ClientCampaignRow {
    client_id: String,
    id: String,
    fields: String,
}

impl TryFrom<ClientCampaignRow> for ClientCampaign {
    type Error = StorageError;

    fn try_from(row: ClientCampaignRow) -> Result<Self, Self::Error> {
        Ok(ClientCampaign {
            fields: from_json("client_campaigns", &row.fields)?,
            id: row.id,
            client_id: ClientId::from_string(row.client_id),
        })
    }
}

#[derive(FromRow)]
struct BillingRow {
    recorded_at: NaiveDateTime,
    tokens_used: i64,
    cost: f64,
    admin_id: String,
}

impl From<BillingRow> for BillingEntry {
    fn from(row: BillingRow) -> Self {
        BillingEntry {
            timestamp: row.recorded_at.and_utc(),
            tokens_used: row.tokens_used,
            cost: row.cost,
            admin_id: UserId::from_string(row.admin_id),
        }
    }
}

#[async_trait]
impl StorageAdapter for MySqlStorage {
    async fn create_or_update_user_by_email(&self, user: NewUser) -> Result<User, StorageError> {
        let mut attempt = 1;
        loop {
            match self.upsert_user(&user).await {
                Err(e) if is_deadlock(&e) && attempt < UPSERT_ATTEMPTS => {
                    tracing::debug!(email = %user.email, attempt, "Retrying user upsert after deadlock");
                    attempt += 1;
                }
                result => return Ok(result?),
            }
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, name, created_at FROM users WHERE email = ?",
        )
        .bind(EmailAddress::normalize(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, name, created_at FROM users WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn get_setup_status(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SetupStatus>, StorageError> {
        let row = sqlx::query_as::<_, SetupRow>(
            "SELECT is_setup_complete, completed_at, setup_data FROM user_setup WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SetupStatus::try_from).transpose()
    }

    async fn save_setup_status(
        &self,
        user_id: &UserId,
        status: SetupStatus,
    ) -> Result<(), StorageError> {
        let setup_data = status.setup_data.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO user_setup (user_id, is_setup_complete, completed_at, setup_data)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                is_setup_complete = VALUES(is_setup_complete),
                completed_at = VALUES(completed_at),
                setup_data = VALUES(setup_data)
            "#,
        )
        .bind(user_id.as_str())
        .bind(status.is_setup_complete)
        .bind(status.completed_at.map(|t| t.naive_utc()))
        .bind(setup_data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_workspace(&self, user_id: &UserId) -> Result<Option<Workspace>, StorageError> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT workspace_id, name, created_at FROM user_workspace WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Workspace {
            id: r.workspace_id,
            name: r.name,
            created_at: r.created_at.and_utc(),
        }))
    }

    async fn save_workspace(
        &self,
        user_id: &UserId,
        workspace: Workspace,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO user_workspace (user_id, workspace_id, name, created_at)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                workspace_id = VALUES(workspace_id),
                name = VALUES(name),
                created_at = VALUES(created_at)
            "#,
        )
        .bind(user_id.as_str())
        .bind(&workspace.id)
        .bind(&workspace.name)
        .bind(workspace.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_integrations(&self, user_id: &UserId) -> Result<IntegrationMap, StorageError> {
        let rows = sqlx::query_as::<_, IntegrationRow>(
            "SELECT category, provider, data FROM user_integrations WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut integrations = IntegrationMap::new();
        for row in rows {
            let data: Blob = from_json("user_integrations", &row.data)?;
            integrations
                .entry(row.category)
                .or_default()
                .insert(row.provider, data);
        }

        Ok(integrations)
    }

    async fn get_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<Option<Blob>, StorageError> {
        let data = sqlx::query_scalar::<_, String>(
            r#"
            SELECT data
            FROM user_integrations
            WHERE user_id = ? AND category = ? AND provider = ?
            "#,
        )
        .bind(user_id.as_str())
        .bind(category)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        data.map(|text| from_json("user_integrations", &text))
            .transpose()
    }

    async fn upsert_integration(&self, integration: Integration) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO user_integrations (user_id, category, provider, data)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE data = VALUES(data)
            "#,
        )
        .bind(integration.user_id.as_str())
        .bind(&integration.category)
        .bind(&integration.provider)
        .bind(to_json(&integration.data)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "DELETE FROM user_integrations WHERE user_id = ? AND category = ? AND provider = ?",
        )
        .bind(user_id.as_str())
        .bind(category)
        .bind(provider)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, StorageError> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, user_id, created_at, fields
            FROM campaigns
            WHERE user_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Campaign::try_from).collect()
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<Campaign, StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO campaigns (id, user_id, created_at, fields)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                fields = IF(user_id = VALUES(user_id), VALUES(fields), fields)
            "#,
        )
        .bind(&campaign.id)
        .bind(campaign.user_id.as_str())
        .bind(campaign.created_at.naive_utc())
        .bind(to_json(&campaign.fields)?)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, CampaignRow>(
            "SELECT id, user_id, created_at, fields FROM campaigns WHERE id = ?",
        )
        .bind(&campaign.id)
        .fetch_one(&mut *tx)
        .await?;

        if row.user_id != campaign.user_id.as_str() {
            return Err(StorageError::owner_mismatch("campaigns", campaign.id));
        }

        tx.commit().await?;

        row.try_into()
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StorageError> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients ORDER BY created_at ASC, id ASC",
            CLIENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Client::try_from).collect()
    }

    async fn create_client(&self, client: Client) -> Result<Client, StorageError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO clients ({})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                created_at = VALUES(created_at),
                status = VALUES(status),
                tokens_used = VALUES(tokens_used),
                tokens_limit = VALUES(tokens_limit),
                monthly_spend = VALUES(monthly_spend),
                connected_accounts = VALUES(connected_accounts),
                fields = VALUES(fields)
            "#,
            CLIENT_COLUMNS
        ))
        .bind(client.id.as_str())
        .bind(client.created_at.naive_utc())
        .bind(client.status.as_str())
        .bind(client.tokens_used)
        .bind(client.tokens_limit)
        .bind(client.monthly_spend)
        .bind(to_json(&client.connected_accounts)?)
        .bind(to_json(&client.fields)?)
        .execute(&self.pool)
        .await?;

        Ok(client)
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StorageError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients WHERE id = ?",
            CLIENT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Client::try_from).transpose()
    }

    async fn update_client(
        &self,
        id: &ClientId,
        update: ClientUpdate,
    ) -> Result<Option<Client>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients WHERE id = ? FOR UPDATE",
            CLIENT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut client = Client::try_from(row)?;
        client.apply(update);

        sqlx::query(
            r#"
            UPDATE clients
            SET status = ?,
                tokens_used = ?,
                tokens_limit = ?,
                monthly_spend = ?,
                connected_accounts = ?,
                fields = ?
            WHERE id = ?
            "#,
        )
        .bind(client.status.as_str())
        .bind(client.tokens_used)
        .bind(client.tokens_limit)
        .bind(client.monthly_spend)
        .bind(to_json(&client.connected_accounts)?)
        .bind(to_json(&client.fields)?)
        .bind(client.id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(client))
    }

    async fn increment_client_usage(
        &self,
        id: &ClientId,
        tokens_used: i64,
        cost: f64,
    ) -> Result<Option<Client>, StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE clients
            SET tokens_used = tokens_used + ?,
                monthly_spend = monthly_spend + ?
            WHERE id = ?
            "#,
        )
        .bind(tokens_used)
        .bind(cost)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients WHERE id = ?",
            CLIENT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        row.map(Client::try_from).transpose()
    }

    async fn delete_client(&self, id: &ClientId) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM client_oauth WHERE client_id = ?",
            "DELETE FROM client_campaigns WHERE client_id = ?",
            "DELETE FROM client_billing WHERE client_id = ?",
            "DELETE FROM admin_clients WHERE client_id = ?",
            "DELETE FROM clients WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn add_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError> {
        // Duplicates are a no-op; every other error still propagates.
        sqlx::query(
            r#"
            INSERT INTO admin_clients (admin_id, client_id)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE admin_id = admin_id
            "#,
        )
        .bind(admin_id.as_str())
        .bind(client_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_admin_client(
        &self,
        admin_id: &UserId,
        client_id: &ClientId,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM admin_clients WHERE admin_id = ? AND client_id = ?")
            .bind(admin_id.as_str())
            .bind(client_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_admin_clients(&self, admin_id: &UserId) -> Result<Vec<ClientId>, StorageError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT client_id FROM admin_clients WHERE admin_id = ? ORDER BY client_id ASC",
        )
        .bind(admin_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ClientId::from_string).collect())
    }

    async fn save_client_oauth(&self, credential: OAuthCredential) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO client_oauth (client_id, platform, data, connected_at, connected_by)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                data = VALUES(data),
                connected_at = VALUES(connected_at),
                connected_by = VALUES(connected_by)
            "#,
        )
        .bind(credential.client_id.as_str())
        .bind(&credential.platform)
        .bind(to_json(&credential.data)?)
        .bind(credential.connected_at.naive_utc())
        .bind(credential.connected_by.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<Option<OAuthCredential>, StorageError> {
        let row = sqlx::query_as::<_, OAuthRow>(
            r#"
            SELECT client_id, platform, data, connected_at, connected_by
            FROM client_oauth
            WHERE client_id = ? AND platform = ?
            "#,
        )
        .bind(client_id.as_str())
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OAuthCredential::try_from).transpose()
    }

    async fn delete_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM client_oauth WHERE client_id = ? AND platform = ?")
            .bind(client_id.as_str())
            .bind(platform)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_client_campaigns(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ClientCampaign>, StorageError> {
        let rows = sqlx::query_as::<_, ClientCampaignRow>(
            r#"
            SELECT client_id, id, fields
            FROM client_campaigns
            WHERE client_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(client_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ClientCampaign::try_from).collect()
    }

    async fn save_client_campaigns(
        &self,
        client_id: &ClientId,
        campaigns: Vec<ClientCampaign>,
    ) -> Result<(), StorageError> {
        let campaigns = ClientCampaign::replacement_set(client_id, campaigns);
        let encoded = campaigns
            .iter()
            .map(|c| to_json(&c.fields).map(|fields| (c.id.as_str(), fields)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM client_campaigns WHERE client_id = ?")
            .bind(client_id.as_str())
            .execute(&mut *tx)
            .await?;

        if !encoded.is_empty() {
            let mut insert: QueryBuilder<MySql> =
                QueryBuilder::new("INSERT INTO client_campaigns (client_id, id, fields) ");
            insert.push_values(&encoded, |mut row, (id, fields)| {
                row.push_bind(client_id.as_str())
                    .push_bind(*id)
                    .push_bind(fields.as_str());
            });
            insert.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn append_billing_entry(
        &self,
        client_id: &ClientId,
        entry: BillingEntry,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO client_billing (client_id, recorded_at, tokens_used, cost, admin_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(client_id.as_str())
        .bind(entry.timestamp.naive_utc())
        .bind(entry.tokens_used)
        .bind(entry.cost)
        .bind(entry.admin_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_billing_entries(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<BillingEntry>, StorageError> {
        let rows = sqlx::query_as::<_, BillingRow>(
            r#"
            SELECT recorded_at, tokens_used, cost, admin_id
            FROM client_billing
            WHERE client_id = ?
            ORDER BY recorded_at ASC, seq ASC
            "#,
        )
        .bind(client_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(BillingEntry::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_text_preserves_key_order() {
        let mut blob = Blob::new();
        blob.insert("zeta".to_string(), json!(1));
        blob.insert("alpha".to_string(), json!({"nested": [1, 2]}));

        let text = to_json(&blob).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":{"nested":[1,2]}}"#);

        let decoded: Blob = from_json("campaigns", &text).unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn test_corrupt_json_names_table() {
        let result: Result<Blob, _> = from_json("client_oauth", "{not json");
        assert!(matches!(
            result,
            Err(StorageError::Corrupt { table: "client_oauth", .. })
        ));
    }
}
