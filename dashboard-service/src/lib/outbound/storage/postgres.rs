use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgConnectOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::FromRow;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::QueryBuilder;
use url::Url;

use super::PoolError;
use crate::config::required;
use crate::config::ConfigurationError;
use crate::config::PostgresConfig;
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

const CLIENT_COLUMNS: &str = "id, created_at, status, tokens_used, tokens_limit, monthly_spend, connected_accounts, fields";

/// PostgreSQL storage backend.
///
/// Opaque records live in JSONB columns; multi-statement operations run in
/// a single transaction.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and apply pending migrations.
    ///
    /// # Arguments
    /// * `config` - Connection URL, plus a password used when the URL has none
    /// * `max_connections` - Pool size
    /// * `acquire_timeout` - Longest wait for a pooled connection
    ///
    /// # Returns
    /// Storage backed by a migrated database
    ///
    /// # Errors
    /// * `Configuration` - URL missing or not parseable
    /// * `Storage` - Connection or migration failed
    pub async fn connect(
        config: &PostgresConfig,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let url = required(&config.url, "storage.postgres.url")?;
        let invalid_url = |reason: String| ConfigurationError::InvalidParameter {
            name: "storage.postgres.url",
            reason,
        };

        let parsed = Url::parse(url).map_err(|e| invalid_url(e.to_string()))?;
        let mut options: PgConnectOptions =
            url.parse().map_err(|e: sqlx::Error| invalid_url(e.to_string()))?;

        if parsed.password().is_none() {
            if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
                options = options.password(password);
            }
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(StorageError::from)?;
        tracing::info!(
            max_connections,
            database = "postgresql",
            "Database connection pool created"
        );

        sqlx::migrate!("./migrations/postgres")
            .run(&pool)
            .await
            .map_err(StorageError::from)?;
        tracing::info!(database = "postgresql", "Database migrations completed");

        Ok(Self::new(pool))
    }
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    name: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_string(row.id),
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct SetupRow {
    is_setup_complete: bool,
    completed_at: Option<DateTime<Utc>>,
    setup_data: Option<Json<Blob>>,
}

#[derive(FromRow)]
struct WorkspaceRow {
    workspace_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct IntegrationRow {
    category: String,
    provider: String,
    data: Json<Blob>,
}

#[derive(FromRow)]
struct CampaignRow {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    fields: Json<Blob>,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Campaign {
            id: row.id,
            user_id: UserId::from_string(row.user_id),
            created_at: row.created_at,
            fields: row.fields.0,
        }
    }
}

#[derive(FromRow)]
struct ClientRow {
    id: String,
    created_at: DateTime<Utc>,
    status: String,
    tokens_used: i64,
    tokens_limit: i64,
    monthly_spend: f64,
    connected_accounts: Json<Vec<String>>,
    fields: Json<Blob>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: ClientId::from_string(row.id),
            created_at: row.created_at,
            status: row.status.into(),
            tokens_used: row.tokens_used,
            tokens_limit: row.tokens_limit,
            monthly_spend: row.monthly_spend,
            connected_accounts: row.connected_accounts.0,
            fields: row.fields.0,
        }
    }
}

#[derive(FromRow)]
struct OAuthRow {
    client_id: String,
    platform: String,
    data: Json<Blob>,
    connected_at: DateTime<Utc>,
    connected_by: String,
}

impl From<OAuthRow> for OAuthCredential {
    fn from(row: OAuthRow) -> Self {
        OAuthCredential {
            client_id: ClientId::from_string(row.client_id),
            platform: row.platform,
            data: row.data.0,
            connected_at: row.connected_at,
            connected_by: UserId::from_string(row.connected_by),
        }
    }
}

#[derive(FromRow)]
struct ClientCampaignRow {
    client_id: String,
    id: String,
    fields: Json<Blob>,
}

impl From<ClientCampaignRow> for ClientCampaign {
    fn from(row: ClientCampaignRow) -> Self {
        ClientCampaign {
            id: row.id,
            client_id: ClientId::from_string(row.client_id),
            fields: row.fields.0,
        }
    }
}

#[derive(FromRow)]
struct BillingRow {
    recorded_at: DateTime<Utc>,
    tokens_used: i64,
    cost: f64,
    admin_id: String,
}

impl From<BillingRow> for BillingEntry {
    fn from(row: BillingRow) -> Self {
        BillingEntry {
            timestamp: row.recorded_at,
            tokens_used: row.tokens_used,
            cost: row.cost,
            admin_id: UserId::from_string(row.admin_id),
        }
    }
}

#[async_trait]
impl StorageAdapter for PostgresStorage {
    async fn create_or_update_user_by_email(&self, user: NewUser) -> Result<User, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, password_hash, name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE
            SET password_hash = EXCLUDED.password_hash, name = EXCLUDED.name
            RETURNING id, email, password_hash, name, created_at
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.email.as_str())
        .bind(&user.password_hash)
        .bind(user.name.as_deref())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, name, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(EmailAddress::normalize(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, name, created_at
            FROM users
            WHERE id = $1
            "#,
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
            "SELECT is_setup_complete, completed_at, setup_data FROM user_setup WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| SetupStatus {
            is_setup_complete: r.is_setup_complete,
            completed_at: r.completed_at,
            setup_data: r.setup_data.map(|d| d.0),
        }))
    }

    async fn save_setup_status(
        &self,
        user_id: &UserId,
        status: SetupStatus,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO user_setup (user_id, is_setup_complete, completed_at, setup_data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET is_setup_complete = EXCLUDED.is_setup_complete,
                completed_at = EXCLUDED.completed_at,
                setup_data = EXCLUDED.setup_data
            "#,
        )
        .bind(user_id.as_str())
        .bind(status.is_setup_complete)
        .bind(status.completed_at)
        .bind(status.setup_data.map(Json))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_workspace(&self, user_id: &UserId) -> Result<Option<Workspace>, StorageError> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT workspace_id, name, created_at FROM user_workspace WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Workspace {
            id: r.workspace_id,
            name: r.name,
            created_at: r.created_at,
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET workspace_id = EXCLUDED.workspace_id,
                name = EXCLUDED.name,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(&workspace.id)
        .bind(&workspace.name)
        .bind(workspace.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_integrations(&self, user_id: &UserId) -> Result<IntegrationMap, StorageError> {
        let rows = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT category, provider, data
            FROM user_integrations
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut integrations = IntegrationMap::new();
        for row in rows {
            integrations
                .entry(row.category)
                .or_default()
                .insert(row.provider, row.data.0);
        }

        Ok(integrations)
    }

    async fn get_integration(
        &self,
        user_id: &UserId,
        category: &str,
        provider: &str,
    ) -> Result<Option<Blob>, StorageError> {
        let data = sqlx::query_scalar::<_, Json<Blob>>(
            r#"
            SELECT data
            FROM user_integrations
            WHERE user_id = $1 AND category = $2 AND provider = $3
            "#,
        )
        .bind(user_id.as_str())
        .bind(category)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        Ok(data.map(|d| d.0))
    }

    async fn upsert_integration(&self, integration: Integration) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO user_integrations (user_id, category, provider, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, category, provider) DO UPDATE
            SET data = EXCLUDED.data
            "#,
        )
        .bind(integration.user_id.as_str())
        .bind(&integration.category)
        .bind(&integration.provider)
        .bind(Json(&integration.data))
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
            "DELETE FROM user_integrations WHERE user_id = $1 AND category = $2 AND provider = $3",
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
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<Campaign, StorageError> {
        // No row comes back when the id is taken by another user.
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            INSERT INTO campaigns (id, user_id, created_at, fields)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET fields = EXCLUDED.fields
            WHERE campaigns.user_id = EXCLUDED.user_id
            RETURNING id, user_id, created_at, fields
            "#,
        )
        .bind(&campaign.id)
        .bind(campaign.user_id.as_str())
        .bind(campaign.created_at)
        .bind(Json(&campaign.fields))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::owner_mismatch("campaigns", campaign.id.as_str()))?;

        Ok(row.into())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StorageError> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients ORDER BY created_at ASC, id ASC",
            CLIENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Client::from).collect())
    }

    async fn create_client(&self, client: Client) -> Result<Client, StorageError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            r#"
            INSERT INTO clients ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET created_at = EXCLUDED.created_at,
                status = EXCLUDED.status,
                tokens_used = EXCLUDED.tokens_used,
                tokens_limit = EXCLUDED.tokens_limit,
                monthly_spend = EXCLUDED.monthly_spend,
                connected_accounts = EXCLUDED.connected_accounts,
                fields = EXCLUDED.fields
            RETURNING {columns}
            "#,
            columns = CLIENT_COLUMNS
        ))
        .bind(client.id.as_str())
        .bind(client.created_at)
        .bind(client.status.as_str())
        .bind(client.tokens_used)
        .bind(client.tokens_limit)
        .bind(client.monthly_spend)
        .bind(Json(&client.connected_accounts))
        .bind(Json(&client.fields))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StorageError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients WHERE id = $1",
            CLIENT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Client::from))
    }

    async fn update_client(
        &self,
        id: &ClientId,
        update: ClientUpdate,
    ) -> Result<Option<Client>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients WHERE id = $1 FOR UPDATE",
            CLIENT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut client = Client::from(row);
        client.apply(update);

        sqlx::query(
            r#"
            UPDATE clients
            SET status = $2,
                tokens_used = $3,
                tokens_limit = $4,
                monthly_spend = $5,
                connected_accounts = $6,
                fields = $7
            WHERE id = $1
            "#,
        )
        .bind(client.id.as_str())
        .bind(client.status.as_str())
        .bind(client.tokens_used)
        .bind(client.tokens_limit)
        .bind(client.monthly_spend)
        .bind(Json(&client.connected_accounts))
        .bind(Json(&client.fields))
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
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            r#"
            UPDATE clients
            SET tokens_used = tokens_used + $2,
                monthly_spend = monthly_spend + $3
            WHERE id = $1
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(id.as_str())
        .bind(tokens_used)
        .bind(cost)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Client::from))
    }

    async fn delete_client(&self, id: &ClientId) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM client_oauth WHERE client_id = $1",
            "DELETE FROM client_campaigns WHERE client_id = $1",
            "DELETE FROM client_billing WHERE client_id = $1",
            "DELETE FROM admin_clients WHERE client_id = $1",
            "DELETE FROM clients WHERE id = $1",
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
        sqlx::query(
            r#"
            INSERT INTO admin_clients (admin_id, client_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
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
        sqlx::query("DELETE FROM admin_clients WHERE admin_id = $1 AND client_id = $2")
            .bind(admin_id.as_str())
            .bind(client_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_admin_clients(&self, admin_id: &UserId) -> Result<Vec<ClientId>, StorageError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT client_id FROM admin_clients WHERE admin_id = $1 ORDER BY client_id ASC",
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
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (client_id, platform) DO UPDATE
            SET data = EXCLUDED.data,
                connected_at = EXCLUDED.connected_at,
                connected_by = EXCLUDED.connected_by
            "#,
        )
        .bind(credential.client_id.as_str())
        .bind(&credential.platform)
        .bind(Json(&credential.data))
        .bind(credential.connected_at)
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
            WHERE client_id = $1 AND platform = $2
            "#,
        )
        .bind(client_id.as_str())
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(OAuthCredential::from))
    }

    async fn delete_client_oauth(
        &self,
        client_id: &ClientId,
        platform: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM client_oauth WHERE client_id = $1 AND platform = $2")
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
            WHERE client_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(client_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ClientCampaign::from).collect())
    }

    async fn save_client_campaigns(
        &self,
        client_id: &ClientId,
        campaigns: Vec<ClientCampaign>,
    ) -> Result<(), StorageError> {
        let campaigns = ClientCampaign::replacement_set(client_id, campaigns);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM client_campaigns WHERE client_id = $1")
            .bind(client_id.as_str())
            .execute(&mut *tx)
            .await?;

        if !campaigns.is_empty() {
            let mut insert: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO client_campaigns (client_id, id, fields) ");
            insert.push_values(&campaigns, |mut row, campaign| {
                row.push_bind(campaign.client_id.as_str())
                    .push_bind(campaign.id.as_str())
                    .push_bind(Json(&campaign.fields));
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
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(client_id.as_str())
        .bind(entry.timestamp)
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
            WHERE client_id = $1
            ORDER BY recorded_at ASC, seq ASC
            "#,
        )
        .bind(client_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(BillingEntry::from).collect())
    }
}
