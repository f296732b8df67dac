use std::collections::BTreeMap;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::user::models::UserId;
use crate::domain::Blob;

/// Client unique identifier type
///
/// Generated ids have the form `NNN-NNN-NNN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a new random client ID of three 3-digit groups.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let groups: Vec<String> = (0..3)
            .map(|_| rng.gen_range(100..1000).to_string())
            .collect();
        Self(groups.join("-"))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a managed client.
///
/// Unknown values read from storage are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClientStatus {
    Trial,
    Active,
    Paused,
    Churned,
    Other(String),
}

impl ClientStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ClientStatus::Trial => "trial",
            ClientStatus::Active => "active",
            ClientStatus::Paused => "paused",
            ClientStatus::Churned => "churned",
            ClientStatus::Other(status) => status,
        }
    }
}

impl From<String> for ClientStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "trial" => ClientStatus::Trial,
            "active" => ClientStatus::Active,
            "paused" => ClientStatus::Paused,
            "churned" => ClientStatus::Churned,
            _ => ClientStatus::Other(status),
        }
    }
}

impl From<&str> for ClientStatus {
    fn from(status: &str) -> Self {
        ClientStatus::from(status.to_string())
    }
}

impl From<ClientStatus> for String {
    fn from(status: ClientStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription plan, which decides the initial token allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPlan {
    Starter,
    Pro,
    Enterprise,
}

impl ClientPlan {
    /// Resolve a plan by name. Anything other than Starter or Pro is
    /// treated as Enterprise.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("starter") {
            ClientPlan::Starter
        } else if name.eq_ignore_ascii_case("pro") {
            ClientPlan::Pro
        } else {
            ClientPlan::Enterprise
        }
    }

    pub fn tokens_limit(&self) -> i64 {
        match self {
            ClientPlan::Starter => 2_500,
            ClientPlan::Pro => 10_000,
            ClientPlan::Enterprise => 25_000,
        }
    }
}

/// Managed client aggregate.
///
/// Usage counters and connected platforms are typed; everything else the
/// dashboard records (name, plan, industry, audit fields) lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub created_at: DateTime<Utc>,
    pub status: ClientStatus,
    pub tokens_used: i64,
    pub tokens_limit: i64,
    pub monthly_spend: f64,
    pub connected_accounts: Vec<String>,
    #[serde(flatten)]
    pub fields: Blob,
}

impl Client {
    /// Build a client on a fresh trial with plan defaults.
    ///
    /// # Arguments
    /// * `plan` - Plan deciding the token allowance
    /// * `fields` - Extra descriptive fields
    /// * `created_at` - Creation instant
    ///
    /// # Returns
    /// Client with a generated id and zeroed usage
    pub fn on_trial(plan: ClientPlan, fields: Blob, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ClientId::new(),
            created_at,
            status: ClientStatus::Trial,
            tokens_used: 0,
            tokens_limit: plan.tokens_limit(),
            monthly_spend: 0.0,
            connected_accounts: Vec::new(),
            fields,
        }
    }

    /// Merge a partial update: present fields replace, absent ones are kept,
    /// extra fields merge key by key.
    pub fn apply(&mut self, update: ClientUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(tokens_used) = update.tokens_used {
            self.tokens_used = tokens_used;
        }
        if let Some(tokens_limit) = update.tokens_limit {
            self.tokens_limit = tokens_limit;
        }
        if let Some(monthly_spend) = update.monthly_spend {
            self.monthly_spend = monthly_spend;
        }
        if let Some(connected_accounts) = update.connected_accounts {
            self.connected_accounts = connected_accounts;
        }
        for (key, value) in update.fields {
            self.fields.insert(key, value);
        }
    }

    /// Record a connected platform once, keeping insertion order.
    ///
    /// # Returns
    /// True if the platform was not connected before
    pub fn connect_account(&mut self, platform: &str) -> bool {
        if self.connected_accounts.iter().any(|p| p == platform) {
            return false;
        }
        self.connected_accounts.push(platform.to_string());
        true
    }

    /// # Returns
    /// True if the platform was connected
    pub fn disconnect_account(&mut self, platform: &str) -> bool {
        let before = self.connected_accounts.len();
        self.connected_accounts.retain(|p| p != platform);
        before != self.connected_accounts.len()
    }
}

/// Partial update for a client. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientUpdate {
    pub status: Option<ClientStatus>,
    pub tokens_used: Option<i64>,
    pub tokens_limit: Option<i64>,
    pub monthly_spend: Option<f64>,
    pub connected_accounts: Option<Vec<String>>,
    pub fields: Blob,
}

/// OAuth credential a client granted for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredential {
    pub client_id: ClientId,
    pub platform: String,
    pub data: Blob,
    pub connected_at: DateTime<Utc>,
    pub connected_by: UserId,
}

/// Campaign run on behalf of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCampaign {
    pub id: String,
    pub client_id: ClientId,
    #[serde(flatten)]
    pub fields: Blob,
}

impl ClientCampaign {
    /// Prepare a replacement set for `client_id`: every campaign is owned by
    /// that client, ids are unique (the last occurrence wins) and the result
    /// is ordered by id.
    pub fn replacement_set(client_id: &ClientId, campaigns: Vec<ClientCampaign>) -> Vec<Self> {
        let mut by_id = BTreeMap::new();
        for mut campaign in campaigns {
            campaign.client_id = client_id.clone();
            by_id.insert(campaign.id.clone(), campaign);
        }
        by_id.into_values().collect()
    }
}

/// Immutable ledger row of token usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingEntry {
    pub timestamp: DateTime<Utc>,
    pub tokens_used: i64,
    pub cost: f64,
    pub admin_id: UserId,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn client() -> Client {
        let mut fields = Blob::new();
        fields.insert("name".to_string(), json!("Acme"));
        fields.insert("plan".to_string(), json!("Pro"));
        Client::on_trial(
            ClientPlan::Pro,
            fields,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_generated_client_id_format() {
        let id = ClientId::new();
        let groups: Vec<&str> = id.as_str().split('-').collect();

        assert_eq!(groups.len(), 3);
        for group in groups {
            let value: u32 = group.parse().unwrap();
            assert!((100..1000).contains(&value));
        }
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(ClientStatus::from("trial"), ClientStatus::Trial);
        assert_eq!(ClientStatus::from("churned"), ClientStatus::Churned);
        assert_eq!(
            ClientStatus::from("onboarding"),
            ClientStatus::Other("onboarding".to_string())
        );
        assert_eq!(String::from(ClientStatus::Paused), "paused");
        assert_eq!(serde_json::to_value(ClientStatus::Active).unwrap(), json!("active"));
    }

    #[test]
    fn test_plan_defaults() {
        assert_eq!(ClientPlan::from_name("Starter").tokens_limit(), 2_500);
        assert_eq!(ClientPlan::from_name("Pro").tokens_limit(), 10_000);
        assert_eq!(ClientPlan::from_name("Enterprise").tokens_limit(), 25_000);
        assert_eq!(ClientPlan::from_name("Custom").tokens_limit(), 25_000);

        let client = client();
        assert_eq!(client.status, ClientStatus::Trial);
        assert_eq!(client.tokens_used, 0);
        assert_eq!(client.tokens_limit, 10_000);
        assert!(client.connected_accounts.is_empty());
    }

    #[test]
    fn test_apply_preserves_unspecified_fields() {
        let mut client = client();
        let mut fields = Blob::new();
        fields.insert("industry".to_string(), json!("Retail"));

        client.apply(ClientUpdate {
            status: Some(ClientStatus::Active),
            fields,
            ..Default::default()
        });

        assert_eq!(client.status, ClientStatus::Active);
        assert_eq!(client.tokens_limit, 10_000);
        assert_eq!(client.fields["name"], "Acme");
        assert_eq!(client.fields["industry"], "Retail");
    }

    #[test]
    fn test_connected_accounts_deduplicated() {
        let mut client = client();

        assert!(client.connect_account("google"));
        assert!(client.connect_account("meta"));
        assert!(!client.connect_account("google"));
        assert_eq!(client.connected_accounts, vec!["google", "meta"]);

        assert!(client.disconnect_account("google"));
        assert!(!client.disconnect_account("google"));
        assert_eq!(client.connected_accounts, vec!["meta"]);
    }

    #[test]
    fn test_replacement_set() {
        let owner = ClientId::from_string("111-222-333");
        let other = ClientId::from_string("999-999-999");
        let campaign = |id: &str, name: &str| {
            let mut fields = Blob::new();
            fields.insert("name".to_string(), json!(name));
            ClientCampaign {
                id: id.to_string(),
                client_id: other.clone(),
                fields,
            }
        };

        let set = ClientCampaign::replacement_set(
            &owner,
            vec![campaign("c2", "first"), campaign("c1", "x"), campaign("c2", "second")],
        );

        assert_eq!(set.len(), 2);
        assert_eq!(set[0].id, "c1");
        assert_eq!(set[1].fields["name"], "second");
        assert!(set.iter().all(|c| c.client_id == owner));
    }
}
