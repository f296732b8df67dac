use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::Blob;
use crate::domain::user::models::UserId;

/// Integration status stamped on every connected integration.
pub const STATUS_CONNECTED: &str = "connected";

/// Onboarding state, one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupStatus {
    pub is_setup_complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub setup_data: Option<Blob>,
}

impl SetupStatus {
    /// State recorded at sign-up.
    pub fn pending() -> Self {
        Self {
            is_setup_complete: false,
            completed_at: None,
            setup_data: None,
        }
    }

    pub fn completed(setup_data: Blob, completed_at: DateTime<Utc>) -> Self {
        Self {
            is_setup_complete: true,
            completed_at: Some(completed_at),
            setup_data: Some(setup_data),
        }
    }
}

/// Workspace created once a user finishes setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub const DEFAULT_NAME: &'static str = "Default Workspace";

    /// Build the default workspace for a user.
    ///
    /// # Arguments
    /// * `user_id` - Owner of the workspace
    /// * `created_at` - Creation instant, also used in the id
    ///
    /// # Returns
    /// Workspace with id `ws_<user>_<unix millis>`
    pub fn default_for(user_id: &UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("ws_{}_{}", user_id, created_at.timestamp_millis()),
            name: Self::DEFAULT_NAME.to_string(),
            created_at,
        }
    }
}

/// Third-party integration configured by a user, keyed by
/// (user, category, provider).
#[derive(Debug, Clone, PartialEq)]
pub struct Integration {
    pub user_id: UserId,
    pub category: String,
    pub provider: String,
    pub data: Blob,
}

impl Integration {
    /// Stamp connection metadata over the caller's data.
    pub fn connected(
        user_id: UserId,
        category: impl Into<String>,
        provider: impl Into<String>,
        mut data: Blob,
        connected_at: DateTime<Utc>,
    ) -> Self {
        data.insert(
            "connectedAt".to_string(),
            Value::String(connected_at.to_rfc3339()),
        );
        data.insert(
            "status".to_string(),
            Value::String(STATUS_CONNECTED.to_string()),
        );

        Self {
            user_id,
            category: category.into(),
            provider: provider.into(),
            data,
        }
    }
}

/// category -> provider -> data
pub type IntegrationMap = BTreeMap<String, BTreeMap<String, Blob>>;

/// Campaign owned by a user. Everything beyond the key fields is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Blob,
}

impl Campaign {
    /// Campaign ids are `camp_<unix millis>_<random>`, sortable by creation
    /// instant and distinct for campaigns created in the same millisecond.
    pub fn generate_id(created_at: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("camp_{}_{}", created_at.timestamp_millis(), &suffix[..12])
    }
}
