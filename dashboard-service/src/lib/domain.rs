use chrono::DateTime;
use chrono::SubsecRound;
use chrono::Utc;

pub mod account;
pub mod auth;
pub mod client;
pub mod oauth;
pub mod storage;
pub mod user;

/// Free-form ordered record stored alongside typed fields.
pub type Blob = serde_json::Map<String, serde_json::Value>;

/// Current instant at the microsecond precision every backend stores.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
