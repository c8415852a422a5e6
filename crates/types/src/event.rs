//! Activity events and the calendar keys derived from their timestamps.
//!
//! An [`ActivityEvent`] is the validated input handed to the reward
//! coordinator by the API layer. It is never persisted as-is; only its
//! effects (pool debit, daily usage, idempotency record, balance credit)
//! are durable.

use crate::scalars::UserAddress;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Participant role for an activity event. Also the sub-pool key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Listener,
    Artist,
}

/// One completed listening/performing session.
///
/// `event_id` identifies the logical occurrence: retries of the same
/// session must reuse the same id, which is what makes resubmission safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: String,
    pub user_address: UserAddress,
    pub role: Role,
    pub content_id: String,
    pub duration_seconds: u64,
    /// Unix seconds (UTC) at which the session completed.
    pub occurred_at: u64,
}

/// Emission-period key ("YYYY-MM", UTC) for a unix timestamp.
/// Returns None for timestamps chrono cannot represent.
pub fn period_key_for(unix_seconds: u64) -> Option<String> {
    let ts = i64::try_from(unix_seconds).ok()?;
    let dt = Utc.timestamp_opt(ts, 0).single()?;
    Some(dt.format("%Y-%m").to_string())
}

/// Calendar-day key ("YYYY-MM-DD", UTC) for a unix timestamp.
pub fn day_key_for(unix_seconds: u64) -> Option<String> {
    let ts = i64::try_from(unix_seconds).ok()?;
    let dt = Utc.timestamp_opt(ts, 0).single()?;
    Some(dt.format("%Y-%m-%d").to_string())
}
