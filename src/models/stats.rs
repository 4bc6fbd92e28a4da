use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{AdId, UserId};

/// Per-user running totals, stored in the `user_stats` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    #[serde(rename = "total_ads_watched")]
    pub total_watched: u64,
    #[serde(rename = "total_points_earned")]
    pub total_points: u64,
    #[serde(rename = "total_watch_time_seconds", default)]
    pub total_watch_seconds: u64,
}

/// One row of `watch_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: UserId,
    pub ad_id: AdId,
    pub brand: String,
    pub points_earned: u64,
    pub watch_duration_seconds: u64,
    #[serde(default)]
    pub watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

/// One row of `withdrawal_requests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: UserId,
    pub amount: f64,
    pub points_used: u64,
    pub payout_method: String,
    pub payout_details: HashMap<String, String>,
    pub status: WithdrawalStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}
