mod api;
mod auth;

pub use api::SupabaseApi;
pub use auth::SupabaseAuth;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::traits::{StatsStore, WithdrawalStore};
use crate::config::BackendConfig;
use crate::models::{AdId, AggregateStats, UserId, WatchRecord, WithdrawalRequest};
use crate::utils::AppError;

const USER_STATS: &str = "user_stats";
const WATCH_HISTORY: &str = "watch_history";
const WITHDRAWAL_REQUESTS: &str = "withdrawal_requests";

#[derive(Debug, Serialize)]
struct NewWatchRecord<'a> {
    user_id: &'a UserId,
    ad_id: &'a AdId,
    brand: &'a str,
    points_earned: u64,
    watch_duration_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct PayoutRow {
    revolut_id: Option<String>,
}

/// Stats and withdrawals stored in the hosted backend's tables.
#[derive(Clone, Debug)]
pub struct SupabaseBackend {
    api: SupabaseApi,
}

impl SupabaseBackend {
    pub fn new(api: SupabaseApi) -> Self {
        Self { api }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let anon_key = config
            .anon_key
            .as_deref()
            .ok_or_else(|| AppError::Configuration("backend.anon_key is not set".to_string()))?;
        let api = SupabaseApi::new(&config.url, anon_key, config.timeout())?;
        info!("Using hosted backend at {}", config.url);
        Ok(Self::new(api))
    }

    pub fn api(&self) -> &SupabaseApi {
        &self.api
    }

    fn user_filter(user: &UserId) -> (&'static str, String) {
        ("user_id", format!("eq.{}", user))
    }
}

#[async_trait]
impl StatsStore for SupabaseBackend {
    async fn record_watch(
        &self,
        user: &UserId,
        ad_id: &AdId,
        brand: &str,
        points: u64,
        duration_seconds: u64,
    ) -> Result<()> {
        let record = NewWatchRecord {
            user_id: user,
            ad_id,
            brand,
            points_earned: points,
            watch_duration_seconds: duration_seconds,
        };
        let _: WatchRecord = self
            .api
            .insert(WATCH_HISTORY, &record)
            .await
            .context("Failed to record watch")?;
        Ok(())
    }

    async fn increment_aggregate_stats(
        &self,
        user: &UserId,
        points: u64,
        watch_seconds: u64,
    ) -> Result<AggregateStats> {
        let next = match self.get_aggregate_stats(user).await? {
            Some(current) => {
                let next = AggregateStats {
                    total_watched: current.total_watched + 1,
                    total_points: current.total_points + points,
                    total_watch_seconds: current.total_watch_seconds + watch_seconds,
                };
                self.api
                    .update(USER_STATS, &[Self::user_filter(user)], &next)
                    .await
                    .context("Failed to update user stats")?;
                next
            }
            None => {
                let first = AggregateStats {
                    total_watched: 1,
                    total_points: points,
                    total_watch_seconds: watch_seconds,
                };
                let mut row = serde_json::to_value(&first)?;
                row["user_id"] = json!(user);
                let _: serde_json::Value = self
                    .api
                    .insert(USER_STATS, &row)
                    .await
                    .context("Failed to create user stats")?;
                first
            }
        };

        debug!("Stats for {} now {:?}", user, next);
        Ok(next)
    }

    async fn get_aggregate_stats(&self, user: &UserId) -> Result<Option<AggregateStats>> {
        let rows: Vec<AggregateStats> = self
            .api
            .select(
                USER_STATS,
                &[("select", "*".to_string()), Self::user_filter(user)],
            )
            .await
            .context("Failed to load user stats")?;
        Ok(rows.into_iter().next())
    }

    async fn get_watch_history(&self, user: &UserId, limit: usize) -> Result<Vec<WatchRecord>> {
        self.api
            .select(
                WATCH_HISTORY,
                &[
                    ("select", "*".to_string()),
                    Self::user_filter(user),
                    ("order", "watched_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await
            .context("Failed to load watch history")
    }

    async fn set_total_points(&self, user: &UserId, total_points: u64) -> Result<()> {
        self.api
            .update(
                USER_STATS,
                &[Self::user_filter(user)],
                &json!({ "total_points_earned": total_points }),
            )
            .await
            .context("Failed to update points balance")
    }

    async fn get_payout_id(&self, user: &UserId) -> Result<Option<String>> {
        let rows: Vec<PayoutRow> = self
            .api
            .select(
                USER_STATS,
                &[("select", "revolut_id".to_string()), Self::user_filter(user)],
            )
            .await
            .context("Failed to load payout id")?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.revolut_id)
            .filter(|id| !id.trim().is_empty()))
    }

    async fn set_payout_id(&self, user: &UserId, payout_id: &str) -> Result<()> {
        let rows: Vec<PayoutRow> = self
            .api
            .select(
                USER_STATS,
                &[("select", "revolut_id".to_string()), Self::user_filter(user)],
            )
            .await
            .context("Failed to load payout id")?;

        if rows.is_empty() {
            // No stats yet; the row starts with zero totals.
            let _: serde_json::Value = self
                .api
                .insert(USER_STATS, &json!({ "user_id": user, "revolut_id": payout_id }))
                .await
                .context("Failed to save payout id")?;
        } else {
            self.api
                .update(
                    USER_STATS,
                    &[Self::user_filter(user)],
                    &json!({ "revolut_id": payout_id }),
                )
                .await
                .context("Failed to save payout id")?;
        }
        debug!("Saved payout id for {}", user);
        Ok(())
    }
}

#[async_trait]
impl WithdrawalStore for SupabaseBackend {
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<WithdrawalRequest> {
        let mut row = serde_json::to_value(request)?;
        if let Some(row) = row.as_object_mut() {
            // Let the table assign these.
            for key in ["id", "created_at", "processed_at", "notes"] {
                row.remove(key);
            }
        }

        self.api
            .insert(WITHDRAWAL_REQUESTS, &row)
            .await
            .context("Failed to create withdrawal request")
    }

    async fn list_withdrawals(&self, user: &UserId, limit: usize) -> Result<Vec<WithdrawalRequest>> {
        self.api
            .select(
                WITHDRAWAL_REQUESTS,
                &[
                    ("select", "*".to_string()),
                    Self::user_filter(user),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await
            .context("Failed to load withdrawal history")
    }
}
