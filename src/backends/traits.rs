use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::models::{
    AdId, AggregateStats, Session, UserId, VideoAd, WatchRecord, WithdrawalRequest,
};

/// Per-user aggregate stats and watch history.
#[async_trait]
pub trait StatsStore: Send + Sync + std::fmt::Debug {
    async fn record_watch(
        &self,
        user: &UserId,
        ad_id: &AdId,
        brand: &str,
        points: u64,
        duration_seconds: u64,
    ) -> Result<()>;

    /// Add to the running totals, creating the row on first use.
    async fn increment_aggregate_stats(
        &self,
        user: &UserId,
        points: u64,
        watch_seconds: u64,
    ) -> Result<AggregateStats>;

    /// `None` when the user has never watched anything.
    async fn get_aggregate_stats(&self, user: &UserId) -> Result<Option<AggregateStats>>;

    /// Most recent first.
    async fn get_watch_history(&self, user: &UserId, limit: usize) -> Result<Vec<WatchRecord>>;

    /// Overwrite the points balance. Used when points are cashed out.
    async fn set_total_points(&self, user: &UserId, total_points: u64) -> Result<()>;

    /// The payout account saved on the user's profile, if any.
    async fn get_payout_id(&self, user: &UserId) -> Result<Option<String>>;

    async fn set_payout_id(&self, user: &UserId, payout_id: &str) -> Result<()>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync + std::fmt::Debug {
    async fn current_session(&self) -> Option<Session>;

    /// Notified on every sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// Where more ads come from when the feed runs low.
#[async_trait]
pub trait AdSource: Send + Sync + std::fmt::Debug {
    /// The next batch to append. An empty batch means nothing more right now.
    async fn fetch_more(&self) -> Result<Vec<VideoAd>>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync + std::fmt::Debug {
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<WithdrawalRequest>;

    /// Most recent first.
    async fn list_withdrawals(&self, user: &UserId, limit: usize) -> Result<Vec<WithdrawalRequest>>;
}
