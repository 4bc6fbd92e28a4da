use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::backends::traits::{AuthProvider, StatsStore, WithdrawalStore};
use crate::models::{
    AdId, AggregateStats, Session, User, UserId, WatchRecord, WithdrawalRequest,
};

/// Stats and withdrawals kept in process memory, for running without a
/// hosted backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stats: RwLock<HashMap<UserId, AggregateStats>>,
    history: RwLock<HashMap<UserId, Vec<WatchRecord>>>,
    withdrawals: RwLock<HashMap<UserId, Vec<WithdrawalRequest>>>,
    payout_ids: RwLock<HashMap<UserId, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn record_watch(
        &self,
        user: &UserId,
        ad_id: &AdId,
        brand: &str,
        points: u64,
        duration_seconds: u64,
    ) -> Result<()> {
        let record = WatchRecord {
            id: Some(Uuid::new_v4().to_string()),
            user_id: user.clone(),
            ad_id: ad_id.clone(),
            brand: brand.to_string(),
            points_earned: points,
            watch_duration_seconds: duration_seconds,
            watched_at: Some(Utc::now()),
        };
        self.history
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn increment_aggregate_stats(
        &self,
        user: &UserId,
        points: u64,
        watch_seconds: u64,
    ) -> Result<AggregateStats> {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(user.clone()).or_default();
        entry.total_watched += 1;
        entry.total_points += points;
        entry.total_watch_seconds += watch_seconds;
        Ok(entry.clone())
    }

    async fn get_aggregate_stats(&self, user: &UserId) -> Result<Option<AggregateStats>> {
        Ok(self.stats.read().await.get(user).cloned())
    }

    async fn get_watch_history(&self, user: &UserId, limit: usize) -> Result<Vec<WatchRecord>> {
        let history = self.history.read().await;
        Ok(history
            .get(user)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn set_total_points(&self, user: &UserId, total_points: u64) -> Result<()> {
        self.stats
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .total_points = total_points;
        Ok(())
    }

    async fn get_payout_id(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.payout_ids.read().await.get(user).cloned())
    }

    async fn set_payout_id(&self, user: &UserId, payout_id: &str) -> Result<()> {
        self.payout_ids
            .write()
            .await
            .insert(user.clone(), payout_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<WithdrawalRequest> {
        let mut stored = request.clone();
        stored.id = Some(Uuid::new_v4().to_string());
        stored.created_at = Some(Utc::now());

        self.withdrawals
            .write()
            .await
            .entry(request.user_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_withdrawals(&self, user: &UserId, limit: usize) -> Result<Vec<WithdrawalRequest>> {
        let withdrawals = self.withdrawals.read().await;
        Ok(withdrawals
            .get(user)
            .map(|requests| requests.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// A session that never talks to a server. Signed out until told otherwise.
#[derive(Debug)]
pub struct LocalAuth {
    session: watch::Sender<Option<Session>>,
}

impl Default for LocalAuth {
    fn default() -> Self {
        let (session, _) = watch::channel(None);
        Self { session }
    }
}

impl LocalAuth {
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Signed in as a device-local profile.
    pub fn signed_in(user_id: impl Into<UserId>) -> Self {
        let auth = Self::default();
        auth.sign_in(user_id);
        auth
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        self.session.send_replace(Some(Session {
            access_token: String::new(),
            refresh_token: None,
            expires_in: None,
            user: User {
                id: user_id.into(),
                email: None,
            },
        }));
    }

    pub fn sign_out(&self) {
        self.session.send_replace(None);
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }
}
