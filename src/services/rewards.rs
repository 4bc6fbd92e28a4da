use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::backends::{AuthProvider, StatsStore};
use crate::config::PlaybackConfig;
use crate::events::EventBus;
use crate::models::{AggregateStats, UserId, VideoAd, WatchRecord};
use crate::utils::PlaybackError;

/// What happened to a reward after it was counted locally.
#[derive(Debug, Clone, PartialEq)]
pub enum RewardOutcome {
    Persisted(AggregateStats),
    /// Nobody is signed in; the points only exist on this device.
    LocalOnly,
    PersistenceFailed(PlaybackError),
}

/// Turns a completed watch into points.
///
/// Local points always go up first. Persisting is best effort: a failure is
/// logged and published, never retried, and never takes the local points back.
#[derive(Debug)]
pub struct RewardService {
    stats: Arc<dyn StatsStore>,
    auth: Arc<dyn AuthProvider>,
    event_bus: Arc<EventBus>,
    points_per_watch: u64,
    watch_seconds: u64,
    local_points: AtomicU64,
}

impl RewardService {
    pub fn new(
        stats: Arc<dyn StatsStore>,
        auth: Arc<dyn AuthProvider>,
        event_bus: Arc<EventBus>,
        config: &PlaybackConfig,
    ) -> Self {
        Self {
            stats,
            auth,
            event_bus,
            points_per_watch: config.reward_points,
            watch_seconds: config.dwell_seconds,
            local_points: AtomicU64::new(0),
        }
    }

    pub fn local_points(&self) -> u64 {
        self.local_points.load(Ordering::SeqCst)
    }

    /// Replace the local balance, e.g. after a withdrawal or a stats refresh.
    pub async fn set_local_points(&self, total: u64) {
        let previous = self.local_points.swap(total, Ordering::SeqCst);
        if previous != total {
            let delta = total as i64 - previous as i64;
            let _ = self.event_bus.emit_points_changed(total, delta).await;
        }
    }

    /// Pull the signed-in user's balance from the stats store.
    pub async fn refresh_from_backend(&self) -> Result<Option<AggregateStats>> {
        let Some(session) = self.auth.current_session().await else {
            return Ok(None);
        };

        let stats = self.stats.get_aggregate_stats(session.user_id()).await?;
        if let Some(stats) = &stats {
            debug!("Loaded {} point(s) for {}", stats.total_points, session.user_id());
            self.set_local_points(stats.total_points).await;
        }
        Ok(stats)
    }

    /// The signed-in user's latest watches, newest first. Empty when signed out.
    pub async fn recent_watches(&self, limit: usize) -> Result<Vec<WatchRecord>> {
        match self.auth.current_session().await {
            Some(session) => self.stats.get_watch_history(session.user_id(), limit).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn on_watched(&self, ad: &VideoAd) -> RewardOutcome {
        let points = self.points_per_watch;
        let total = self.local_points.fetch_add(points, Ordering::SeqCst) + points;
        info!("Reward for {} ({}): {} point(s), {} total", ad.id, ad.brand, points, total);

        let _ = self
            .event_bus
            .emit_reward_earned(ad.id.clone(), ad.brand.clone(), points)
            .await;
        let _ = self.event_bus.emit_points_changed(total, points as i64).await;

        let Some(session) = self.auth.current_session().await else {
            debug!("No session, reward for {} kept locally", ad.id);
            let _ = self
                .event_bus
                .emit_sign_in_required(ad.id.clone(), ad.brand.clone(), points)
                .await;
            return RewardOutcome::LocalOnly;
        };

        match self.persist(session.user_id(), ad, points).await {
            Ok(stats) => RewardOutcome::Persisted(stats),
            Err(e) => {
                let error = PlaybackError::PersistenceFailure(format!("{:#}", e));
                warn!("Reward for {} not saved: {}", ad.id, error);
                let _ = self
                    .event_bus
                    .emit_persistence_failed("record_watch", error.to_string())
                    .await;
                RewardOutcome::PersistenceFailed(error)
            }
        }
    }

    async fn persist(
        &self,
        user: &UserId,
        ad: &VideoAd,
        points: u64,
    ) -> Result<AggregateStats> {
        // Both writes are attempted even when one fails; the first error wins.
        let (stats, recorded) = tokio::join!(
            self.stats
                .increment_aggregate_stats(user, points, self.watch_seconds),
            self.stats
                .record_watch(user, &ad.id, &ad.brand, points, self.watch_seconds),
        );
        let stats = stats?;
        recorded?;
        Ok(stats)
    }
}
