use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backends::{StatsStore, WithdrawalStore};
use crate::events::EventBus;
use crate::models::{UserId, WithdrawalRequest, WithdrawalStatus};
use crate::utils::WithdrawalError;

/// Cash value of one point.
pub const POINT_VALUE_USD: f64 = 0.001;
pub const MIN_WITHDRAWAL_USD: f64 = 0.10;
pub const HISTORY_LIMIT: usize = 20;
/// The payout method the saved profile id belongs to.
pub const SAVED_PAYOUT_METHOD: &str = "revolut";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalQuote {
    pub amount: f64,
    pub points_needed: u64,
    pub points_available: u64,
}

pub fn points_to_usd(points: u64) -> f64 {
    points as f64 * POINT_VALUE_USD
}

/// Points needed to cash out `amount` dollars.
pub fn points_for(amount: f64) -> u64 {
    // Absorb float noise so that 0.10 / 0.001 is 100, not 101.
    (amount / POINT_VALUE_USD - 1e-9).ceil().max(0.0) as u64
}

pub fn quote(amount: f64, points_available: u64) -> Result<WithdrawalQuote, WithdrawalError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(WithdrawalError::InvalidAmount);
    }
    if amount + 1e-9 < MIN_WITHDRAWAL_USD {
        return Err(WithdrawalError::BelowMinimum {
            minimum: MIN_WITHDRAWAL_USD,
        });
    }

    let points_needed = points_for(amount);
    if points_needed > points_available {
        return Err(WithdrawalError::InsufficientPoints {
            needed: points_needed,
            available: points_available,
        });
    }

    Ok(WithdrawalQuote {
        amount,
        points_needed,
        points_available,
    })
}

/// Cash-out requests against the points balance.
#[derive(Debug)]
pub struct WithdrawalService {
    store: Arc<dyn WithdrawalStore>,
    stats: Arc<dyn StatsStore>,
    event_bus: Arc<EventBus>,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn WithdrawalStore>,
        stats: Arc<dyn StatsStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            stats,
            event_bus,
        }
    }

    pub async fn available_points(&self, user: &UserId) -> Result<u64> {
        Ok(self
            .stats
            .get_aggregate_stats(user)
            .await?
            .map(|stats| stats.total_points)
            .unwrap_or(0))
    }

    pub async fn saved_payout_id(&self, user: &UserId) -> Result<Option<String>> {
        self.stats.get_payout_id(user).await
    }

    pub async fn save_payout_id(&self, user: &UserId, payout_id: &str) -> Result<()> {
        let payout_id = payout_id.trim();
        if payout_id.is_empty() {
            return Err(WithdrawalError::MissingPayout.into());
        }
        self.stats.set_payout_id(user, payout_id).await?;
        info!("Saved payout id for {}", user);
        Ok(())
    }

    /// Files a pending request, then takes `points_used` off the balance.
    ///
    /// Empty `payout_details` for the saved payout method fall back to the
    /// id stored on the profile.
    pub async fn request_withdrawal(
        &self,
        user: &UserId,
        amount: f64,
        points_used: u64,
        payout_method: &str,
        payout_details: HashMap<String, String>,
    ) -> Result<WithdrawalRequest> {
        let payout_method = payout_method.trim();
        if payout_method.is_empty() {
            return Err(WithdrawalError::MissingPayout.into());
        }
        let payout_details = self
            .payout_details_or_saved(user, payout_method, payout_details)
            .await?;

        let available = self.available_points(user).await?;
        let quote = quote(amount, available)?;
        if points_used < quote.points_needed || points_used > available {
            return Err(WithdrawalError::InsufficientPoints {
                needed: quote.points_needed.max(points_used),
                available,
            }
            .into());
        }

        let request = WithdrawalRequest {
            id: None,
            user_id: user.clone(),
            amount,
            points_used,
            payout_method: payout_method.to_string(),
            payout_details,
            status: WithdrawalStatus::Pending,
            created_at: None,
            processed_at: None,
            notes: None,
        };

        let stored = self.store.insert_withdrawal(&request).await?;
        let remaining = available - points_used;
        self.stats
            .set_total_points(user, remaining)
            .await
            .context("Withdrawal filed but the points balance was not updated")?;

        info!(
            "Withdrawal of ${:.2} ({} points) filed for {}",
            amount, points_used, user
        );
        let _ = self
            .event_bus
            .emit_withdrawal_requested(stored.id.clone(), amount, points_used)
            .await;
        let _ = self
            .event_bus
            .emit_points_changed(remaining, -(points_used as i64))
            .await;

        Ok(stored)
    }

    async fn payout_details_or_saved(
        &self,
        user: &UserId,
        payout_method: &str,
        payout_details: HashMap<String, String>,
    ) -> Result<HashMap<String, String>> {
        if payout_details.values().any(|v| !v.trim().is_empty()) {
            return Ok(payout_details);
        }
        if payout_method != SAVED_PAYOUT_METHOD {
            return Err(WithdrawalError::MissingPayout.into());
        }

        match self.stats.get_payout_id(user).await? {
            Some(saved) => {
                debug!("Using saved payout id for {}", user);
                Ok(HashMap::from([(payout_method.to_string(), saved)]))
            }
            None => Err(WithdrawalError::MissingPayout.into()),
        }
    }

    pub async fn get_withdrawal_history(&self, user: &UserId) -> Result<Vec<WithdrawalRequest>> {
        self.store.list_withdrawals(user, HISTORY_LIMIT).await
    }
}
