use super::types::{EventPayload, EventPriority, EventSource, EventType, FeedEvent};
use crate::models::AdId;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<FeedEvent>,
    filter: Option<EventFilter>,
}

impl EventSubscriber {
    /// Create a new subscriber with an optional filter
    pub fn new(receiver: broadcast::Receiver<FeedEvent>, filter: Option<EventFilter>) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<FeedEvent> {
        loop {
            let event = self.receiver.recv().await?;

            // Check if event matches filter
            if let Some(ref filter) = self.filter {
                if filter.matches(&event) {
                    return Ok(event);
                }
            } else {
                return Ok(event);
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<FeedEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if let Some(ref filter) = self.filter {
                        if filter.matches(&event) {
                            return Ok(Some(event));
                        }
                        // Continue to next event
                    } else {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone)]
pub struct EventFilter {
    event_types: Option<Vec<EventType>>,
    sources: Option<Vec<String>>,
    min_priority: Option<EventPriority>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            event_types: None,
            sources: None,
            min_priority: None,
        }
    }

    pub fn with_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_min_priority(mut self, priority: EventPriority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn matches(&self, event: &FeedEvent) -> bool {
        // Check event type
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }

        // Check source
        if let Some(ref sources) = self.sources {
            let event_source = format!("{:?}", event.source);
            if !sources.iter().any(|s| event_source.contains(s)) {
                return false;
            }
        }

        // Check priority
        if let Some(min_priority) = self.min_priority
            && event.priority < min_priority
        {
            return false;
        }

        true
    }
}

/// Broadcast bus for feed events
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<FeedEvent>,
    stats: Arc<RwLock<EventBusStats>>,
    event_history: Arc<RwLock<Vec<FeedEvent>>>,
    max_history_size: usize,
}

#[derive(Debug, Default)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub subscriber_count: usize,
    pub dropped_events: u64,
}

impl EventBus {
    /// Create a new event bus with specified buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
            event_history: Arc::new(RwLock::new(Vec::new())),
            max_history_size: 100, // Keep last 100 events for debugging
        }
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: FeedEvent) -> Result<()> {
        trace!(
            "Publishing event: {:?} with priority {:?}",
            event.event_type, event.priority
        );

        // Update stats
        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            let event_type_str = event.event_type.as_str().to_string();
            *stats.events_by_type.entry(event_type_str).or_insert(0) += 1;
        }

        // Add to history
        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());

            // Trim history if needed
            if history.len() > self.max_history_size {
                let excess = history.len() - self.max_history_size;
                history.drain(0..excess);
            }
        }

        // Send event
        match self.sender.send(event) {
            Ok(_count) => {
                // Successfully sent
                Ok(())
            }
            Err(_) => {
                // No subscribers is normal, don't log
                let mut stats = self.stats.write().await;
                stats.dropped_events += 1;
                Ok(()) // Don't fail if no subscribers
            }
        }
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(filter))
    }

    /// Subscribe to specific event types
    pub fn subscribe_to_types(&self, types: Vec<EventType>) -> EventSubscriber {
        let filter = EventFilter::new().with_types(types);
        self.subscribe_filtered(filter)
    }

    /// Get current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get event bus statistics
    pub async fn get_stats(&self) -> EventBusStats {
        let stats = self.stats.read().await;
        EventBusStats {
            total_events: stats.total_events,
            events_by_type: stats.events_by_type.clone(),
            subscriber_count: self.subscriber_count(),
            dropped_events: stats.dropped_events,
        }
    }

    /// Get event history for debugging
    pub async fn get_history(&self) -> Vec<FeedEvent> {
        self.event_history.read().await.clone()
    }

    /// Clear event history
    pub async fn clear_history(&self) {
        self.event_history.write().await.clear();
    }

    pub async fn emit_active_slot_changed(&self, index: usize, ad_id: AdId) -> Result<()> {
        let event = FeedEvent::new(
            EventType::ActiveSlotChanged,
            EventPayload::Slot { index, ad_id },
        );
        self.publish(event).await
    }

    pub async fn emit_feed_extended(&self, added: usize, length: usize) -> Result<()> {
        let event = FeedEvent::new(EventType::FeedExtended, EventPayload::Feed { added, length });
        self.publish(event).await
    }

    pub async fn emit_slot_failed(&self, index: usize, ad_id: AdId, error: String) -> Result<()> {
        let event = FeedEvent::new(
            EventType::SlotFailed,
            EventPayload::Failure {
                index,
                ad_id,
                error,
            },
        )
        .with_source(EventSource::Slot(index))
        .with_priority(EventPriority::High);
        self.publish(event).await
    }

    pub async fn emit_slot_recovered(&self, index: usize, ad_id: AdId) -> Result<()> {
        let event = FeedEvent::new(EventType::SlotRecovered, EventPayload::Slot { index, ad_id })
            .with_source(EventSource::Slot(index));
        self.publish(event).await
    }

    pub async fn emit_reward_earned(&self, ad_id: AdId, brand: String, points: u64) -> Result<()> {
        let event = FeedEvent::new(
            EventType::RewardEarned,
            EventPayload::Reward {
                ad_id,
                brand,
                points,
            },
        )
        .with_source(EventSource::Service("rewards".to_string()));
        self.publish(event).await
    }

    pub async fn emit_points_changed(&self, total: u64, delta: i64) -> Result<()> {
        let event = FeedEvent::new(EventType::PointsChanged, EventPayload::Points { total, delta })
            .with_source(EventSource::Service("rewards".to_string()));
        self.publish(event).await
    }

    /// A reward was earned locally but there is no session to persist it under.
    pub async fn emit_sign_in_required(&self, ad_id: AdId, brand: String, points: u64) -> Result<()> {
        let event = FeedEvent::new(
            EventType::SignInRequired,
            EventPayload::Reward {
                ad_id,
                brand,
                points,
            },
        )
        .with_source(EventSource::Service("rewards".to_string()))
        .with_priority(EventPriority::Low);
        self.publish(event).await
    }

    pub async fn emit_persistence_failed(&self, operation: &str, error: String) -> Result<()> {
        let event = FeedEvent::new(
            EventType::PersistenceFailed,
            EventPayload::Persistence {
                operation: operation.to_string(),
                error,
            },
        )
        .with_source(EventSource::Backend("stats".to_string()))
        .with_priority(EventPriority::High);
        self.publish(event).await
    }

    pub async fn emit_session_changed(&self, user_id: Option<String>) -> Result<()> {
        let event = FeedEvent::new(EventType::SessionChanged, EventPayload::Session { user_id })
            .with_source(EventSource::Service("auth".to_string()));
        self.publish(event).await
    }

    pub async fn emit_withdrawal_requested(
        &self,
        id: Option<String>,
        amount: f64,
        points_used: u64,
    ) -> Result<()> {
        let event = FeedEvent::new(
            EventType::WithdrawalRequested,
            EventPayload::Withdrawal {
                id,
                amount,
                points_used,
            },
        )
        .with_source(EventSource::Service("withdrawals".to_string()));
        self.publish(event).await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
