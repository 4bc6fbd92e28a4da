use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::AdId;

/// Main feed event type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    pub id: String,
    pub event_type: EventType,
    pub payload: EventPayload,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: EventSource,
    pub priority: EventPriority,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FeedEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            payload,
            timestamp: chrono::Utc::now(),
            source: EventSource::Feed,
            priority: EventPriority::Normal,
            metadata: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: String, value: serde_json::Value) -> Self {
        self.metadata.insert(key, value);
        self
    }
}

/// Event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    // Feed events
    ActiveSlotChanged,
    FeedExtended,

    // Slot events
    SlotFailed,
    SlotRecovered,

    // Reward events
    RewardEarned,
    PointsChanged,
    SignInRequired,
    PersistenceFailed,

    // Account events
    SessionChanged,
    WithdrawalRequested,
}

/// Event payload containing specific data for each event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Slot {
        index: usize,
        ad_id: AdId,
    },
    Reward {
        ad_id: AdId,
        brand: String,
        points: u64,
    },
    Points {
        total: u64,
        delta: i64,
    },
    Failure {
        index: usize,
        ad_id: AdId,
        error: String,
    },
    Feed {
        added: usize,
        length: usize,
    },
    Persistence {
        operation: String,
        error: String,
    },
    Session {
        user_id: Option<String>,
    },
    Withdrawal {
        id: Option<String>,
        amount: f64,
        points_used: u64,
    },
}

/// Event source indicating where the event originated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventSource {
    Feed,
    Slot(usize),
    Service(String),
    Backend(String),
}

/// Event priority for processing order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub enum EventPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl EventType {
    /// Get a string representation for filtering/routing
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ActiveSlotChanged => "feed.active_changed",
            EventType::FeedExtended => "feed.extended",
            EventType::SlotFailed => "slot.failed",
            EventType::SlotRecovered => "slot.recovered",
            EventType::RewardEarned => "reward.earned",
            EventType::PointsChanged => "reward.points_changed",
            EventType::SignInRequired => "reward.sign_in_required",
            EventType::PersistenceFailed => "reward.persistence_failed",
            EventType::SessionChanged => "account.session_changed",
            EventType::WithdrawalRequested => "account.withdrawal_requested",
        }
    }
}
