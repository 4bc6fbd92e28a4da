use std::time::Duration;
use tokio::time::Instant;

use super::types::RewardGate;

/// Dwell countdown with a one-shot reward latch per activation episode.
#[derive(Debug, Clone)]
pub struct WatchTimer {
    dwell: Duration,
    gate: RewardGate,
    deadline: Option<Instant>,
    awarded: bool,
    active: bool,
}

impl WatchTimer {
    pub fn new(dwell: Duration, gate: RewardGate) -> Self {
        Self {
            dwell,
            gate,
            deadline: None,
            awarded: false,
            active: false,
        }
    }

    /// Start of an activation episode: the latch resets and no partial
    /// credit from an earlier episode carries over.
    pub fn activate(&mut self, now: Instant) {
        self.active = true;
        self.awarded = false;
        self.deadline = match self.gate {
            RewardGate::WallClock => Some(now + self.dwell),
            RewardGate::ConfirmedPlayback => None,
        };
    }

    /// Playback was confirmed. Only matters for [`RewardGate::ConfirmedPlayback`].
    pub fn on_playing(&mut self, now: Instant) {
        if self.gate == RewardGate::ConfirmedPlayback
            && self.active
            && !self.awarded
            && self.deadline.is_none()
        {
            self.deadline = Some(now + self.dwell);
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_awarded(&self) -> bool {
        self.awarded
    }

    /// Returns true exactly once per episode, when the dwell has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if self.active && !self.awarded && now >= deadline => {
                self.awarded = true;
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
