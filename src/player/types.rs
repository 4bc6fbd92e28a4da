/// Common types shared by the resolver, the state machine and the slot controller
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
}

impl DeviceClass {
    pub fn is_mobile(&self) -> bool {
        matches!(self, DeviceClass::Mobile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkHint {
    #[default]
    Fast,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadState {
    Unstarted,
    Loading,
    Ready,
    Playing,
    Stalled,
    Errored,
}

impl LoadState {
    /// Media is attached and decodable: the states a play request accepts.
    pub fn is_playable(&self) -> bool {
        matches!(self, LoadState::Ready | LoadState::Stalled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Unstarted => "unstarted",
            LoadState::Loading => "loading",
            LoadState::Ready => "ready",
            LoadState::Playing => "playing",
            LoadState::Stalled => "stalled",
            LoadState::Errored => "errored",
        }
    }
}

/// How far along the platform is in buffering the attached source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadinessLevel {
    /// Duration and dimensions known.
    Metadata,
    /// First frame decoded.
    FirstFrame,
    /// Enough buffered to start without an immediate stall.
    CanPlay,
}

impl ReadinessLevel {
    /// Touch platforms often never report deeper buffering before a user
    /// gesture, so they settle for metadata.
    pub fn required_for(device: DeviceClass) -> Self {
        match device {
            DeviceClass::Mobile => ReadinessLevel::Metadata,
            DeviceClass::Desktop => ReadinessLevel::CanPlay,
        }
    }
}

/// What has to be true before the dwell countdown may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardGate {
    /// Count from activation whether or not playback started.
    #[default]
    WallClock,
    /// Count from the first confirmed playback within the activation.
    ConfirmedPlayback,
}
