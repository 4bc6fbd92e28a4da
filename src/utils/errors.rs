use thiserror::Error;

use crate::player::LoadState;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Withdrawal rejected: {0}")]
    Withdrawal(#[from] WithdrawalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures a single feed slot can run into.
///
/// None of these ever leave the slot: they are logged, and the fatal ones are
/// published as `SlotFailed` so the slot can offer a manual retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Every candidate source failed to load.
    #[error("no playable source among {candidates} candidate(s)")]
    SourceExhausted { candidates: usize },

    /// The platform refused a play request (autoplay policy, not enough data).
    #[error("play request rejected: {0}")]
    PlayRejected(String),

    /// Playback froze twice within one activation.
    #[error("playback stalled again after a reload")]
    StallTimeout,

    /// The stats backend did not accept a watch record.
    #[error("failed to persist watch: {0}")]
    PersistenceFailure(String),
}

/// An operation was requested from a load state that does not allow it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot {operation} while {state:?}")]
pub struct TransitionError {
    pub operation: &'static str,
    pub state: LoadState,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WithdrawalError {
    #[error("please enter a valid amount")]
    InvalidAmount,

    #[error("minimum withdrawal amount is ${minimum:.2}")]
    BelowMinimum { minimum: f64 },

    #[error("insufficient points: {needed} needed, {available} available")]
    InsufficientPoints { needed: u64, available: u64 },

    #[error("a payout method and payout details are required")]
    MissingPayout,
}
