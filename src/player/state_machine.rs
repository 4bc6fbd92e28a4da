use tracing::{debug, warn};

use super::types::{DeviceClass, LoadState, ReadinessLevel};
use crate::models::MediaSource;
use crate::utils::{PlaybackError, TransitionError};

/// What the owner has to do after a stall was reported.
#[derive(Debug, Clone, PartialEq)]
pub enum StallOutcome {
    Ignored,
    /// Replay the attach with the same candidates.
    Reload(Vec<MediaSource>),
    Fatal(PlaybackError),
}

/// What the owner has to do after a source failure was reported.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    Ignored,
    /// The platform is trying the next candidate; arm the fallback timeout.
    AwaitFallback,
    Fatal(PlaybackError),
}

/// Load/play states of one slot.
///
/// `Unstarted → Loading → {Ready, Errored}`, then `Ready ⇄ Playing ⇄ Stalled`.
/// `Errored` only leaves through [`LoadStateMachine::retry`].
#[derive(Debug, Clone)]
pub struct LoadStateMachine {
    state: LoadState,
    required_readiness: ReadinessLevel,
    candidates: Vec<MediaSource>,
    stall_reloads: u32,
    awaiting_fallback: bool,
    failure: Option<PlaybackError>,
}

impl LoadStateMachine {
    pub fn new(device: DeviceClass) -> Self {
        Self {
            state: LoadState::Unstarted,
            required_readiness: ReadinessLevel::required_for(device),
            candidates: Vec::new(),
            stall_reloads: 0,
            awaiting_fallback: false,
            failure: None,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn candidates(&self) -> &[MediaSource] {
        &self.candidates
    }

    pub fn failure(&self) -> Option<&PlaybackError> {
        self.failure.as_ref()
    }

    pub fn awaiting_fallback(&self) -> bool {
        self.awaiting_fallback
    }

    pub fn attach(&mut self, candidates: Vec<MediaSource>) -> Result<(), TransitionError> {
        if self.state != LoadState::Unstarted {
            return Err(self.reject("attach"));
        }
        self.candidates = candidates;
        self.awaiting_fallback = false;
        self.set_state(LoadState::Loading);
        Ok(())
    }

    /// A new activation episode: the stall allowance starts over.
    pub fn begin_episode(&mut self) {
        self.stall_reloads = 0;
    }

    /// Returns true when this signal made the media playable.
    pub fn on_readiness(&mut self, level: ReadinessLevel) -> bool {
        if level < self.required_readiness {
            return false;
        }
        match self.state {
            LoadState::Loading | LoadState::Stalled => {
                self.awaiting_fallback = false;
                self.set_state(LoadState::Ready);
                true
            }
            // Already playable: the fallback candidate took over.
            LoadState::Ready | LoadState::Playing => {
                self.awaiting_fallback = false;
                false
            }
            _ => false,
        }
    }

    /// Play was accepted or the platform reports playback.
    pub fn on_playing(&mut self) -> Result<(), TransitionError> {
        match self.state {
            LoadState::Ready | LoadState::Stalled => {
                self.awaiting_fallback = false;
                self.set_state(LoadState::Playing);
                Ok(())
            }
            LoadState::Loading => {
                // Playback started before the readiness threshold was reported.
                self.awaiting_fallback = false;
                self.set_state(LoadState::Ready);
                self.set_state(LoadState::Playing);
                Ok(())
            }
            LoadState::Playing => Ok(()),
            _ => Err(self.reject("play")),
        }
    }

    pub fn on_paused(&mut self) {
        if self.state == LoadState::Playing {
            self.set_state(LoadState::Ready);
        }
    }

    pub fn on_stall(&mut self) -> StallOutcome {
        if self.state != LoadState::Playing {
            return StallOutcome::Ignored;
        }

        if self.stall_reloads == 0 {
            self.stall_reloads += 1;
            self.set_state(LoadState::Stalled);
            StallOutcome::Reload(self.candidates.clone())
        } else {
            warn!("Playback stalled again within the same activation");
            StallOutcome::Fatal(self.fail(PlaybackError::StallTimeout))
        }
    }

    pub fn on_source_failed(&mut self, remaining: usize) -> FailureOutcome {
        if matches!(self.state, LoadState::Unstarted | LoadState::Errored) {
            return FailureOutcome::Ignored;
        }

        if remaining > 0 {
            debug!("Source failed, {} candidate(s) left", remaining);
            self.awaiting_fallback = true;
            FailureOutcome::AwaitFallback
        } else {
            FailureOutcome::Fatal(self.exhausted())
        }
    }

    /// The fallback window closed without the platform recovering.
    pub fn on_fallback_timeout(&mut self) -> Option<PlaybackError> {
        if !self.awaiting_fallback || matches!(self.state, LoadState::Unstarted | LoadState::Errored) {
            return None;
        }
        Some(self.exhausted())
    }

    pub fn on_exhausted(&mut self) -> Option<PlaybackError> {
        if matches!(self.state, LoadState::Unstarted | LoadState::Errored) {
            return None;
        }
        Some(self.exhausted())
    }

    /// Leave `Errored` with freshly resolved candidates.
    pub fn retry(&mut self, candidates: Vec<MediaSource>) -> Result<(), TransitionError> {
        if self.state != LoadState::Errored {
            return Err(self.reject("retry"));
        }
        self.failure = None;
        self.stall_reloads = 0;
        self.set_state(LoadState::Unstarted);
        self.attach(candidates)
    }

    /// Back to a blank slot after the media was released.
    pub fn reset(&mut self) {
        self.candidates.clear();
        self.awaiting_fallback = false;
        self.failure = None;
        self.stall_reloads = 0;
        self.state = LoadState::Unstarted;
    }

    fn exhausted(&mut self) -> PlaybackError {
        let candidates = self.candidates.len();
        self.fail(PlaybackError::SourceExhausted { candidates })
    }

    fn fail(&mut self, error: PlaybackError) -> PlaybackError {
        self.awaiting_fallback = false;
        self.failure = Some(error.clone());
        self.set_state(LoadState::Errored);
        error
    }

    fn set_state(&mut self, next: LoadState) {
        debug!("Load state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn reject(&self, operation: &'static str) -> TransitionError {
        TransitionError {
            operation,
            state: self.state,
        }
    }
}
