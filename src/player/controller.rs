use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::source_resolver::SourceResolver;
use super::state_machine::{FailureOutcome, LoadStateMachine, StallOutcome};
use super::traits::{EnvironmentProbe, MediaElement, MediaSignal, SignalEnvelope, SignalSink};
use super::types::{LoadState, RewardGate};
use super::watch_timer::WatchTimer;
use crate::config::PlaybackConfig;
use crate::models::{MediaSource, VideoAd};
use crate::utils::{PlaybackError, TransitionError};

/// Timing policy for one slot.
#[derive(Debug, Clone)]
pub struct SlotConfig {
    pub dwell: Duration,
    pub reward_gate: RewardGate,
    pub play_retry_delays: Vec<Duration>,
    pub fallback_timeout: Duration,
}

impl From<&PlaybackConfig> for SlotConfig {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            dwell: config.dwell(),
            reward_gate: config.reward_gate,
            play_retry_delays: config.play_retry_delays(),
            fallback_timeout: config.source_fallback_timeout(),
        }
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

/// Point-in-time view of a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSnapshot {
    pub index: usize,
    pub ad: VideoAd,
    pub is_active: bool,
    pub is_preload_candidate: bool,
    pub resolved_sources: Vec<MediaSource>,
    pub load_state: LoadState,
    pub muted_preference: bool,
    pub has_awarded_reward: bool,
    pub failure: Option<PlaybackError>,
}

/// Everything a slot reports upwards.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotEvent {
    /// The dwell threshold elapsed while active. Fires at most once per activation.
    Watched { index: usize, ad: VideoAd },
    StateChanged { index: usize, state: LoadState },
    Failed { index: usize, error: PlaybackError },
    /// A previously failed slot became playable again.
    Recovered { index: usize },
}

/// Commands that can be sent to a slot controller
#[derive(Debug)]
pub enum SlotCommand {
    SetActive { active: bool },
    /// Same as `SetActive { active: false }`, answered once the media is paused.
    Deactivate { respond_to: oneshot::Sender<()> },
    SetPreloadCandidate { candidate: bool },
    /// The visibility gate made this slot eligible to fetch.
    Load,
    /// User tap. Responds with whether the slot is now playing.
    TogglePause { respond_to: oneshot::Sender<bool> },
    /// Responds with the new muted preference.
    ToggleMute { respond_to: oneshot::Sender<bool> },
    Retry {
        respond_to: oneshot::Sender<Result<(), TransitionError>>,
    },
    GetSnapshot {
        respond_to: oneshot::Sender<SlotSnapshot>,
    },
    /// Release the media and stop the controller.
    Evict,
}

#[derive(Debug, Default)]
struct PlayRetry {
    attempt: usize,
    deadline: Option<Instant>,
}

impl PlayRetry {
    fn cancel(&mut self) {
        self.attempt = 0;
        self.deadline = None;
    }
}

/// Owns one media element and drives it through the load/play states.
pub struct SlotController {
    index: usize,
    ad: VideoAd,
    element: Box<dyn MediaElement>,
    probe: Arc<dyn EnvironmentProbe>,
    resolver: Arc<SourceResolver>,
    config: Arc<SlotConfig>,

    machine: LoadStateMachine,
    timer: WatchTimer,
    play_retry: PlayRetry,
    fallback_deadline: Option<Instant>,

    is_active: bool,
    is_preload_candidate: bool,
    muted_preference: bool,
    user_paused: bool,
    played_since_attach: bool,
    recovering: bool,
    generation: u64,
    reported_state: LoadState,

    receiver: mpsc::UnboundedReceiver<SlotCommand>,
    signal_tx: mpsc::UnboundedSender<SignalEnvelope>,
    signal_rx: mpsc::UnboundedReceiver<SignalEnvelope>,
    events: mpsc::UnboundedSender<SlotEvent>,
    shutdown: CancellationToken,
}

/// Collaborators shared by every slot of a feed.
#[derive(Clone)]
pub struct SlotContext {
    pub probe: Arc<dyn EnvironmentProbe>,
    pub resolver: Arc<SourceResolver>,
    pub config: Arc<SlotConfig>,
    pub events: mpsc::UnboundedSender<SlotEvent>,
}

impl SlotController {
    pub fn new(
        index: usize,
        ad: VideoAd,
        element: Box<dyn MediaElement>,
        context: SlotContext,
        shutdown: CancellationToken,
    ) -> (SlotHandle, SlotController) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let device = context.probe.device_class();

        let controller = SlotController {
            index,
            ad,
            element,
            probe: context.probe,
            resolver: context.resolver,
            machine: LoadStateMachine::new(device),
            timer: WatchTimer::new(context.config.dwell, context.config.reward_gate),
            config: context.config,
            play_retry: PlayRetry::default(),
            fallback_deadline: None,
            is_active: false,
            is_preload_candidate: false,
            muted_preference: true,
            user_paused: false,
            played_since_attach: false,
            recovering: false,
            generation: 0,
            reported_state: LoadState::Unstarted,
            receiver,
            signal_tx,
            signal_rx,
            events: context.events,
            shutdown,
        };

        (SlotHandle { index, sender }, controller)
    }

    /// Create the controller and run it on the current runtime.
    pub fn spawn(
        index: usize,
        ad: VideoAd,
        element: Box<dyn MediaElement>,
        context: SlotContext,
        shutdown: CancellationToken,
    ) -> SlotHandle {
        let (handle, controller) = Self::new(index, ad, element, context, shutdown);
        tokio::spawn(controller.run());
        handle
    }

    /// Run the controller event loop
    pub async fn run(mut self) {
        debug!("Slot {} controller started", self.index);

        loop {
            let watch_deadline = self.timer.deadline();
            let retry_deadline = self.play_retry.deadline;
            let fallback_deadline = self.fallback_deadline;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.receiver.recv() => match command {
                    Some(SlotCommand::Evict) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(envelope) = self.signal_rx.recv() => {
                    self.handle_signal(envelope).await;
                }
                _ = sleep_until(watch_deadline) => self.on_watch_deadline(),
                _ = sleep_until(retry_deadline) => {
                    self.play_retry.deadline = None;
                    self.try_play().await;
                }
                _ = sleep_until(fallback_deadline) => self.on_fallback_timeout(),
            }

            self.report_state();
        }

        self.release();
        debug!("Slot {} controller stopped", self.index);
    }

    async fn handle_command(&mut self, command: SlotCommand) {
        match command {
            SlotCommand::SetActive { active } => {
                if active {
                    self.activate().await;
                } else {
                    self.deactivate();
                }
            }
            SlotCommand::Deactivate { respond_to } => {
                self.deactivate();
                let _ = respond_to.send(());
            }
            SlotCommand::SetPreloadCandidate { candidate } => {
                self.is_preload_candidate = candidate;
            }
            SlotCommand::Load => {
                trace!("Slot {} eligible to load", self.index);
                self.load();
            }
            SlotCommand::TogglePause { respond_to } => {
                let playing = self.toggle_pause().await;
                let _ = respond_to.send(playing);
            }
            SlotCommand::ToggleMute { respond_to } => {
                self.muted_preference = !self.muted_preference;
                self.element.set_muted(self.muted_preference);
                let _ = respond_to.send(self.muted_preference);
            }
            SlotCommand::Retry { respond_to } => {
                let result = self.retry();
                let _ = respond_to.send(result);
            }
            SlotCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            SlotCommand::Evict => {}
        }
    }

    async fn activate(&mut self) {
        if self.is_active {
            return;
        }
        debug!("Slot {} activated ({})", self.index, self.ad.id);

        self.is_active = true;
        self.user_paused = false;
        self.machine.begin_episode();
        self.timer.activate(Instant::now());

        if self.machine.state() == LoadState::Unstarted {
            self.load();
        } else if self.machine.state() == LoadState::Playing {
            self.timer.on_playing(Instant::now());
        } else {
            self.try_play().await;
        }
    }

    /// Pause regardless of state; media stays attached so re-activation is instant.
    fn deactivate(&mut self) {
        if !self.is_active {
            return;
        }
        debug!("Slot {} deactivated", self.index);

        self.is_active = false;
        self.element.pause();
        self.machine.on_paused();
        self.timer.deactivate();
        self.play_retry.cancel();
    }

    fn load(&mut self) {
        if self.machine.state() != LoadState::Unstarted {
            return;
        }

        let candidates = self
            .resolver
            .resolve_with(&self.ad.source_url, self.probe.as_ref());
        if let Err(e) = self.machine.attach(candidates.clone()) {
            warn!("Slot {}: {}", self.index, e);
            return;
        }
        self.attach_element(&candidates);
        self.played_since_attach = false;
    }

    fn retry(&mut self) -> Result<(), TransitionError> {
        let candidates = self
            .resolver
            .resolve_with(&self.ad.source_url, self.probe.as_ref());
        self.machine.retry(candidates.clone())?;

        info!("Slot {} retrying with {} candidate(s)", self.index, candidates.len());
        self.element.release();
        self.attach_element(&candidates);
        self.played_since_attach = false;
        self.recovering = true;
        Ok(())
    }

    fn attach_element(&mut self, candidates: &[MediaSource]) {
        self.generation += 1;
        self.fallback_deadline = None;
        let sink = SignalSink::new(self.generation, self.signal_tx.clone());
        self.element.attach(candidates, sink);
    }

    async fn handle_signal(&mut self, envelope: SignalEnvelope) {
        if envelope.generation != self.generation {
            trace!(
                "Slot {} dropping stale {:?} (generation {} != {})",
                self.index, envelope.signal, envelope.generation, self.generation
            );
            return;
        }

        match envelope.signal {
            MediaSignal::Ready(level) => {
                let became_ready = self.machine.on_readiness(level);
                if !self.machine.awaiting_fallback() {
                    self.fallback_deadline = None;
                }
                if became_ready {
                    if self.recovering {
                        self.recovering = false;
                        self.emit(SlotEvent::Recovered { index: self.index });
                    }
                }
                // A deeper readiness signal is another chance after exhausted retries.
                if became_ready || self.play_retry.deadline.is_none() {
                    self.try_play().await;
                }
            }
            MediaSignal::Playing => {
                if self.machine.on_playing().is_ok() {
                    self.play_retry.cancel();
                    self.fallback_deadline = None;
                    if self.is_active {
                        self.timer.on_playing(Instant::now());
                    } else {
                        self.element.pause();
                        self.machine.on_paused();
                    }
                }
            }
            MediaSignal::Stalled => match self.machine.on_stall() {
                StallOutcome::Ignored => {}
                StallOutcome::Reload(candidates) => {
                    warn!("Slot {} stalled, reloading source", self.index);
                    self.attach_element(&candidates);
                }
                StallOutcome::Fatal(error) => self.fail(error),
            },
            MediaSignal::SourceFailed { remaining } => match self.machine.on_source_failed(remaining) {
                FailureOutcome::Ignored => {}
                FailureOutcome::AwaitFallback => {
                    self.fallback_deadline = Some(Instant::now() + self.config.fallback_timeout);
                }
                FailureOutcome::Fatal(error) => self.fail(error),
            },
            MediaSignal::Exhausted => {
                if let Some(error) = self.machine.on_exhausted() {
                    self.fail(error);
                }
            }
        }
    }

    async fn try_play(&mut self) {
        if !self.is_active || self.user_paused || !self.machine.state().is_playable() {
            return;
        }

        // Autoplay is only dependable muted.
        if !self.played_since_attach {
            self.muted_preference = true;
        }
        self.element.set_muted(self.muted_preference);
        self.played_since_attach = true;

        match self.element.play().await {
            Ok(()) => {
                self.play_retry.cancel();
                if self.machine.on_playing().is_ok() {
                    self.timer.on_playing(Instant::now());
                }
            }
            Err(e) => {
                let rejection = PlaybackError::PlayRejected(e.to_string());
                warn!("Slot {}: {}", self.index, rejection);

                if !self.muted_preference {
                    self.muted_preference = true;
                    self.element.set_muted(true);
                }

                match self.config.play_retry_delays.get(self.play_retry.attempt) {
                    Some(delay) => {
                        self.play_retry.attempt += 1;
                        self.play_retry.deadline = Some(Instant::now() + *delay);
                    }
                    None => {
                        debug!("Slot {} play retries exhausted, waiting for readiness", self.index);
                        self.play_retry.cancel();
                    }
                }
            }
        }
    }

    async fn toggle_pause(&mut self) -> bool {
        if self.machine.state() == LoadState::Playing {
            self.element.pause();
            self.machine.on_paused();
            self.user_paused = true;
            self.play_retry.cancel();
            return false;
        }

        self.user_paused = false;
        self.try_play().await;
        self.machine.state() == LoadState::Playing
    }

    fn on_watch_deadline(&mut self) {
        if self.timer.poll(Instant::now()) {
            info!("Slot {} watched: {} ({})", self.index, self.ad.id, self.ad.brand);
            self.emit(SlotEvent::Watched {
                index: self.index,
                ad: self.ad.clone(),
            });
        }
    }

    fn on_fallback_timeout(&mut self) {
        self.fallback_deadline = None;
        if let Some(error) = self.machine.on_fallback_timeout() {
            self.fail(error);
        }
    }

    fn fail(&mut self, error: PlaybackError) {
        error!("Slot {} failed: {}", self.index, error);
        self.element.pause();
        self.play_retry.cancel();
        self.fallback_deadline = None;
        self.recovering = false;
        self.emit(SlotEvent::Failed {
            index: self.index,
            error,
        });
    }

    fn release(&mut self) {
        self.element.release();
        self.machine.reset();
        self.timer.deactivate();
        self.play_retry.cancel();
        self.fallback_deadline = None;
        // Anything the element raises from here on is stale.
        self.generation += 1;
    }

    fn report_state(&mut self) {
        let state = self.machine.state();
        if state != self.reported_state {
            self.reported_state = state;
            self.emit(SlotEvent::StateChanged {
                index: self.index,
                state,
            });
        }
    }

    fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            index: self.index,
            ad: self.ad.clone(),
            is_active: self.is_active,
            is_preload_candidate: self.is_preload_candidate,
            resolved_sources: self.machine.candidates().to_vec(),
            load_state: self.machine.state(),
            muted_preference: self.muted_preference,
            has_awarded_reward: self.timer.has_awarded(),
            failure: self.machine.failure().cloned(),
        }
    }

    fn emit(&self, event: SlotEvent) {
        let _ = self.events.send(event);
    }
}

pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Handle to send commands to a slot controller
#[derive(Debug, Clone)]
pub struct SlotHandle {
    index: usize,
    sender: mpsc::UnboundedSender<SlotCommand>,
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn set_active(&self, active: bool) -> Result<()> {
        self.send(SlotCommand::SetActive { active })
    }

    pub fn set_preload_candidate(&self, candidate: bool) -> Result<()> {
        self.send(SlotCommand::SetPreloadCandidate { candidate })
    }

    pub fn load(&self) -> Result<()> {
        self.send(SlotCommand::Load)
    }

    /// Release the media. Evicting an already-stopped slot is a no-op.
    pub fn evict(&self) {
        let _ = self.sender.send(SlotCommand::Evict);
    }

    /// Deactivate and wait until the slot has stopped playing.
    pub async fn deactivate(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.send(SlotCommand::Deactivate { respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from slot controller"))
    }

    pub async fn toggle_pause(&self) -> Result<bool> {
        let (respond_to, response) = oneshot::channel();
        self.send(SlotCommand::TogglePause { respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from slot controller"))
    }

    pub async fn toggle_mute(&self) -> Result<bool> {
        let (respond_to, response) = oneshot::channel();
        self.send(SlotCommand::ToggleMute { respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from slot controller"))
    }

    pub async fn retry(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.send(SlotCommand::Retry { respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from slot controller"))?
            .map_err(Into::into)
    }

    pub async fn snapshot(&self) -> Result<SlotSnapshot> {
        let (respond_to, response) = oneshot::channel();
        self.send(SlotCommand::GetSnapshot { respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from slot controller"))
    }

    fn send(&self, command: SlotCommand) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| anyhow::anyhow!("Slot {} controller disconnected", self.index))
    }
}
