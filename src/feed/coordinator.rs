use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::cursor::FeedCursor;
use super::visibility::VisibilityGate;
use crate::backends::AdSource;
use crate::config::{FeedConfig, PlaybackConfig};
use crate::events::EventBus;
use crate::models::{AdId, VideoAd};
use crate::player::controller::sleep_until;
use crate::player::{
    EnvironmentProbe, MediaElementFactory, SlotConfig, SlotContext, SlotController, SlotEvent,
    SlotHandle, SourceResolver,
};
use crate::services::RewardService;

/// What the coordinator needs from the rest of the application.
#[derive(Clone)]
pub struct FeedCollaborators {
    pub probe: Arc<dyn EnvironmentProbe>,
    pub factory: Arc<dyn MediaElementFactory>,
    pub ad_source: Arc<dyn AdSource>,
    pub rewards: Arc<RewardService>,
    pub event_bus: Arc<EventBus>,
}

/// Point-in-time view of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub cursor: FeedCursor,
    pub active_slot: Option<usize>,
    pub mounted: Vec<usize>,
    pub eligible: Vec<usize>,
    pub ads: Vec<VideoAd>,
    pub growing: bool,
}

/// Commands that can be sent to the feed coordinator
#[derive(Debug)]
pub enum FeedCommand {
    /// A raw scroll sample in pixels from the top of the feed.
    Scroll { offset: f64 },
    Resize { viewport_height: f64 },
    /// Move by whole slots; negative is up.
    Swipe { delta: isize },
    JumpTo { index: usize },
    GetSlot {
        index: Option<usize>,
        respond_to: oneshot::Sender<Option<SlotHandle>>,
    },
    GetSnapshot {
        respond_to: oneshot::Sender<FeedSnapshot>,
    },
    Shutdown,
}

/// Owns the active index, the preload window and the mounted slots.
pub struct FeedCoordinator {
    config: FeedConfig,
    ads: Vec<VideoAd>,
    cursor: FeedCursor,
    gate: VisibilityGate,
    slots: BTreeMap<usize, SlotHandle>,
    active_slot: Option<usize>,

    factory: Arc<dyn MediaElementFactory>,
    slot_context: SlotContext,
    ad_source: Arc<dyn AdSource>,
    rewards: Arc<RewardService>,
    event_bus: Arc<EventBus>,

    pending_offset: Option<f64>,
    settle_deadline: Option<Instant>,
    growing: bool,

    receiver: mpsc::UnboundedReceiver<FeedCommand>,
    slot_events: mpsc::UnboundedReceiver<SlotEvent>,
    growth_tx: mpsc::UnboundedSender<Result<Vec<VideoAd>>>,
    growth_rx: mpsc::UnboundedReceiver<Result<Vec<VideoAd>>>,
    shutdown: CancellationToken,
}

impl FeedCoordinator {
    pub fn new(
        config: FeedConfig,
        playback: &PlaybackConfig,
        ads: Vec<VideoAd>,
        collaborators: FeedCollaborators,
        shutdown: CancellationToken,
    ) -> (FeedHandle, FeedCoordinator) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events_tx, slot_events) = mpsc::unbounded_channel();
        let (growth_tx, growth_rx) = mpsc::unbounded_channel();

        let device = collaborators.probe.device_class();
        let slot_context = SlotContext {
            probe: collaborators.probe,
            resolver: Arc::new(SourceResolver::from(playback)),
            config: Arc::new(SlotConfig::from(playback)),
            events: events_tx,
        };

        let mut ads = ads;
        ads.truncate(config.max_length);

        let coordinator = FeedCoordinator {
            gate: VisibilityGate::new(&config, device),
            cursor: FeedCursor::new(ads.len()),
            config,
            ads,
            slots: BTreeMap::new(),
            active_slot: None,
            factory: collaborators.factory,
            slot_context,
            ad_source: collaborators.ad_source,
            rewards: collaborators.rewards,
            event_bus: collaborators.event_bus,
            pending_offset: None,
            settle_deadline: None,
            growing: false,
            receiver,
            slot_events,
            growth_tx,
            growth_rx,
            shutdown,
        };

        (FeedHandle { sender }, coordinator)
    }

    /// Create the coordinator and run it on the current runtime.
    pub fn spawn(
        config: FeedConfig,
        playback: &PlaybackConfig,
        ads: Vec<VideoAd>,
        collaborators: FeedCollaborators,
        shutdown: CancellationToken,
    ) -> FeedHandle {
        let (handle, coordinator) = Self::new(config, playback, ads, collaborators, shutdown);
        tokio::spawn(coordinator.run());
        handle
    }

    /// Run the coordinator event loop
    pub async fn run(mut self) {
        info!(
            "Feed coordinator started with {} ad(s) from {}",
            self.ads.len(),
            self.ad_source.name()
        );

        // The first slot is active without any scrolling.
        self.pending_offset = Some(0.0);
        self.settle().await;

        loop {
            let settle_deadline = self.settle_deadline;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.receiver.recv() => match command {
                    Some(FeedCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = self.slot_events.recv() => self.handle_slot_event(event).await,
                Some(batch) = self.growth_rx.recv() => self.on_batch(batch).await,
                _ = sleep_until(settle_deadline) => self.settle().await,
            }
        }

        for (_, slot) in std::mem::take(&mut self.slots) {
            slot.evict();
        }
        info!("Feed coordinator stopped");
    }

    async fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Scroll { offset } => self.on_scroll(offset),
            FeedCommand::Resize { viewport_height } => {
                debug!("Viewport resized to {:.0}px", viewport_height);
                self.gate.set_viewport_height(viewport_height);
                let active = self.cursor.active_index;
                self.on_scroll(FeedCursor::offset_of(active, self.gate.viewport_height()));
            }
            FeedCommand::Swipe { delta } => {
                let target = self.cursor.step(delta);
                self.on_scroll(FeedCursor::offset_of(target, self.gate.viewport_height()));
            }
            FeedCommand::JumpTo { index } => {
                let target = index.min(self.cursor.length.saturating_sub(1));
                self.on_scroll(FeedCursor::offset_of(target, self.gate.viewport_height()));
            }
            FeedCommand::GetSlot { index, respond_to } => {
                let index = index.or(self.active_slot);
                let slot = index.and_then(|i| self.slots.get(&i)).cloned();
                let _ = respond_to.send(slot);
            }
            FeedCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            FeedCommand::Shutdown => {}
        }
    }

    /// Raw samples mount nearby slots immediately; the active index waits
    /// for the scroll to settle.
    fn on_scroll(&mut self, offset: f64) {
        if !offset.is_finite() {
            return;
        }
        trace!("Scroll sample at {:.0}", offset);

        for index in self.gate.admit_intersecting(offset, self.cursor.length) {
            self.mount(index);
        }
        self.pending_offset = Some(offset);
        self.settle_deadline = Some(Instant::now() + self.config.scroll_debounce());
    }

    async fn settle(&mut self) {
        self.settle_deadline = None;
        let Some(offset) = self.pending_offset.take() else {
            return;
        };
        if self.cursor.length == 0 {
            self.maybe_grow();
            return;
        }

        let target =
            FeedCursor::active_index_for(offset, self.gate.viewport_height(), self.cursor.length);
        self.cursor.set_active(target);
        self.apply_window().await;
        self.maybe_grow();
    }

    /// Bring the slots in line with the cursor: one active slot, the window
    /// mounted, distant slots released.
    async fn apply_window(&mut self) {
        let active = self.cursor.active_index;

        // The outgoing slot acknowledges before the next one is activated, so
        // no two slots are ever active at once.
        if self.active_slot != Some(active)
            && let Some(previous) = self.active_slot.take()
            && let Some(slot) = self.slots.get(&previous)
            && let Err(e) = slot.deactivate().await
        {
            warn!("Failed to deactivate slot {}: {}", previous, e);
        }

        for index in self.gate.admit_window(&self.cursor) {
            self.mount(index);
        }

        if self.active_slot != Some(active) {
            let slot = self.mount(active);
            if let Err(e) = slot.set_active(true) {
                warn!("Failed to activate slot {}: {}", active, e);
            }
            self.active_slot = Some(active);

            let ad_id = self.ad_id(active);
            debug!("Active slot is now {} ({})", active, ad_id);
            let _ = self.event_bus.emit_active_slot_changed(active, ad_id).await;
        }

        let window = self.gate.window();
        for (&index, slot) in &self.slots {
            let _ = slot.set_preload_candidate(index != active && window.contains(index, active));
        }

        for index in self.gate.take_evictions(&self.cursor) {
            if let Some(slot) = self.slots.remove(&index) {
                debug!("Evicting slot {}", index);
                slot.evict();
            }
        }
    }

    /// Start the controller for `index` if it is not running and let it load.
    fn mount(&mut self, index: usize) -> &SlotHandle {
        let running = self.slots.get(&index).is_some_and(|slot| !slot.is_closed());
        if !running {
            trace!("Mounting slot {}", index);
            let handle = SlotController::spawn(
                index,
                self.ads[index].clone(),
                self.factory.create(index),
                self.slot_context.clone(),
                self.shutdown.child_token(),
            );
            self.slots.insert(index, handle);
        }

        let slot = &self.slots[&index];
        if let Err(e) = slot.load() {
            warn!("Failed to load slot {}: {}", index, e);
        }
        slot
    }

    fn maybe_grow(&mut self) {
        if self.growing
            || self.cursor.length >= self.config.max_length
            || !self.cursor.is_near_end(self.config.grow_threshold)
        {
            return;
        }

        self.growing = true;
        debug!(
            "Near the end at {}/{}, fetching more from {}",
            self.cursor.active_index,
            self.cursor.length,
            self.ad_source.name()
        );

        let source = self.ad_source.clone();
        let results = self.growth_tx.clone();
        tokio::spawn(async move {
            let _ = results.send(source.fetch_more().await);
        });
    }

    async fn on_batch(&mut self, batch: Result<Vec<VideoAd>>) {
        self.growing = false;

        let mut batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Failed to fetch more ads: {:#}", e);
                return;
            }
        };

        batch.truncate(self.config.max_length.saturating_sub(self.ads.len()));
        if batch.is_empty() {
            debug!("No more ads to append");
            return;
        }

        let added = batch.len();
        self.ads.extend(batch);
        self.cursor.extend(added);
        info!("Feed extended by {} to {}", added, self.cursor.length);
        let _ = self
            .event_bus
            .emit_feed_extended(added, self.cursor.length)
            .await;

        // New tail slots may already fall inside the window.
        self.apply_window().await;
    }

    async fn handle_slot_event(&mut self, event: SlotEvent) {
        match event {
            SlotEvent::Watched { index, ad } => {
                trace!("Slot {} reported a watch", index);
                let rewards = self.rewards.clone();
                tokio::spawn(async move {
                    rewards.on_watched(&ad).await;
                });
            }
            SlotEvent::StateChanged { index, state } => {
                trace!("Slot {} is {}", index, state.as_str());
            }
            SlotEvent::Failed { index, error } => {
                let ad_id = self.ad_id(index);
                let _ = self
                    .event_bus
                    .emit_slot_failed(index, ad_id, error.to_string())
                    .await;
            }
            SlotEvent::Recovered { index } => {
                let ad_id = self.ad_id(index);
                let _ = self.event_bus.emit_slot_recovered(index, ad_id).await;
            }
        }
    }

    fn ad_id(&self, index: usize) -> AdId {
        self.ads
            .get(index)
            .map(|ad| ad.id.clone())
            .unwrap_or_else(|| AdId::new(""))
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            cursor: self.cursor,
            active_slot: self.active_slot,
            mounted: self
                .slots
                .iter()
                .filter(|(_, slot)| !slot.is_closed())
                .map(|(&index, _)| index)
                .collect(),
            eligible: self.gate.eligible().collect(),
            ads: self.ads.clone(),
            growing: self.growing,
        }
    }
}

/// Handle to send commands to the feed coordinator
#[derive(Debug, Clone)]
pub struct FeedHandle {
    sender: mpsc::UnboundedSender<FeedCommand>,
}

impl FeedHandle {
    pub fn scroll(&self, offset: f64) -> Result<()> {
        self.send(FeedCommand::Scroll { offset })
    }

    pub fn resize(&self, viewport_height: f64) -> Result<()> {
        self.send(FeedCommand::Resize { viewport_height })
    }

    pub fn swipe(&self, delta: isize) -> Result<()> {
        self.send(FeedCommand::Swipe { delta })
    }

    pub fn jump_to(&self, index: usize) -> Result<()> {
        self.send(FeedCommand::JumpTo { index })
    }

    pub async fn active_slot(&self) -> Result<Option<SlotHandle>> {
        self.get_slot(None).await
    }

    pub async fn slot(&self, index: usize) -> Result<Option<SlotHandle>> {
        self.get_slot(Some(index)).await
    }

    /// Tap on the active slot. Returns whether it is playing afterwards.
    pub async fn toggle_pause(&self) -> Result<bool> {
        self.require_active().await?.toggle_pause().await
    }

    /// Returns the new muted preference of the active slot.
    pub async fn toggle_mute(&self) -> Result<bool> {
        self.require_active().await?.toggle_mute().await
    }

    /// Retry the active slot after it failed.
    pub async fn retry(&self) -> Result<()> {
        self.require_active().await?.retry().await
    }

    pub async fn snapshot(&self) -> Result<FeedSnapshot> {
        let (respond_to, response) = oneshot::channel();
        self.send(FeedCommand::GetSnapshot { respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from feed coordinator"))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(FeedCommand::Shutdown)
    }

    async fn get_slot(&self, index: Option<usize>) -> Result<Option<SlotHandle>> {
        let (respond_to, response) = oneshot::channel();
        self.send(FeedCommand::GetSlot { index, respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from feed coordinator"))
    }

    async fn require_active(&self) -> Result<SlotHandle> {
        self.active_slot()
            .await?
            .ok_or_else(|| anyhow::anyhow!("No active slot"))
    }

    fn send(&self, command: FeedCommand) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| anyhow::anyhow!("Feed coordinator disconnected"))
    }
}
