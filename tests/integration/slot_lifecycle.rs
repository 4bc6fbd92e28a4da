use adreel::models::VideoAd;
use adreel::player::{
    FixedProbe, LoadState, MediaSignal, ReadinessLevel, SlotConfig, SlotContext, SlotController,
    SlotEvent, SlotHandle, SourceResolver,
};
use adreel::utils::PlaybackError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::mocks::{ElementScript, ScriptedElement};
use crate::common::settle;

struct TestSlot {
    handle: SlotHandle,
    script: ElementScript,
    events: mpsc::UnboundedReceiver<SlotEvent>,
}

impl TestSlot {
    fn spawn(probe: FixedProbe, element: ScriptedElement, script: ElementScript) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let context = SlotContext {
            probe: Arc::new(probe),
            resolver: Arc::new(SourceResolver::default()),
            config: Arc::new(SlotConfig::default()),
            events: events_tx,
        };
        let ad = VideoAd::new("4", "/videos/Samsung_Galaxy_1080p.mp4", "Samsung", "Galaxy");
        let handle = SlotController::spawn(
            3,
            ad,
            Box::new(element),
            context,
            CancellationToken::new(),
        );
        Self {
            handle,
            script,
            events,
        }
    }

    fn desktop() -> Self {
        let (element, script) = ScriptedElement::new();
        Self::spawn(FixedProbe::desktop(), element, script)
    }

    async fn state(&self) -> LoadState {
        self.handle.snapshot().await.unwrap().load_state
    }

    fn drain(&mut self) -> Vec<SlotEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

async fn tick() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_evicted_while_loading_ignores_late_signals() {
    let slot = TestSlot::desktop();
    slot.handle.load().unwrap();
    tick().await;
    assert_eq!(slot.state().await, LoadState::Loading);

    slot.handle.evict();
    tick().await;
    assert!(slot.script.released());
    assert!(!slot.script.emit(MediaSignal::Ready(ReadinessLevel::CanPlay)));
    assert!(!slot.script.is_playing());
    assert!(slot.handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_inactive_slot_loads_without_playing() {
    let slot = TestSlot::desktop();
    slot.handle.load().unwrap();
    tick().await;

    // Desktop waits for the deeper readiness signal.
    slot.script.emit(MediaSignal::Ready(ReadinessLevel::Metadata));
    tick().await;
    assert_eq!(slot.state().await, LoadState::Loading);

    slot.script.emit(MediaSignal::Ready(ReadinessLevel::CanPlay));
    tick().await;
    assert_eq!(slot.state().await, LoadState::Ready);
    assert!(!slot.script.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_mobile_plays_on_metadata_with_manifest_first() {
    let (element, script) = ScriptedElement::new();
    let slot = TestSlot::spawn(FixedProbe::mobile().with_manifest_support(true), element, script);
    slot.handle.set_active(true).unwrap();
    tick().await;

    let sources = slot.script.last_attached();
    assert_eq!(sources.len(), 3);
    assert!(sources[0].is_manifest());
    assert_eq!(sources[2].uri, "/videos/Samsung_Galaxy_1080p.mp4");

    slot.script.emit(MediaSignal::Ready(ReadinessLevel::Metadata));
    tick().await;
    assert_eq!(slot.state().await, LoadState::Playing);
    assert!(slot.script.is_muted());
}

#[tokio::test(start_paused = true)]
async fn test_stall_reloads_once_then_fails() {
    let (element, script) = ScriptedElement::new();
    let mut slot = TestSlot::spawn(
        FixedProbe::desktop(),
        element.auto_ready(ReadinessLevel::CanPlay),
        script,
    );
    slot.handle.set_active(true).unwrap();
    tick().await;
    assert_eq!(slot.state().await, LoadState::Playing);

    slot.script.emit(MediaSignal::Stalled);
    tick().await;
    assert_eq!(slot.script.attach_count(), 2);
    assert_eq!(slot.state().await, LoadState::Playing);

    // A stall raised for the replaced source changes nothing.
    slot.script.emit_for_attach(0, MediaSignal::Stalled);
    tick().await;
    assert_eq!(slot.state().await, LoadState::Playing);

    slot.script.emit(MediaSignal::Stalled);
    tick().await;
    let snapshot = slot.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.load_state, LoadState::Errored);
    assert_eq!(snapshot.failure, Some(PlaybackError::StallTimeout));
    assert!(slot.drain().iter().any(|e| matches!(
        e,
        SlotEvent::Failed {
            index: 3,
            error: PlaybackError::StallTimeout
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_stall_allowance_resets_on_reactivation() {
    let (element, script) = ScriptedElement::new();
    let slot = TestSlot::spawn(
        FixedProbe::desktop(),
        element.auto_ready(ReadinessLevel::CanPlay),
        script,
    );
    slot.handle.set_active(true).unwrap();
    tick().await;
    slot.script.emit(MediaSignal::Stalled);
    tick().await;

    slot.handle.set_active(false).unwrap();
    slot.handle.set_active(true).unwrap();
    tick().await;
    slot.script.emit(MediaSignal::Stalled);
    tick().await;

    assert_eq!(slot.script.attach_count(), 3);
    assert_eq!(slot.state().await, LoadState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_an_exhausted_slot() {
    let mut slot = TestSlot::desktop();
    slot.handle.set_active(true).unwrap();
    tick().await;

    // Retry is only accepted from Errored.
    assert!(slot.handle.retry().await.is_err());

    slot.script.emit(MediaSignal::Exhausted);
    tick().await;
    let snapshot = slot.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.load_state, LoadState::Errored);
    assert_eq!(
        snapshot.failure,
        Some(PlaybackError::SourceExhausted { candidates: 1 })
    );
    assert!(slot.drain().iter().any(|e| matches!(e, SlotEvent::Failed { .. })));

    slot.handle.retry().await.unwrap();
    assert_eq!(slot.state().await, LoadState::Loading);
    assert_eq!(slot.script.attach_count(), 2);

    slot.script.emit(MediaSignal::Ready(ReadinessLevel::CanPlay));
    tick().await;
    assert_eq!(slot.state().await, LoadState::Playing);
    assert!(slot.handle.snapshot().await.unwrap().failure.is_none());
    assert!(slot.drain().contains(&SlotEvent::Recovered { index: 3 }));
}

#[tokio::test(start_paused = true)]
async fn test_source_failure_waits_for_the_fallback() {
    let slot = TestSlot::desktop();
    slot.handle.set_active(true).unwrap();
    tick().await;

    slot.script.emit(MediaSignal::SourceFailed { remaining: 1 });
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(slot.state().await, LoadState::Loading);

    slot.script.emit(MediaSignal::Ready(ReadinessLevel::CanPlay));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(slot.state().await, LoadState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_preloaded_slot_survives_fallback_to_next_candidate() {
    let mut slot = TestSlot::desktop();
    slot.handle.load().unwrap();
    tick().await;
    slot.script.emit(MediaSignal::Ready(ReadinessLevel::CanPlay));
    tick().await;
    assert_eq!(slot.state().await, LoadState::Ready);

    slot.script.emit(MediaSignal::SourceFailed { remaining: 1 });
    tick().await;
    slot.script.emit(MediaSignal::Ready(ReadinessLevel::CanPlay));
    tokio::time::sleep(Duration::from_secs(4)).await;

    let snapshot = slot.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.load_state, LoadState::Ready);
    assert!(snapshot.failure.is_none());
    assert!(!slot.drain().iter().any(|e| matches!(e, SlotEvent::Failed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_source_failure_without_fallback_is_exhausted() {
    let slot = TestSlot::desktop();
    slot.handle.set_active(true).unwrap();
    tick().await;

    slot.script.emit(MediaSignal::SourceFailed { remaining: 1 });
    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(slot.state().await, LoadState::Errored);

    let other = TestSlot::desktop();
    other.handle.load().unwrap();
    tick().await;
    other.script.emit(MediaSignal::SourceFailed { remaining: 0 });
    tick().await;
    assert_eq!(other.state().await, LoadState::Errored);
}

#[tokio::test(start_paused = true)]
async fn test_unmute_preference_survives_pause() {
    let (element, script) = ScriptedElement::new();
    let slot = TestSlot::spawn(
        FixedProbe::desktop(),
        element.auto_ready(ReadinessLevel::CanPlay),
        script,
    );
    slot.handle.set_active(true).unwrap();
    tick().await;
    assert!(slot.script.is_muted());

    assert!(!slot.handle.toggle_mute().await.unwrap());
    assert!(!slot.handle.toggle_pause().await.unwrap());
    assert!(!slot.script.is_playing());

    assert!(slot.handle.toggle_pause().await.unwrap());
    assert!(slot.script.is_playing());
    assert!(!slot.script.is_muted());
    assert!(!slot.handle.snapshot().await.unwrap().muted_preference);
}

#[tokio::test(start_paused = true)]
async fn test_deactivation_pauses_but_keeps_media() {
    let (element, script) = ScriptedElement::new();
    let slot = TestSlot::spawn(
        FixedProbe::desktop(),
        element.auto_ready(ReadinessLevel::CanPlay),
        script,
    );
    slot.handle.set_active(true).unwrap();
    settle().await;
    slot.handle.set_active(false).unwrap();
    tick().await;

    let snapshot = slot.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.load_state, LoadState::Ready);
    assert!(!snapshot.is_active);
    assert!(!slot.script.is_playing());
    assert!(!slot.script.released());
    assert_eq!(slot.script.attach_count(), 1);
}
