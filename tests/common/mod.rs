
use adreel::config::{FeedConfig, PlaybackConfig};
use adreel::events::{EventBus, EventType, FeedEvent};
use adreel::feed::{FeedCollaborators, FeedCoordinator, FeedHandle, FeedSnapshot};
use adreel::models::VideoAd;
use adreel::player::{EnvironmentProbe, FixedProbe, SlotSnapshot};
use adreel::services::RewardService;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use mocks::{MockAdSource, MockAuth, MockElementFactory, MockStatsStore};

pub const VIEWPORT: f64 = 800.0;

/// The eleven built-in ads, numbered "1" through "11".
pub fn sample_ads() -> Vec<VideoAd> {
    let brands = [
        "Nike", "Adidas", "Apple", "Samsung", "Nike", "Adidas", "Nike", "Apple", "Samsung",
        "Adidas", "Nike",
    ];
    brands
        .iter()
        .enumerate()
        .map(|(i, brand)| {
            VideoAd::new(
                (i + 1).to_string(),
                format!("/videos/{}_Spot-{}_1080p.mp4", brand, i + 1),
                *brand,
                format!("{} spot {}", brand, i + 1),
            )
        })
        .collect()
}

pub struct TestFeed {
    pub feed: FeedHandle,
    pub rewards: Arc<RewardService>,
    pub stats: Arc<MockStatsStore>,
    pub auth: Arc<MockAuth>,
    pub factory: Arc<MockElementFactory>,
    pub ad_source: Arc<MockAdSource>,
    pub event_bus: Arc<EventBus>,
    pub shutdown: CancellationToken,
}

pub struct TestFeedBuilder {
    ads: Vec<VideoAd>,
    probe: FixedProbe,
    auth: MockAuth,
    factory: MockElementFactory,
    feed_config: FeedConfig,
    playback: PlaybackConfig,
}

impl TestFeedBuilder {
    pub fn new() -> Self {
        Self {
            ads: sample_ads(),
            probe: FixedProbe::desktop(),
            auth: MockAuth::signed_in("viewer"),
            factory: MockElementFactory::new(),
            feed_config: FeedConfig {
                viewport_height: VIEWPORT,
                ..FeedConfig::default()
            },
            playback: PlaybackConfig::default(),
        }
    }

    pub fn mobile(mut self) -> Self {
        self.probe = FixedProbe::mobile();
        self
    }

    pub fn signed_out(mut self) -> Self {
        self.auth = MockAuth::signed_out();
        self
    }

    pub fn factory(mut self, factory: MockElementFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    pub fn spawn(self) -> TestFeed {
        let stats = Arc::new(MockStatsStore::new());
        let auth = Arc::new(self.auth);
        let factory = Arc::new(self.factory);
        let ad_source = Arc::new(MockAdSource::new(sample_ads()));
        let event_bus = Arc::new(EventBus::new(1024));
        let shutdown = CancellationToken::new();

        let rewards = Arc::new(RewardService::new(
            stats.clone(),
            auth.clone(),
            event_bus.clone(),
            &self.playback,
        ));
        let probe: Arc<dyn EnvironmentProbe> = Arc::new(self.probe);

        let feed = FeedCoordinator::spawn(
            self.feed_config,
            &self.playback,
            self.ads,
            FeedCollaborators {
                probe,
                factory: factory.clone(),
                ad_source: ad_source.clone(),
                rewards: rewards.clone(),
                event_bus: event_bus.clone(),
            },
            shutdown.clone(),
        );

        TestFeed {
            feed,
            rewards,
            stats,
            auth,
            factory,
            ad_source,
            event_bus,
            shutdown,
        }
    }
}

impl TestFeed {
    pub async fn snapshot(&self) -> FeedSnapshot {
        self.feed.snapshot().await.unwrap()
    }

    pub async fn slot(&self, index: usize) -> Option<SlotSnapshot> {
        let handle = self.feed.slot(index).await.unwrap()?;
        handle.snapshot().await.ok()
    }

    /// Snapshots of every mounted slot.
    pub async fn slots(&self) -> Vec<SlotSnapshot> {
        let mut slots = Vec::new();
        for index in self.snapshot().await.mounted {
            if let Some(slot) = self.slot(index).await {
                slots.push(slot);
            }
        }
        slots
    }

    /// Swipe and wait for the scroll to settle.
    pub async fn swipe(&self, delta: isize) {
        self.feed.swipe(delta).unwrap();
        settle().await;
    }

    pub async fn jump_to(&self, index: usize) {
        self.feed.jump_to(index).unwrap();
        settle().await;
    }

    pub async fn events_of(&self, event_type: EventType) -> Vec<FeedEvent> {
        self.event_bus
            .get_history()
            .await
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl Drop for TestFeed {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Long enough for the scroll debounce and the slot round trips.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}
