use adreel::events::{EventPayload, EventType};
use adreel::player::LoadState;
use std::time::Duration;

use crate::common::mocks::MockElementFactory;
use crate::common::{TestFeedBuilder, VIEWPORT, advance, settle};

#[tokio::test(start_paused = true)]
async fn test_first_slot_rewards_once_after_dwell() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;

    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.cursor.length, 11);
    assert_eq!(snapshot.active_slot, Some(0));
    assert_eq!(feed.slot(0).await.unwrap().load_state, LoadState::Playing);

    advance(Duration::from_secs(6)).await;
    assert_eq!(feed.stats.watched_ad_ids(), vec!["1"]);
    assert_eq!(feed.rewards.local_points(), 1);
    assert_eq!(feed.stats.points_for("viewer"), 1);

    // Staying longer never pays again in the same episode.
    advance(Duration::from_secs(20)).await;
    assert_eq!(feed.stats.watched_ad_ids(), vec!["1"]);
    assert_eq!(feed.events_of(EventType::RewardEarned).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_scroll_only_rewards_where_it_settles() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;

    for index in 1..=5 {
        feed.feed.scroll(index as f64 * VIEWPORT).unwrap();
        advance(Duration::from_millis(20)).await;
    }
    settle().await;

    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.cursor.active_index, 5);
    // Passing slots were fetched from the raw samples.
    assert!(feed.factory.created(3) >= 1);
    // The start of the feed is now too far away to keep.
    assert!(!snapshot.mounted.contains(&0));
    assert!(feed.factory.monitors(0)[0].released());

    advance(Duration::from_millis(4700)).await;
    assert!(feed.stats.watched_ad_ids().is_empty());

    advance(Duration::from_millis(500)).await;
    assert_eq!(feed.stats.watched_ad_ids(), vec!["6"]);
}

#[tokio::test(start_paused = true)]
async fn test_each_activation_episode_can_reward() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;

    advance(Duration::from_secs(6)).await;
    feed.swipe(1).await;
    feed.swipe(-1).await;
    assert_eq!(feed.snapshot().await.active_slot, Some(0));
    assert!(!feed.slot(0).await.unwrap().has_awarded_reward);

    advance(Duration::from_secs(6)).await;
    assert_eq!(feed.stats.watched_ad_ids(), vec!["1", "1"]);
    assert!(feed.slot(0).await.unwrap().has_awarded_reward);
    assert_eq!(feed.rewards.local_points(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_leaving_before_dwell_cancels_reward() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;

    advance(Duration::from_secs(3)).await;
    feed.swipe(1).await;

    let first = feed.slot(0).await.unwrap();
    assert!(!first.is_active);
    assert_ne!(first.load_state, LoadState::Playing);
    assert!(!feed.factory.monitors(0)[0].is_playing());

    advance(Duration::from_secs(2)).await;
    assert!(feed.stats.watched_ad_ids().is_empty());

    advance(Duration::from_millis(3500)).await;
    assert_eq!(feed.stats.watched_ad_ids(), vec!["2"]);
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_slot_is_active() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;

    for step in [1, 1, 1, -1] {
        feed.swipe(step).await;
        assert_single_active(&feed).await;
    }
    feed.jump_to(8).await;
    assert_single_active(&feed).await;
    feed.jump_to(0).await;
    assert_single_active(&feed).await;

    let changes = feed.events_of(EventType::ActiveSlotChanged).await;
    let indices: Vec<usize> = changes
        .iter()
        .filter_map(|e| match e.payload {
            EventPayload::Slot { index, .. } => Some(index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 2, 8, 0]);
}

async fn assert_single_active(feed: &crate::common::TestFeed) {
    let snapshot = feed.snapshot().await;
    let active: Vec<usize> = feed
        .slots()
        .await
        .into_iter()
        .filter(|slot| slot.is_active)
        .map(|slot| slot.index)
        .collect();
    assert_eq!(active, vec![snapshot.cursor.active_index]);
}

#[tokio::test(start_paused = true)]
async fn test_preload_window_and_candidates() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;
    feed.jump_to(4).await;

    let snapshot = feed.snapshot().await;
    for index in [3, 4, 5, 6] {
        assert!(snapshot.eligible.contains(&index), "slot {} not eligible", index);
    }

    let ahead = feed.slot(6).await.unwrap();
    assert!(ahead.is_preload_candidate);
    assert!(!ahead.is_active);
    assert_eq!(ahead.load_state, LoadState::Ready);
    assert!(!feed.slot(4).await.unwrap().is_preload_candidate);
}

#[tokio::test(start_paused = true)]
async fn test_mobile_window_is_narrower() {
    let feed = TestFeedBuilder::new().mobile().spawn();
    settle().await;
    assert_eq!(feed.snapshot().await.mounted, vec![0, 1]);

    feed.jump_to(4).await;
    let snapshot = feed.snapshot().await;
    // Slot 1 is still within the eviction margin and stays eligible.
    assert_eq!(snapshot.eligible, vec![1, 3, 4, 5]);
    assert!(feed.slot(6).await.is_none());

    let ahead = feed.slot(5).await.unwrap();
    assert!(ahead.is_preload_candidate);
    let uris: Vec<&str> = ahead.resolved_sources.iter().map(|s| s.uri.as_str()).collect();
    assert_eq!(
        uris,
        vec!["/videos/Adidas_Spot-6_480p.mp4", "/videos/Adidas_Spot-6_1080p.mp4"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_feed_grows_near_the_end_up_to_the_cap() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;

    let mut expected = 11;
    for jump in [10, 21, 32, 43] {
        feed.jump_to(jump).await;
        expected = (expected + 11).min(50);
        assert_eq!(feed.snapshot().await.cursor.length, expected);
    }

    feed.jump_to(49).await;
    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.cursor.length, 50);
    assert_eq!(feed.ad_source.calls(), 4);
    // Appended batches repeat the catalog.
    assert_eq!(snapshot.ads[11].id, snapshot.ads[0].id);

    let extended = feed.events_of(EventType::FeedExtended).await;
    assert_eq!(extended.len(), 4);
    assert_eq!(
        extended.last().unwrap().payload,
        EventPayload::Feed {
            added: 6,
            length: 50
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_autoplay_is_retried_then_waits() {
    let feed = TestFeedBuilder::new()
        .factory(MockElementFactory::rejecting(2))
        .spawn();
    settle().await;

    let slot = feed.slot(0).await.unwrap();
    assert_eq!(slot.load_state, LoadState::Ready);
    assert!(slot.failure.is_none());

    advance(Duration::from_millis(1200)).await;
    let monitor = &feed.factory.monitors(0)[0];
    assert_eq!(monitor.play_calls(), 3);
    assert!(monitor.is_playing());
    assert!(monitor.is_muted());
    assert_eq!(feed.slot(0).await.unwrap().load_state, LoadState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_play_retries_are_not_a_failure() {
    let feed = TestFeedBuilder::new()
        .factory(MockElementFactory::rejecting(10))
        .spawn();
    advance(Duration::from_secs(3)).await;

    let slot = feed.slot(0).await.unwrap();
    assert_eq!(slot.load_state, LoadState::Ready);
    assert!(slot.failure.is_none());
    assert_eq!(feed.factory.monitors(0)[0].play_calls(), 3);
    assert!(feed.events_of(EventType::SlotFailed).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unmute_and_pause_apply_to_the_active_slot() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;

    assert!(!feed.feed.toggle_mute().await.unwrap());
    assert!(!feed.factory.monitors(0)[0].is_muted());

    assert!(!feed.feed.toggle_pause().await.unwrap());
    assert_eq!(feed.slot(0).await.unwrap().load_state, LoadState::Ready);
    assert!(feed.feed.toggle_pause().await.unwrap());
    assert_eq!(feed.slot(0).await.unwrap().load_state, LoadState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_reward_without_session_asks_to_sign_in() {
    let feed = TestFeedBuilder::new().signed_out().spawn();
    settle().await;
    advance(Duration::from_secs(6)).await;

    assert_eq!(feed.rewards.local_points(), 1);
    assert!(feed.stats.watched_ad_ids().is_empty());
    let prompts = feed.events_of(EventType::SignInRequired).await;
    assert_eq!(prompts.len(), 1);
    assert!(matches!(
        &prompts[0].payload,
        EventPayload::Reward { ad_id, points: 1, .. } if ad_id.as_str() == "1"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_persistence_keeps_local_points() {
    let feed = TestFeedBuilder::new().spawn();
    feed.stats.inject_error("connection reset");
    settle().await;
    advance(Duration::from_secs(6)).await;

    assert_eq!(feed.rewards.local_points(), 1);
    assert!(feed.stats.watched_ad_ids().is_empty());
    assert_eq!(feed.events_of(EventType::PersistenceFailed).await.len(), 1);

    // Not retried later.
    feed.stats.clear_error();
    advance(Duration::from_secs(1)).await;
    assert!(feed.stats.watched_ad_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_every_slot() {
    let feed = TestFeedBuilder::new().spawn();
    settle().await;
    let mounted = feed.snapshot().await.mounted;
    assert_eq!(mounted, vec![0, 1, 2]);

    feed.feed.shutdown().unwrap();
    settle().await;

    for index in mounted {
        assert!(feed.factory.monitors(index)[0].released());
    }
    assert!(feed.feed.snapshot().await.is_err());
}
