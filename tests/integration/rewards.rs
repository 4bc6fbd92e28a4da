use adreel::config::PlaybackConfig;
use adreel::events::{EventBus, EventPayload, EventType};
use adreel::models::VideoAd;
use adreel::services::{RewardOutcome, RewardService};
use adreel::utils::PlaybackError;
use std::sync::Arc;

use crate::common::mocks::{MockAuth, MockStatsStore};

struct Fixture {
    service: RewardService,
    stats: Arc<MockStatsStore>,
    auth: Arc<MockAuth>,
    event_bus: Arc<EventBus>,
}

fn fixture(auth: MockAuth) -> Fixture {
    let stats = Arc::new(MockStatsStore::new());
    let auth = Arc::new(auth);
    let event_bus = Arc::new(EventBus::new(64));
    let config = PlaybackConfig {
        reward_points: 10,
        ..PlaybackConfig::default()
    };
    let service = RewardService::new(stats.clone(), auth.clone(), event_bus.clone(), &config);
    Fixture {
        service,
        stats,
        auth,
        event_bus,
    }
}

fn ad(id: &str) -> VideoAd {
    VideoAd::new(id, format!("/videos/Nike_{}_1080p.mp4", id), "Nike", "Just do it")
}

#[tokio::test]
async fn test_watch_is_persisted_for_signed_in_user() {
    let f = fixture(MockAuth::signed_in("viewer"));

    let outcome = f.service.on_watched(&ad("1")).await;
    let RewardOutcome::Persisted(stats) = outcome else {
        panic!("expected the watch to be persisted, got {:?}", outcome);
    };
    assert_eq!(stats.total_watched, 1);
    assert_eq!(stats.total_points, 10);
    assert_eq!(stats.total_watch_seconds, 5);

    let watches = f.stats.watches.lock().unwrap().clone();
    assert_eq!(watches.len(), 1);
    assert_eq!(watches[0].brand, "Nike");
    assert_eq!(watches[0].points_earned, 10);
    assert_eq!(watches[0].watch_duration_seconds, 5);

    let points = f.event_bus.get_history().await;
    assert!(points.iter().any(|e| e.event_type == EventType::PointsChanged
        && e.payload == EventPayload::Points { total: 10, delta: 10 }));
}

#[tokio::test]
async fn test_signed_out_watch_stays_local() {
    let f = fixture(MockAuth::signed_out());

    assert_eq!(f.service.on_watched(&ad("1")).await, RewardOutcome::LocalOnly);
    assert_eq!(f.service.on_watched(&ad("2")).await, RewardOutcome::LocalOnly);
    assert_eq!(f.service.local_points(), 20);
    assert!(f.stats.watches.lock().unwrap().is_empty());

    let stats = f.event_bus.get_stats().await;
    assert_eq!(stats.events_by_type.get("reward.sign_in_required"), Some(&2));
}

#[tokio::test]
async fn test_persistence_failure_is_reported_not_reverted() {
    let f = fixture(MockAuth::signed_in("viewer"));
    f.stats.inject_error("row level security");

    let outcome = f.service.on_watched(&ad("3")).await;
    assert!(matches!(
        outcome,
        RewardOutcome::PersistenceFailed(PlaybackError::PersistenceFailure(_))
    ));
    assert_eq!(f.service.local_points(), 10);

    let failures: Vec<_> = f
        .event_bus
        .get_history()
        .await
        .into_iter()
        .filter(|e| e.event_type == EventType::PersistenceFailed)
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn test_failed_increment_still_records_the_watch() {
    let f = fixture(MockAuth::signed_in("viewer"));
    f.stats.inject_increment_error("stats row locked");

    let outcome = f.service.on_watched(&ad("6")).await;
    let RewardOutcome::PersistenceFailed(PlaybackError::PersistenceFailure(message)) = outcome
    else {
        panic!("expected a persistence failure, got {:?}", outcome);
    };
    assert!(message.contains("stats row locked"));

    assert_eq!(f.stats.watched_ad_ids(), vec!["6"]);
    assert_eq!(f.stats.points_for("viewer"), 0);
    assert_eq!(f.service.local_points(), 10);

    let history = f.event_bus.get_history().await;
    let failures = history
        .iter()
        .filter(|e| e.event_type == EventType::PersistenceFailed)
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_refresh_loads_balance_after_sign_in() {
    let f = fixture(MockAuth::signed_out());
    f.stats.set_points("viewer", 250);
    assert!(f.service.refresh_from_backend().await.unwrap().is_none());
    assert_eq!(f.service.local_points(), 0);

    f.auth.sign_in("viewer");
    let stats = f.service.refresh_from_backend().await.unwrap().unwrap();
    assert_eq!(stats.total_points, 250);
    assert_eq!(f.service.local_points(), 250);

    f.service.on_watched(&ad("4")).await;
    f.service.on_watched(&ad("5")).await;
    let recent = f.service.recent_watches(1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].ad_id.as_str(), "5");
    assert_eq!(f.stats.points_for("viewer"), 270);
}
