use adreel::events::{EventBus, EventType};
use adreel::models::{UserId, WithdrawalStatus};
use adreel::services::WithdrawalService;
use adreel::utils::WithdrawalError;
use std::collections::HashMap;
use std::sync::Arc;

use crate::common::mocks::{MockStatsStore, MockWithdrawalStore};

struct Fixture {
    service: WithdrawalService,
    store: Arc<MockWithdrawalStore>,
    stats: Arc<MockStatsStore>,
    event_bus: Arc<EventBus>,
}

fn fixture(points: u64) -> Fixture {
    let store = Arc::new(MockWithdrawalStore::new());
    let stats = Arc::new(MockStatsStore::new());
    stats.set_points("viewer", points);
    let event_bus = Arc::new(EventBus::new(64));
    let service = WithdrawalService::new(store.clone(), stats.clone(), event_bus.clone());
    Fixture {
        service,
        store,
        stats,
        event_bus,
    }
}

fn paypal() -> HashMap<String, String> {
    HashMap::from([("email".to_string(), "viewer@example.com".to_string())])
}

fn viewer() -> UserId {
    UserId::new("viewer")
}

#[tokio::test]
async fn test_request_files_pending_and_deducts_points() {
    let f = fixture(1_500);

    let request = f
        .service
        .request_withdrawal(&viewer(), 1.0, 1_000, "paypal", paypal())
        .await
        .unwrap();

    assert_eq!(request.id.as_deref(), Some("w1"));
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(request.points_used, 1_000);
    assert_eq!(f.stats.points_for("viewer"), 500);
    assert_eq!(f.service.available_points(&viewer()).await.unwrap(), 500);

    let history = f.event_bus.get_history().await;
    assert!(history.iter().any(|e| e.event_type == EventType::WithdrawalRequested));
    assert!(history.iter().any(|e| e.event_type == EventType::PointsChanged));
}

#[tokio::test]
async fn test_rejects_requests_the_balance_cannot_cover() {
    let f = fixture(150);

    let error = f
        .service
        .request_withdrawal(&viewer(), 0.25, 250, "paypal", paypal())
        .await
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<WithdrawalError>(),
        Some(&WithdrawalError::InsufficientPoints {
            needed: 250,
            available: 150
        })
    );

    let error = f
        .service
        .request_withdrawal(&viewer(), 0.05, 50, "paypal", paypal())
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<WithdrawalError>(),
        Some(WithdrawalError::BelowMinimum { .. })
    ));

    assert!(f.store.requests.lock().unwrap().is_empty());
    assert_eq!(f.stats.points_for("viewer"), 150);
}

#[tokio::test]
async fn test_requires_payout_details() {
    let f = fixture(1_000);
    let blank = HashMap::from([("email".to_string(), "  ".to_string())]);

    let error = f
        .service
        .request_withdrawal(&viewer(), 0.5, 500, "paypal", blank)
        .await
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<WithdrawalError>(),
        Some(&WithdrawalError::MissingPayout)
    );
}

#[tokio::test]
async fn test_store_failure_keeps_the_balance() {
    let f = fixture(1_000);
    f.store.inject_error("insert failed");

    assert!(
        f.service
            .request_withdrawal(&viewer(), 0.5, 500, "paypal", paypal())
            .await
            .is_err()
    );
    assert_eq!(f.stats.points_for("viewer"), 1_000);
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let f = fixture(5_000);
    for amount in [0.5, 1.0, 2.0] {
        let points = (amount * 1_000.0) as u64;
        f.service
            .request_withdrawal(&viewer(), amount, points, "paypal", paypal())
            .await
            .unwrap();
    }

    let history = f.service.get_withdrawal_history(&viewer()).await.unwrap();
    let amounts: Vec<f64> = history.iter().map(|r| r.amount).collect();
    assert_eq!(amounts, vec![2.0, 1.0, 0.5]);
    assert_eq!(f.stats.points_for("viewer"), 1_500);
}

#[tokio::test]
async fn test_saved_payout_id_fills_empty_revolut_details() {
    let f = fixture(1_000);
    f.service.save_payout_id(&viewer(), "  @viewer ").await.unwrap();
    assert_eq!(
        f.service.saved_payout_id(&viewer()).await.unwrap().as_deref(),
        Some("@viewer")
    );

    let request = f
        .service
        .request_withdrawal(&viewer(), 0.5, 500, "revolut", HashMap::new())
        .await
        .unwrap();
    assert_eq!(
        request.payout_details.get("revolut").map(String::as_str),
        Some("@viewer")
    );

    // Details typed in for the request win over the saved id.
    let typed = HashMap::from([("revolut".to_string(), "+44 7700 900123".to_string())]);
    let request = f
        .service
        .request_withdrawal(&viewer(), 0.2, 200, "revolut", typed)
        .await
        .unwrap();
    assert_eq!(
        request.payout_details.get("revolut").map(String::as_str),
        Some("+44 7700 900123")
    );
}

#[tokio::test]
async fn test_saved_payout_id_only_applies_to_its_method() {
    let f = fixture(1_000);
    f.service.save_payout_id(&viewer(), "@viewer").await.unwrap();

    let error = f
        .service
        .request_withdrawal(&viewer(), 0.5, 500, "paypal", HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<WithdrawalError>(),
        Some(&WithdrawalError::MissingPayout)
    );

    let other = fixture(1_000);
    let error = other
        .service
        .request_withdrawal(&viewer(), 0.5, 500, "revolut", HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<WithdrawalError>(),
        Some(&WithdrawalError::MissingPayout)
    );
    assert!(other.store.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_payout_id_is_not_saved() {
    let f = fixture(0);
    assert!(f.service.save_payout_id(&viewer(), "   ").await.is_err());
    assert!(f.service.saved_payout_id(&viewer()).await.unwrap().is_none());
}
