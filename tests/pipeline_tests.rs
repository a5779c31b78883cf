//! End-to-end pipeline tests: producer -> state store -> hub -> subscribers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use meos_live::models::{Class, Club, Competitor, CompetitorStatus, Event};
use meos_live::sse::Hub;
use meos_live::state::State;

fn sample_event() -> Event {
    Event {
        name: "Spring Sprint".to_string(),
        organizer: "Test Club".to_string(),
        start: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
    }
}

fn sample_competitor(id: u32, status: CompetitorStatus) -> Competitor {
    Competitor {
        id,
        card: 500_000 + id,
        club: Club {
            id: 1,
            country_code: "SWE".to_string(),
            name: "OK Silva".to_string(),
        },
        class: Class {
            id: 1,
            order_key: 10,
            radio_controls: vec![],
            name: "Men Elite".to_string(),
        },
        status,
        start_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap()),
        finish_time: None,
        name: format!("Runner {id}"),
        splits: vec![],
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn state_change_notifies_every_subscriber_once() {
    let state = Arc::new(State::new());
    let (hub, coordinator) = Hub::new();
    tokio::spawn(coordinator.run());

    {
        let hub = hub.clone();
        state.on_update(move || {
            hub.broadcast_update("update", json!({"time": 0}));
        });
    }

    let mut subscribers = Vec::new();
    for _ in 0..3 {
        subscribers.push(hub.subscribe().await);
    }
    settle().await;
    assert_eq!(hub.connected_clients(), 3);

    state.update_from_meos(
        Some(sample_event()),
        vec![],
        vec![],
        vec![],
        vec![sample_competitor(1, CompetitorStatus::NotStarted)],
    );

    for subscriber in &mut subscribers {
        let event = tokio::time::timeout(Duration::from_secs(1), subscriber.recv())
            .await
            .expect("subscriber should receive the update")
            .unwrap();
        assert_eq!(event.event, "update");
    }

    // An identical generation is swapped in silently: no second event.
    state.update_from_meos(
        Some(sample_event()),
        vec![],
        vec![],
        vec![],
        vec![sample_competitor(1, CompetitorStatus::NotStarted)],
    );
    settle().await;
    for subscriber in &mut subscribers {
        let outcome =
            tokio::time::timeout(Duration::from_millis(100), subscriber.recv()).await;
        assert!(outcome.is_err(), "no event expected for an identical update");
    }

    // A real change (status transition) notifies again.
    state.update_from_meos(
        Some(sample_event()),
        vec![],
        vec![],
        vec![],
        vec![sample_competitor(1, CompetitorStatus::Running)],
    );
    for subscriber in &mut subscribers {
        let event = tokio::time::timeout(Duration::from_secs(1), subscriber.recv())
            .await
            .expect("subscriber should receive the second update")
            .unwrap();
        assert_eq!(event.event, "update");
    }

    drop(subscribers);
    settle().await;
    assert_eq!(hub.connected_clients(), 0);
}

#[tokio::test]
async fn late_registration_sees_later_updates() {
    let state = Arc::new(State::new());
    let (hub, coordinator) = Hub::new();
    tokio::spawn(coordinator.run());

    // First update happens before anyone listens; harmless.
    state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], vec![]);

    {
        let hub = hub.clone();
        state.on_update(move || {
            hub.broadcast_update("update", json!({"time": 1}));
        });
    }
    let mut subscriber = hub.subscribe().await;
    settle().await;

    state.update_from_meos(
        Some(sample_event()),
        vec![],
        vec![],
        vec![],
        vec![sample_competitor(1, CompetitorStatus::NotStarted)],
    );

    let event = tokio::time::timeout(Duration::from_secs(1), subscriber.recv())
        .await
        .expect("late subscriber should receive the update")
        .unwrap();
    assert_eq!(event.event, "update");
}
