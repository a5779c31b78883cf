//! Integration tests for the MeOS reconciliation engine against a mock
//! upstream server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;

use meos_live::adapter::SourceAdapter;
use meos_live::config::MeosConfig;
use meos_live::error::Error;
use meos_live::meos::MeosAdapter;
use meos_live::models::CompetitorStatus;
use meos_live::state::State;

const COMPLETE: &str = r#"<MOPComplete nextdifference="1">
  <competition date="2024-06-01" organizer="Test Club" zerotime="10:00:00">Spring Sprint</competition>
  <ctrl id="100">Radio 1</ctrl>
  <ctrl id="101">Radio 2</ctrl>
  <cls id="1" ord="10" radio="100,101">Men Elite</cls>
  <org id="5" nat="SWE">OK Silva</org>
  <cmp id="7" card="500007">
    <base org="5" cls="1" stat="2" st="378000" rt="0">Emma Smith</base>
    <radio>100,3000</radio>
  </cmp>
</MOPComplete>"#;

const DIFF: &str = r#"<MOPDiff nextdifference="2">
  <ctrl id="102">Radio 3</ctrl>
  <cmp id="7" card="500007">
    <base org="5" cls="1" stat="1" st="378000" rt="21000">Emma Smith</base>
    <radio>100,3000;101,12000</radio>
  </cmp>
</MOPDiff>"#;

fn config_for(server: &MockServer) -> MeosConfig {
    MeosConfig {
        hostname: server.host(),
        port: Some(server.port()),
        poll_interval: Duration::from_millis(100),
        https: false,
    }
}

fn counting_state() -> (Arc<State>, Arc<AtomicUsize>) {
    let state = Arc::new(State::new());
    let updates = Arc::new(AtomicUsize::new(0));
    let counter = updates.clone();
    state.on_update(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (state, updates)
}

#[tokio::test]
async fn connect_fetches_and_reconciles_one_cycle() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/meos")
                .query_param("difference", "zero");
            then.status(200)
                .header("content-type", "application/xml")
                .body(COMPLETE);
        })
        .await;

    let (state, updates) = counting_state();
    let adapter = MeosAdapter::new(config_for(&server), state.clone()).unwrap();
    adapter.connect().await.unwrap();

    mock.assert_async().await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    let event = state.event().unwrap();
    assert_eq!(event.name, "Spring Sprint");
    assert_eq!(state.controls().len(), 2);

    let competitor = state.competitor(7).unwrap();
    assert_eq!(competitor.status, CompetitorStatus::Running);
    assert_eq!(competitor.club.name, "OK Silva");
    assert_eq!(competitor.class.name, "Men Elite");
}

#[tokio::test]
async fn repeated_cursor_reports_no_update() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/meos")
                .query_param("difference", "zero");
            then.status(200).body(COMPLETE);
        })
        .await;
    // The upstream keeps answering with the same envelope and cursor.
    server
        .mock_async(|when, then| {
            when.method(GET).path("/meos").query_param("difference", "1");
            then.status(200).body(COMPLETE);
        })
        .await;

    let (state, updates) = counting_state();
    let adapter = MeosAdapter::new(config_for(&server), state.clone()).unwrap();

    adapter.connect().await.unwrap();
    let before = state.competitors();
    // Second cycle sees its own cursor again: deliberate no-op.
    adapter.connect().await.unwrap();

    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(state.competitors(), before);
}

#[tokio::test]
async fn polling_merges_diffs_until_stopped() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/meos")
                .query_param("difference", "zero");
            then.status(200).body(COMPLETE);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/meos").query_param("difference", "1");
            then.status(200).body(DIFF);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/meos").query_param("difference", "2");
            then.status(200).body(DIFF);
        })
        .await;

    let (state, updates) = counting_state();
    let adapter = MeosAdapter::new(config_for(&server), state.clone()).unwrap();
    adapter.connect().await.unwrap();
    adapter.start_polling().unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    adapter.stop();

    // Complete replaced, then the diff appended one control and
    // finished the competitor; later identical cursors were no-ops.
    assert_eq!(updates.load(Ordering::SeqCst), 2);
    assert_eq!(state.controls().len(), 3);

    let competitor = state.competitor(7).unwrap();
    assert_eq!(competitor.status, CompetitorStatus::Finished);
    assert!(competitor.finish_time.is_some());
    assert_eq!(competitor.splits.len(), 2);

    // No shell references survived the cycles.
    assert_eq!(competitor.splits[1].control.name, "Radio 2");
}

#[tokio::test]
async fn connect_surfaces_http_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/meos");
            then.status(500);
        })
        .await;

    let state = Arc::new(State::new());
    let adapter = MeosAdapter::new(config_for(&server), state).unwrap();
    match adapter.connect().await {
        Err(Error::HttpStatus(500)) => {}
        other => panic!("expected HttpStatus(500), got {other:?}"),
    }
}

#[tokio::test]
async fn connect_surfaces_unknown_root() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/meos");
            then.status(200).body("<SomethingElse/>");
        })
        .await;

    let state = Arc::new(State::new());
    let adapter = MeosAdapter::new(config_for(&server), state).unwrap();
    assert!(matches!(
        adapter.connect().await,
        Err(Error::UnknownRoot(_))
    ));
}

#[tokio::test]
async fn start_polling_before_connect_fails() {
    let state = Arc::new(State::new());
    let adapter = MeosAdapter::new(MeosConfig::default(), state).unwrap();
    assert!(matches!(adapter.start_polling(), Err(Error::NotConnected)));
}

#[tokio::test]
async fn reconnect_after_stop_works() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/meos");
            then.status(200).body(COMPLETE);
        })
        .await;

    let (state, _updates) = counting_state();
    let adapter = MeosAdapter::new(config_for(&server), state).unwrap();

    adapter.connect().await.unwrap();
    adapter.start_polling().unwrap();
    adapter.stop();

    adapter.connect().await.unwrap();
    adapter.start_polling().unwrap();
    adapter.stop();
}
