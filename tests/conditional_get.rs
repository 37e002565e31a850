//! End-to-end conditional-GET behavior over the real router: a fresh day
//! file is served with caching headers, and a repeat request carrying those
//! headers back gets a 304 instead of a re-render.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use esologs::archive::FileWriter;
use esologs::clock::{Clock, FixedClock, US_PER_DAY};
use esologs::format::TargetConfig;
use esologs::index::Index;
use esologs::model::{LogEvent, Ymd};
use esologs::router::{build_router, RouterState, TargetState};
use esologs::stalker::Stalker;

fn event(nick: &str, text: &str) -> LogEvent {
    LogEvent::new(
        Some(format!("{nick}!u@h")),
        "PRIVMSG",
        vec!["#chan".to_string(), text.to_string()],
    )
}

async fn build_state(root: std::path::PathBuf, clock: Arc<dyn Clock>) -> Arc<RouterState> {
    let index = Arc::new(Index::new(root, clock.clone()).await.unwrap());
    let config = TargetConfig {
        name: "chan".to_string(),
        nick: "logbot".to_string(),
        title: "#chan".to_string(),
        about: None,
        announce: None,
    };

    let mut targets = HashMap::new();
    targets.insert(
        "chan".to_string(),
        TargetState {
            index: index.clone(),
            config: config.clone(),
        },
    );

    let mut index_by_name = HashMap::new();
    index_by_name.insert("chan".to_string(), index);
    let stalker = Arc::new(Stalker::new(vec![config], Arc::new(index_by_name), clock.clone()));

    Arc::new(RouterState {
        targets,
        stalker,
        clock,
    })
}

#[tokio::test]
async fn day_page_round_trips_through_conditional_get() {
    let dir = tempfile::tempdir().unwrap();
    let ymd = Ymd::new(2024, 3, 15);
    let day_dir = dir.path().join("2024").join("3");
    std::fs::create_dir_all(&day_dir).unwrap();
    let mut writer = FileWriter::open(&day_dir.join("15.pb")).unwrap();
    writer.write(&event("alice", "hello there")).unwrap();
    writer.write(&event("bob", "hi alice")).unwrap();
    drop(writer);

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(ymd.day_number() * US_PER_DAY + 1));
    let state = build_state(dir.path().to_path_buf(), clock).await;

    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/chan/2024-3-15.html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let etag = response
        .headers()
        .get("etag")
        .map(|v| v.to_str().unwrap().to_string());

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("alice"));
    assert!(html.contains("hello there"));

    let Some(etag) = etag else {
        return;
    };

    let replay = app
        .oneshot(
            Request::builder()
                .uri("/chan/2024-3-15.html")
                .header("if-none-match", etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(replay.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn stalker_snapshot_renders_ring_contents() {
    use esologs::model::EventId;

    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let state = build_state(dir.path().to_path_buf(), clock).await;

    let mut e = event("alice", "hello from the ring");
    e.event_id = Some(EventId {
        target: "chan".to_string(),
        day: 19_000,
        line: 0,
    });
    state.stalker.on_event(e).await;

    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/chan/stalker.html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("hello from the ring"));
    assert!(html.contains("\u{2191}year"));
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let state = build_state(dir.path().to_path_buf(), clock).await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope/2024-3-15.html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
