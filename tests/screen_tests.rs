use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use metravel_quests::quest::{
    ProgressBucket, ProgressStore, QuestRegistry, SaveState, DEFAULT_STORAGE_KEY,
};
use metravel_quests::screen::{router, AppState};
use metravel_quests::storage::MemoryStore;

async fn app_with(backend: Arc<MemoryStore>) -> (Router, Arc<ProgressStore>) {
    let store = ProgressStore::open(backend, DEFAULT_STORAGE_KEY).await;
    let state = AppState::new(Arc::new(QuestRegistry::builtin()), Arc::clone(&store));
    (router(state), store)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

const DRAGON: &str = "/api/quests/krakow/krakow-dragon";

#[tokio::test]
async fn test_unknown_quest_renders_not_found() {
    let (app, store) = app_with(Arc::new(MemoryStore::new())).await;

    let (status, body) = send(&app, Method::GET, "/api/quests/krakow/no-such-quest", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["quest_id"], "no-such-quest");
    assert_eq!(body["back_link"], "/quests");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/quests/krakow/no-such-quest/answer",
        Some(json!({ "answer": "north" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(store.load_state().await, SaveState::default());
}

#[tokio::test]
async fn test_full_quest_walkthrough() {
    let (app, store) = app_with(Arc::new(MemoryStore::new())).await;

    let (status, body) = send(&app, Method::GET, DRAGON, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quest"]["id"], "krakow-dragon");
    assert_eq!(body["wizard"]["phase"], "intro");
    assert_eq!(body["wizard"]["step_count"], 4);

    let (_, body) = send(&app, Method::POST, &format!("{DRAGON}/start"), None).await;
    assert_eq!(body["transition"]["outcome"], "started");
    assert_eq!(body["wizard"]["phase"], json!({ "step": 0 }));
    assert_eq!(body["wizard"]["current_step"]["requires_answer"], true);

    let answer = format!("{DRAGON}/answer");
    let (_, body) = send(&app, Method::POST, &answer, Some(json!({ "answer": "south" }))).await;
    assert_eq!(body["transition"]["outcome"], "rejected");
    assert_eq!(body["wizard"]["rejection"]["attempts"], 1);
    assert_eq!(body["wizard"]["unlocked_index"], 0);

    let (_, body) = send(&app, Method::POST, &answer, Some(json!({ "answer": "  NORTH  " }))).await;
    assert_eq!(body["transition"]["outcome"], "advanced");
    assert_eq!(body["wizard"]["unlocked_index"], 1);
    assert!(body["wizard"]["rejection"].is_null());

    let next = format!("{DRAGON}/continue");
    let (_, body) = send(&app, Method::POST, &next, None).await;
    assert_eq!(body["transition"]["step_id"], "bones");

    let (_, body) = send(&app, Method::POST, &next, None).await;
    assert_eq!(body["transition"]["outcome"], "answer_required");

    let (_, body) = send(&app, Method::POST, &answer, Some(json!({ "answer": "135" }))).await;
    assert_eq!(body["wizard"]["unlocked_index"], 3);

    let (_, body) = send(&app, Method::POST, &next, None).await;
    assert_eq!(body["transition"]["completed"], true);
    assert_eq!(body["wizard"]["phase"], "finale");
    assert_eq!(body["wizard"]["finale"]["title"], "The dragon is defeated");

    let (_, body) = send(&app, Method::POST, &answer, Some(json!({ "answer": "north" }))).await;
    assert_eq!(body["transition"]["outcome"], "ignored");

    let persisted = store.load_state().await;
    let bucket = persisted.bucket("krakow", "krakow_dragon").unwrap();
    assert_eq!(bucket.unlocked_index, 4);
    assert_eq!(bucket.answers["gate"], "NORTH");
    assert_eq!(bucket.answers["cave"], "135");

    let (_, body) = send(&app, Method::GET, "/api/profile", None).await;
    assert_eq!(body["completed_quests"], 1);
    assert_eq!(body["started_quests"], 1);
}

#[tokio::test]
async fn test_resume_from_saved_progress() {
    let mut saved = SaveState::new();
    let mut bucket = ProgressBucket::default();
    bucket.unlocked_index = 2;
    bucket.record_answer("gate", "север");
    saved.set_bucket("krakow", "krakow_dragon", bucket);
    let backend = Arc::new(MemoryStore::with_value(
        DEFAULT_STORAGE_KEY,
        &saved.to_json().unwrap(),
    ));
    let (app, _store) = app_with(backend).await;

    let (_, body) = send(&app, Method::GET, &format!("{DRAGON}?lat=50.0532&lng=19.9336"), None).await;
    assert_eq!(body["wizard"]["phase"], json!({ "step": 2 }));
    assert_eq!(body["wizard"]["current_step"]["id"], "cave");
    assert_eq!(body["wizard"]["completed_steps"][0]["answer"], "север");
    assert!(body["distance_km"].as_f64().unwrap() < 0.01);
}

#[tokio::test]
async fn test_reset_keeps_other_quests() {
    let mut saved = SaveState::new();
    saved.set_bucket("krakow", "krakow_dragon", ProgressBucket { unlocked_index: 2, ..Default::default() });
    saved.set_bucket("krakow", "krakow_kazimierz", ProgressBucket { unlocked_index: 1, ..Default::default() });
    let backend = Arc::new(MemoryStore::with_value(
        DEFAULT_STORAGE_KEY,
        &saved.to_json().unwrap(),
    ));
    let (app, store) = app_with(backend).await;

    let (_, body) = send(&app, Method::POST, &format!("{DRAGON}/reset"), None).await;
    assert_eq!(body["transition"]["outcome"], "reset");
    assert_eq!(body["wizard"]["phase"], "intro");

    let persisted = store.load_state().await;
    assert!(persisted.bucket("krakow", "krakow_dragon").unwrap().is_blank());
    assert_eq!(persisted.bucket("krakow", "krakow_kazimierz").unwrap().unlocked_index, 1);
}

#[tokio::test]
async fn test_catalog_listings() {
    let (app, _store) = app_with(Arc::new(MemoryStore::new())).await;

    let (_, body) = send(&app, Method::GET, "/api/cities/krakow/quests", None).await;
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|q| q["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["krakow-dragon", "krakow-kazimierz"]);

    let (_, body) = send(&app, Method::GET, "/api/cities/atlantis/quests", None).await;
    assert_eq!(body, json!([]));

    let (_, body) = send(&app, Method::GET, "/api/cities", None).await;
    let warsaw = body.as_array().unwrap().iter().find(|c| c["id"] == "warsaw").unwrap();
    assert_eq!(warsaw["quest_count"], 0);

    let (_, body) = send(&app, Method::GET, "/api/quests/map", None).await;
    assert_eq!(body.as_array().unwrap().len(), 4);

    let (status, body) = send(&app, Method::GET, "/api/quests/nearby?lat=50.06&lng=19.94&radius_km=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let nearby: Vec<&str> = body.as_array().unwrap().iter().map(|q| q["city_id"].as_str().unwrap()).collect();
    assert_eq!(nearby, vec!["krakow", "krakow"]);

    let (status, _) = send(&app, Method::GET, "/api/quests/nearby?lat=200&lng=19.94", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_profile_update() {
    let (app, store) = app_with(Arc::new(MemoryStore::new())).await;

    let (status, _) = send(&app, Method::PUT, "/api/profile", Some(json!({ "name": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::PUT, "/api/profile", Some(json!({ "name": "Ola" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ola");
    assert_eq!(store.load_state().await.user.unwrap().name, "Ola");
}
