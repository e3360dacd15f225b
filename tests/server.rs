//! HTTP-level tests for the extension API.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; the LLM
//! is replaced by a scripted [`ChatClient`] and persistence is a real SQLite
//! file in a temp directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tower::ServiceExt;

use event_harvester::config::Config;
use event_harvester::error::{Error, Result};
use event_harvester::llm::{ChatClient, ChatRequest};
use event_harvester::migrate::apply_schema;
use event_harvester::server::{router, AppState};
use event_harvester::store::{ContactStore, SqliteStore};
use event_harvester::tokens::CharEstimateCounter;

/// Email mode: one event per `Subject:` line in the prompt's text section,
/// failing when the text contains `FAIL`. Free-text mode: a fixed event
/// with two participants.
struct ScriptedClient {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = request.user.split("Text to analyze:").nth(1).unwrap_or("");

        if request.system.contains("Participants") {
            if text.contains("garbage") {
                return Ok("I could not find any events.".to_string());
            }
            return Ok(json!({
                "events": [{
                    "title": "Coffee",
                    "time": {"iso": "2025-04-11T15:00/2025-04-11T15:30", "display": "Apr 11, 3 PM"},
                    "participants": ["Sam@Example.com", "kim@example.com"],
                    "description": "catch-up"
                }]
            })
            .to_string());
        }

        if text.contains("FAIL") {
            return Err(Error::RemoteCall("upstream unavailable".to_string()));
        }

        let events: Vec<Value> = text
            .lines()
            .filter_map(|l| l.strip_prefix("Subject: "))
            .map(|subject| {
                json!({
                    "event": subject,
                    "raw_subject": subject,
                    "time": {"iso": "Not specified", "display": "Not specified"},
                    "context": "",
                    "sender": "events@school.edu",
                    "urgency": "low",
                    "gmailThread": ""
                })
            })
            .collect();
        Ok(format!("```json\n{}\n```", json!({ "events": events })))
    }
}

struct Harness {
    _tmp: TempDir,
    app: Router,
    store: Arc<SqliteStore>,
    client: Arc<ScriptedClient>,
}

async fn harness(max_tokens: usize) -> Harness {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("evh.sqlite");
    config.chunking.max_tokens = max_tokens;
    config.chunking.tokenizer = "chars".to_string();
    config.dispatch.max_concurrency = Some(4);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&config.db.path)
                .create_if_missing(true),
        )
        .await
        .unwrap();
    apply_schema(&pool).await.unwrap();

    let store = Arc::new(SqliteStore::new(pool));
    let client = Arc::new(ScriptedClient {
        calls: AtomicUsize::new(0),
    });
    let state = AppState::new(
        config,
        Arc::new(CharEstimateCounter),
        client.clone(),
        store.clone(),
    );

    Harness {
        _tmp: tmp,
        app: router(state),
        store,
        client,
    }
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, bytes.to_vec())
}

fn emails(subjects: &[&str]) -> String {
    let emails: Vec<Value> = subjects
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "subject": s,
                "sender": "events@school.edu",
                "snippet": "See you there.",
                "gmailThread": format!("t{}", i)
            })
        })
        .collect();
    json!({ "emails": emails }).to_string()
}

fn ndjson(bytes: &[u8]) -> Vec<Value> {
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn parse_small_batch_streams_one_chunk() {
    let h = harness(4000).await;
    let (status, content_type, body) = post(
        &h.app,
        "/parse",
        json!({ "text": emails(&["Talk", "Lab", "Fair"]), "user_timezone": "UTC" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/x-ndjson"));

    let records = ndjson(&body);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["chunk_index"], 0);
    assert_eq!(records[0]["total_chunks"], 1);
    assert_eq!(records[0]["new_events"].as_array().unwrap().len(), 3);
    assert_eq!(records[1]["complete"], true);
    assert_eq!(records[1]["all_events"].as_array().unwrap().len(), 3);
    assert_eq!(h.client.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parse_large_batch_emits_chunks_plus_one() {
    // ~20 tokens per block, so a 30-token budget puts each email in its own chunk.
    let h = harness(30).await;
    let subjects = ["A1", "B2", "C3", "D4", "E5"];
    let (status, _, body) = post(&h.app, "/parse", json!({ "text": emails(&subjects) })).await;
    assert_eq!(status, StatusCode::OK);

    let records = ndjson(&body);
    assert_eq!(records.len(), subjects.len() + 1);
    let last = records.last().unwrap();
    assert_eq!(last["complete"], true);
    assert_eq!(last["total_chunks"], 5);
    assert_eq!(last["all_events"].as_array().unwrap().len(), 5);
    assert!(records[..5].iter().all(|r| r.get("complete").is_none()));
}

#[tokio::test]
async fn parse_twice_suppresses_seen_events() {
    let h = harness(4000).await;
    let body = json!({ "text": emails(&["Talk", "Lab"]), "user_email": "me@school.edu" });

    let first = ndjson(&post(&h.app, "/parse", body.clone()).await.2);
    assert_eq!(first.last().unwrap()["all_events"].as_array().unwrap().len(), 2);

    let second = ndjson(&post(&h.app, "/parse", body).await.2);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["complete"], true);
    assert!(second[0]["all_events"].as_array().unwrap().is_empty());

    // A different user still sees them.
    let other = ndjson(
        &post(
            &h.app,
            "/parse",
            json!({ "text": emails(&["Talk", "Lab"]), "user_email": "you@school.edu" }),
        )
        .await
        .2,
    );
    assert_eq!(other.last().unwrap()["all_events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn parse_failed_chunk_still_completes() {
    let h = harness(30).await;
    let (_, _, body) = post(
        &h.app,
        "/parse",
        json!({ "text": emails(&["Ok1", "FAIL", "Ok2"]) }),
    )
    .await;

    let records = ndjson(&body);
    assert_eq!(records.len(), 4);
    let errors: Vec<&Value> = records.iter().filter(|r| r.get("error").is_some()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["chunk_index"], 1);
    assert!(errors[0]["error"].as_str().unwrap().contains("upstream unavailable"));

    let last = records.last().unwrap();
    assert_eq!(last["complete"], true);
    assert_eq!(last["all_events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn parse_rejects_missing_text() {
    let h = harness(4000).await;
    let (status, _, body) = post(&h.app, "/parse", json!({ "text": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"]["code"], "bad_request");
    assert!(value["error"]["message"].as_str().unwrap().contains("No text provided"));
}

#[tokio::test]
async fn parse_rejects_text_that_is_not_an_email_batch() {
    let h = harness(4000).await;
    let (status, _, _) = post(&h.app, "/parse", json!({ "text": "hello there" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn parse_rejects_non_json_body() {
    let h = harness(4000).await;
    let request = Request::builder()
        .method("POST")
        .uri("/parse")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn free_text_saves_participants_as_contacts() {
    let h = harness(4000).await;
    let (status, _, body) = post(
        &h.app,
        "/parse_free_text",
        json!({
            "text": "coffee with sam tomorrow at 3",
            "user_timezone": "America/New_York",
            "user_now": "2025-04-10T09:00:00-04:00",
            "user_email": "me@school.edu"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["events"][0]["title"], "Coffee");
    assert_eq!(value["events"][0]["participants"].as_array().unwrap().len(), 2);

    let contacts = h.store.suggest("me@school.edu", None).await.unwrap();
    assert_eq!(contacts, vec!["sam@example.com", "kim@example.com"]);
}

#[tokio::test]
async fn free_text_rejects_empty_input() {
    let h = harness(4000).await;
    let (status, _, _) = post(&h.app, "/parse_free_text", json!({ "text": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn free_text_malformed_reply_is_bad_gateway() {
    let h = harness(4000).await;
    let (status, _, body) = post(
        &h.app,
        "/parse_free_text",
        json!({ "text": "garbage in" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"]["code"], "malformed_response");
}

#[tokio::test]
async fn contacts_ranked_and_filtered() {
    let h = harness(4000).await;
    for _ in 0..3 {
        h.store.save("me@school.edu", "alice@school.edu").await.unwrap();
    }
    h.store.save("me@school.edu", "bob@gmail.com").await.unwrap();

    let (status, _, body) = post(
        &h.app,
        "/contacts",
        json!({ "user_email": "me@school.edu" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["count"], 2);
    assert_eq!(value["contacts"][0]["email"], "alice@school.edu");
    assert_eq!(value["contacts"][1]["email"], "bob@gmail.com");

    let (_, _, body) = post(
        &h.app,
        "/contacts",
        json!({ "user_email": "me@school.edu", "query": "GMAIL" }),
    )
    .await;
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["count"], 1);
    assert_eq!(value["contacts"][0]["email"], "bob@gmail.com");
}

#[tokio::test]
async fn contacts_default_limit_and_zero_override() {
    let h = harness(4000).await;
    for i in 0..7 {
        h.store
            .save("me@school.edu", &format!("c{}@school.edu", i))
            .await
            .unwrap();
    }

    let (_, _, body) = post(&h.app, "/contacts", json!({ "user_email": "me@school.edu" })).await;
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["count"], 5);

    let (_, _, body) = post(
        &h.app,
        "/contacts",
        json!({ "user_email": "me@school.edu", "limit": 0 }),
    )
    .await;
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["count"], 7);
}

#[tokio::test]
async fn contacts_requires_user_email() {
    let h = harness(4000).await;
    let (status, _, _) = post(&h.app, "/contacts", json!({ "query": "a" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_version() {
    let h = harness(4000).await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}
