//! Route tests, driven through `tower::ServiceExt::oneshot` against a
//! service whose nodes talk to `MockTransport`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use engine::EngineConfig;
use nodes::mock::MockTransport;

use crate::{router, AppState};

fn app(transport: &MockTransport) -> Router {
    let service = EngineConfig {
        workers: 2,
        queue_capacity: 16,
        ..EngineConfig::default()
    }
    .build_service_with(Arc::new(transport.clone()));
    router(AppState::new(Arc::new(service)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("valid request")
}

async fn wait_for(app: &Router, run_id: &str, done: impl Fn(&Value) -> bool) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = send(app, get(&format!("/api/workflow/{run_id}/status"))).await;
            assert_eq!(status, StatusCode::OK);
            if done(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time")
}

fn approval_graph() -> Value {
    json!({
        "nodes": [
            { "id": "fetch", "config": { "url": "http://fetch.local/" } },
            { "id": "approve", "type": "CALLBACK" }
        ],
        "edges": [ { "fromNodeId": "fetch", "toNodeId": "approve" } ]
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_then_poll_until_completed() {
    let transport = MockTransport::returning(201);
    let app = app(&transport);

    let graph = json!({
        "nodes": [
            { "id": "a", "config": { "url": "http://a.local/", "method": "POST", "body": "{}" } },
            { "id": "b", "config": { "url": "http://b.local/" } }
        ],
        "edges": [ { "fromNodeId": "a", "toNodeId": "b" } ]
    });
    let (status, handle) = send(&app, post_json("/api/workflow/run", &graph)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(handle["status"], "RUNNING");
    let run_id = handle["runId"].as_str().expect("run id").to_owned();

    let report = wait_for(&app, &run_id, |b| b["workflowStatus"] == "COMPLETED").await;
    assert_eq!(report["runId"], run_id.as_str());
    assert_eq!(report["nodeStatuses"]["a"], "SUCCESS");
    assert_eq!(report["results"]["b"]["statusCode"], 201);
    assert!(report["totalDurationMs"].is_u64());
}

#[tokio::test]
async fn unknown_run_is_404() {
    let app = app(&MockTransport::returning(200));

    let (status, body) = send(&app, get("/api/workflow/nope/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("nope")));

    let delete = Request::delete("/api/workflow/nope")
        .body(Body::empty())
        .expect("valid request");
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_graph_is_rejected() {
    let app = app(&MockTransport::returning(200));
    let request = Request::post("/api/workflow/run")
        .header("content-type", "application/json")
        .body(Body::from("{\"nodes\": 7}"))
        .expect("valid request");

    let response = app.oneshot(request).await.expect("infallible");
    assert!(response.status().is_client_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_hook_resumes_the_waiting_node() {
    let transport = MockTransport::returning(200);
    let app = app(&transport);

    let (_, handle) = send(&app, post_json("/api/workflow/run", &approval_graph())).await;
    let run_id = handle["runId"].as_str().expect("run id").to_owned();

    let report = wait_for(&app, &run_id, |b| b["workflowStatus"] == "PARTIALLY_SUSPENDED").await;
    assert_eq!(report["nodeStatuses"]["approve"], "WAITING_CALLBACK");
    let callback_id = report["results"]["approve"]["callbackId"]
        .as_str()
        .expect("callback id issued")
        .to_owned();

    // A suspended run cannot be evicted yet.
    let delete = || {
        Request::delete(format!("/api/workflow/{run_id}"))
            .body(Body::empty())
            .expect("valid request")
    };
    let (status, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let hook = Request::post(format!("/api/hooks/{callback_id}"))
        .body(Body::from("approved by ops"))
        .expect("valid request");
    let (status, body) = send(&app, hook).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "callbackId": callback_id, "outcome": "resumed" }));

    let report = wait_for(&app, &run_id, |b| b["workflowStatus"] == "COMPLETED").await;
    assert_eq!(report["results"]["approve"]["body"], "approved by ops");

    let again = Request::post(format!("/api/hooks/{callback_id}"))
        .body(Body::from("late"))
        .expect("valid request");
    let (status, body) = send(&app, again).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_resumed");

    let (status, body) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    let (status, _) = send(&app, get(&format!("/api/workflow/{run_id}/status"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_callback_is_still_200() {
    let app = app(&MockTransport::returning(200));
    let hook = Request::post("/api/hooks/not-a-callback")
        .body(Body::from("{}"))
        .expect("valid request");

    let (status, body) = send(&app, hook).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "unknown");
}
