//! End-to-end tests for the chat service against a mocked LightRAG server.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ragline_chat::policy::{FOLLOW_UP_DECISION_PROMPT, FOLLOW_UP_QUESTION_PROMPT};
use ragline_chat::{
    build_router, collaborator, AppState, ConversationManager, QuestionRules, SessionStore,
};
use ragline_common::Config;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.lightrag.url = format!("{}/query", server.uri());
    config.conversation.store_path = None;
    config
}

fn app_for(config: &Config) -> Router {
    let store = SessionStore::new(
        config.conversation.session_timeout_secs,
        config.conversation.max_follow_ups,
    );
    let (retriever, language) = collaborator::from_config(config);
    let manager = ConversationManager::new(
        store,
        retriever,
        language,
        QuestionRules::new(&config.conversation.rules),
    );
    build_router(AppState::new(manager), Duration::from_secs(10))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn mount_bypass(server: &MockServer, prompt: &str, reply: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({"query": prompt, "mode": "bypass"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": reply})))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_follow_ups_then_forced_final_answer() {
    let server = MockServer::start().await;
    mount_bypass(&server, FOLLOW_UP_DECISION_PROMPT, "ASK_FOLLOW_UP", 2).await;
    mount_bypass(
        &server,
        FOLLOW_UP_QUESTION_PROMPT,
        "Which crop and growth stage?",
        2,
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "mode": "mix",
            "include_references": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Spray neem oil [1] weekly.\n\n### References\n[1] pests.pdf"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&config_for(&server));

    let messages = [
        "My tomato leaves are curling",
        "Tomato, flowering",
        "Around forty days old",
    ];
    let mut replies = Vec::new();
    for message in messages {
        let (status, json) = send(
            &app,
            post("/chat", json!({"session_id": "farmer-1", "message": message})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        replies.push(json);
    }

    assert_eq!(replies[0]["type"], "follow_up");
    assert_eq!(replies[0]["response"], "Which crop and growth stage?");
    assert_eq!(replies[1]["type"], "follow_up");
    assert_eq!(replies[2]["type"], "final_answer");
    assert_eq!(replies[2]["response"], "Spray neem oil  weekly.");

    let (status, json) = send(&app, get("/sessions/farmer-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["follow_up_count"], 2);
    assert_eq!(json["data"]["history"].as_array().unwrap().len(), 6);
    assert_eq!(json["data"]["history"][0]["role"], "user");
    assert_eq!(json["data"]["history"][5]["role"], "assistant");

    let (status, json) = send(&app, post("/reset", json!({"session_id": "farmer-1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["existed"], true);

    let (_, json) = send(&app, get("/sessions/farmer-1")).await;
    assert_eq!(json["data"]["follow_up_count"], 0);
    assert!(json["data"]["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_keyword_question_skips_decision() {
    let server = MockServer::start().await;
    mount_bypass(&server, FOLLOW_UP_DECISION_PROMPT, "ASK_FOLLOW_UP", 0).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "query": "What is the fee for the AI in agriculture program?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "It is free."})))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&config_for(&server));
    let (status, json) = send(
        &app,
        post(
            "/chat",
            json!({
                "session_id": "s",
                "message": "What is the fee for the AI in agriculture program?"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["type"], "final_answer");
    assert_eq!(json["response"], "It is free.");
}

#[tokio::test]
async fn test_lightrag_failure_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let app = app_for(&config_for(&server));
    let (status, json) = send(
        &app,
        post("/chat", json!({"session_id": "s", "message": "What is Poshak?"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "COLLABORATOR_ERROR");

    // The failed exchange left nothing behind.
    let (status, json) = send(&app, get("/sessions/s")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_and_health() {
    let server = MockServer::start().await;
    let app = app_for(&config_for(&server));

    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_REQUEST");

    let (status, json) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "ragline-chat");
}
