//! Router-level tests: sessions, settings and the prompt fan-out over HTTP.

use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use multiprompt_core::api::{build_state, router};
use multiprompt_core::config::AppConfig;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header as match_header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    app: Router,
    _dir: TempDir,
}

fn test_app(upstream: &MockServer) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut vars = HashMap::new();
    vars.insert("DATA_DIR", dir.path().display().to_string());
    vars.insert("ADMIN_USER", "admin".to_string());
    vars.insert("ADMIN_PASS", "hunter22".to_string());
    vars.insert("ENCRYPTION_KEY", "integration-test-key".to_string());
    vars.insert("OPENAI_BASE_URL", upstream.uri());
    vars.insert("ANTHROPIC_BASE_URL", upstream.uri());
    vars.insert("GEMINI_BASE_URL", upstream.uri());
    let config = AppConfig::from_lookup(move |key: &str| vars.get(key).cloned()).unwrap();
    let state = build_state(config).unwrap();
    TestApp {
        app: router(state),
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, cookie, body)
}

fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Signs in as the bootstrap admin and returns the `Cookie` header value.
async fn sign_in(app: &Router) -> String {
    let (status, set_cookie, _) = send(
        app,
        post_json(
            "/auth/login",
            None,
            json!({ "username": "admin", "password": "hunter22" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let set_cookie = set_cookie.expect("login sets a session cookie");
    set_cookie.split(';').next().unwrap().trim().to_string()
}

#[tokio::test]
async fn ping_needs_no_session() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);
    let (status, _, body) = send(&t.app, get("/api/ping", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);

    for uri in ["/api/me", "/api/settings", "/api/accounts", "/api/events"] {
        let (status, _, body) = send(&t.app, get(uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["code"], "AUTH-1001");
    }
    let (status, _, _) = send(
        &t.app,
        post_json("/api/prompt", Some("sess=not-a-real-token"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_validates_and_sets_cookie() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);

    let (status, _, body) = send(&t.app, post_json("/auth/login", None, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username and password required");

    let (status, cookie, _) = send(
        &t.app,
        post_json(
            "/auth/login",
            None,
            json!({ "username": "admin", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookie.is_none());

    let cookie = sign_in(&t.app).await;
    assert!(cookie.starts_with("sess="));

    let (status, _, body) = send(&t.app, get("/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "admin");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);
    let cookie = sign_in(&t.app).await;

    let (status, _, _) = send(&t.app, post_json("/auth/logout", Some(&cookie), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&t.app, get("/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn settings_are_write_only() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);
    let cookie = sign_in(&t.app).await;

    let (status, _, _) = send(
        &t.app,
        post_json(
            "/api/settings",
            Some(&cookie),
            json!({ "openaiKey": "sk-very-secret", "openaiModel": "gpt-4o" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&t.app, get("/api/settings", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.to_string().contains("sk-very-secret"));

    let providers = body["providers"].as_array().unwrap();
    let openai = providers.iter().find(|p| p["provider"] == "openai").unwrap();
    assert_eq!(openai["hasKey"], true);
    assert_eq!(openai["keySource"], "user");
    assert_eq!(openai["model"], "gpt-4o");
    let gemini = providers.iter().find(|p| p["provider"] == "gemini").unwrap();
    assert_eq!(gemini["hasKey"], false);
    assert_eq!(gemini["model"], "gemini-1.5-pro-latest");

    let (status, _, _) = send(
        &t.app,
        post_json("/api/settings", Some(&cookie), json!({ "openaiKey": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, _, body) = send(&t.app, get("/api/settings", Some(&cookie))).await;
    let openai = body["providers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["provider"] == "openai")
        .cloned()
        .unwrap();
    assert_eq!(openai["hasKey"], false);
    assert_eq!(openai["model"], "gpt-4o");
}

#[tokio::test]
async fn accounts_list_only_providers_with_keys() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);
    let cookie = sign_in(&t.app).await;

    let (_, _, body) = send(&t.app, get("/api/accounts", Some(&cookie))).await;
    assert_eq!(body["accounts"], json!([]));

    send(
        &t.app,
        post_json("/api/settings", Some(&cookie), json!({ "anthropicKey": "sk-ant" })),
    )
    .await;
    let (status, _, body) = send(&t.app, get("/api/accounts", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let accounts = body["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["id"], "anthropic-1");
    assert_eq!(accounts[0]["provider"], "anthropic");
    assert_eq!(accounts[0]["displayName"], "Anthropic");
}

#[tokio::test]
async fn prompt_rejects_missing_fields() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);
    let cookie = sign_in(&t.app).await;

    for body in [
        json!({}),
        json!({ "prompt": "hi" }),
        json!({ "prompt": "", "accountIds": ["openai-1"] }),
        json!({ "prompt": "hi", "accountIds": [] }),
    ] {
        let (status, _, response) =
            send(&t.app, post_json("/api/prompt", Some(&cookie), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "prompt and accountIds[] required");
    }
}

#[tokio::test]
async fn prompt_fans_out_and_isolates_failures() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(match_header("authorization", "Bearer sk-user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "four" } }]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let t = test_app(&upstream);
    let cookie = sign_in(&t.app).await;
    send(
        &t.app,
        post_json("/api/settings", Some(&cookie), json!({ "openaiKey": "sk-user" })),
    )
    .await;

    let (status, _, body) = send(
        &t.app,
        post_json(
            "/api/prompt",
            Some(&cookie),
            json!({ "prompt": "2+2?", "accountIds": ["openai-1", "gemini-1", "bogus-3"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "2+2?");

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["accountId"], "openai-1");
    assert_eq!(results[0]["ok"], true);
    assert_eq!(results[0]["text"], "four");
    assert_eq!(results[1]["ok"], false);
    assert_eq!(results[1]["error"], "Gemini key not set");
    assert_eq!(results[2]["ok"], false);
    assert_eq!(results[2]["error"], "Unknown account: bogus-3");

    let max = results
        .iter()
        .map(|r| r["elapsedMs"].as_u64().unwrap())
        .max()
        .unwrap();
    assert_eq!(body["totalMs"].as_u64().unwrap(), max);

    let (status, _, events) = send(&t.app, get("/api/events?limit=10", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 3);
    let succeeded = events.iter().filter(|e| e["code"] == "FAN-0200").count();
    let failed = events.iter().filter(|e| e["code"] == "FAN-0201").count();
    assert_eq!((succeeded, failed), (1, 2));
}

#[tokio::test]
async fn whitespace_prompt_is_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [{ "role": "user", "content": "   " }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "you sent nothing" } }]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let t = test_app(&upstream);
    let cookie = sign_in(&t.app).await;
    send(
        &t.app,
        post_json("/api/settings", Some(&cookie), json!({ "openaiKey": "sk-user" })),
    )
    .await;

    let (status, _, body) = send(
        &t.app,
        post_json(
            "/api/prompt",
            Some(&cookie),
            json!({ "prompt": "   ", "accountIds": ["openai-1"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "   ");
    assert_eq!(body["results"][0]["ok"], true);
    assert_eq!(body["results"][0]["text"], "you sent nothing");
}

#[tokio::test]
async fn malformed_event_limit_gets_the_error_envelope() {
    let upstream = MockServer::start().await;
    let t = test_app(&upstream);
    let cookie = sign_in(&t.app).await;

    let (status, _, body) = send(&t.app, get("/api/events?limit=abc", Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VAL-1001");
    assert_eq!(body["error"], "limit must be a positive integer");

    let (status, _, body) = send(&t.app, get("/api/events?limit=0", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}
