use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use authflow::{
    config::Config,
    error::AppError,
    repositories::InMemoryUserStore,
    routes::create_router,
    services::Notifier,
    state::AppState,
};

/// 送信内容を記録するだけの通知
#[derive(Clone, Default)]
struct Outbox {
    codes: Arc<Mutex<Vec<(String, String)>>>,
    reset_urls: Arc<Mutex<Vec<(String, String)>>>,
}

impl Outbox {
    fn last_code(&self, email: &str) -> Option<String> {
        self.codes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    fn last_reset_token(&self, email: &str) -> Option<String> {
        self.reset_urls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .and_then(|(_, url)| url.rsplit('/').next().map(str::to_string))
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), AppError> {
        self.codes
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string()));
        Ok(())
    }

    async fn send_welcome(&self, _to: &str, _name: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn send_password_reset_link(&self, to: &str, reset_url: &str) -> Result<(), AppError> {
        self.reset_urls
            .lock()
            .unwrap()
            .push((to.to_string(), reset_url.to_string()));
        Ok(())
    }

    async fn send_password_reset_success(&self, _to: &str) -> Result<(), AppError> {
        Ok(())
    }
}

fn test_config() -> Config {
    envy::from_iter([
        ("JWT_SECRET".to_string(), "integration-secret".to_string()),
        ("STORE".to_string(), "memory".to_string()),
        ("COOKIE_SECURE".to_string(), "false".to_string()),
        ("CLIENT_URL".to_string(), "http://localhost:5173".to_string()),
    ])
    .unwrap()
}

fn app() -> (Router, Outbox) {
    let outbox = Outbox::default();
    let state = AppState::new(
        test_config(),
        Arc::new(InMemoryUserStore::new()),
        Arc::new(outbox.clone()),
    );
    (create_router(state).unwrap(), outbox)
}

/// 送信タスクを走らせる
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Set-Cookie から `token=...` 部分を取り出す
fn session_cookie(headers: &HeaderMap) -> String {
    let set_cookie = headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn signup(app: &Router, email: &str, password: &str) -> (StatusCode, HeaderMap, Value) {
    send(
        app,
        post_json(
            "/api/v1/signup",
            json!({ "email": email, "password": password, "name": "A" }),
        ),
    )
    .await
}

#[tokio::test]
async fn health_reports_memory_store() {
    let (app, _) = app();
    let (status, _, body) = send(&app, get_with_cookie("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn signup_returns_201_with_cookie_and_safe_user() {
    let (app, _) = app();
    let (status, headers, body) = signup(&app, "a@x.com", "pw123").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["isVerified"], false);
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["user"].get("verificationToken").is_none());

    let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
}

#[tokio::test]
async fn signup_rejects_missing_fields_and_duplicates() {
    let (app, _) = app();

    let (status, _, body) = send(
        &app,
        post_json("/api/v1/signup", json!({ "email": "a@x.com", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    signup(&app, "a@x.com", "pw123").await;
    let (status, _, body) = signup(&app, "a@x.com", "pw123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn signup_rejects_malformed_email() {
    let (app, _) = app();
    let (status, headers, body) = signup(&app, "not-an-email", "pw123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (app, _) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn check_auth_requires_valid_session() {
    let (app, _) = app();
    let (_, headers, signup_body) = signup(&app, "a@x.com", "pw123").await;
    let cookie = session_cookie(&headers);

    let (status, _, body) = send(&app, get_with_cookie("/api/v1/check-auth", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], signup_body["user"]["id"]);

    let (status, _, body) = send(&app, get_with_cookie("/api/v1/check-auth", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let tampered = format!("{}x", cookie);
    let (status, _, _) = send(&app, get_with_cookie("/api/v1/check-auth", Some(&tampered))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = Request::builder()
        .method("GET")
        .uri("/api/v1/check-auth")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", cookie.trim_start_matches("token=")),
        )
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, bearer).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn verify_email_is_single_use() {
    let (app, outbox) = app();
    signup(&app, "a@x.com", "pw123").await;
    settle().await;
    let code = outbox.last_code("a@x.com").unwrap();
    let wrong = if code == "100000" { "100001" } else { "100000" };

    let (status, _, _) = send(&app, post_json("/api/v1/verify-email", json!({ "code": wrong }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(&app, post_json("/api/v1/verify-email", json!({ "code": code }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["isVerified"], true);

    let (status, _, body) = send(&app, post_json("/api/v1/verify-email", json!({ "code": code }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn login_and_logout() {
    let (app, _) = app();
    signup(&app, "a@x.com", "pw123").await;

    let (status, _, wrong_password) = send(
        &app,
        post_json("/api/v1/login", json!({ "email": "a@x.com", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, unknown) = send(
        &app,
        post_json("/api/v1/login", json!({ "email": "b@x.com", "password": "pw123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_password["message"], unknown["message"]);

    let (status, headers, body) = send(
        &app,
        post_json("/api/v1/login", json!({ "email": "a@x.com", "password": "pw123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"]["lastLogin"].is_string());
    assert!(session_cookie(&headers).starts_with("token="));

    let logout = Request::builder()
        .method("POST")
        .uri("/api/v1/logout")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, logout).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let cleared = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.starts_with("token=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn password_reset_flow() {
    let (app, outbox) = app();
    signup(&app, "a@x.com", "pw123").await;

    let (status, _, unknown) = send(
        &app,
        post_json("/api/v1/forgot-password", json!({ "email": "nobody@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, known) = send(
        &app,
        post_json("/api/v1/forgot-password", json!({ "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unknown["message"], known["message"]);

    let token = outbox.last_reset_token("a@x.com").unwrap();
    let uri = format!("/api/v1/reset-password/{}", token);

    let (status, _, _) = send(
        &app,
        post_json(&uri, json!({ "password": "new1", "confirmPassword": "new2" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(
        &app,
        post_json(&uri, json!({ "password": "new", "confirmPassword": "new" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _, _) = send(
        &app,
        post_json(&uri, json!({ "password": "newer", "confirmPassword": "newer" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        post_json("/api/v1/login", json!({ "email": "a@x.com", "password": "pw123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, _) = send(
        &app,
        post_json("/api/v1/login", json!({ "email": "a@x.com", "password": "new" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn resend_verification_issues_new_code() {
    let (app, outbox) = app();
    signup(&app, "a@x.com", "pw123").await;

    let (status, _, _) = send(
        &app,
        post_json("/api/v1/resend-verification", json!({ "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    settle().await;

    let code = outbox.last_code("a@x.com").unwrap();
    let (status, _, body) = send(&app, post_json("/api/v1/verify-email", json!({ "code": code }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["isVerified"], true);
}
