//! API integration tests against an in-memory database

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use shelfmark_server::{
    api,
    clock::ManualClock,
    config::{AppConfig, BootstrapConfig, DatabaseConfig},
    repository::{self, Repository},
    services::Services,
    AppState,
};

const ADMIN_EMAIL: &str = "admin@example.org";
const ADMIN_PASSWORD: &str = "admin-password";

fn decimal(value: &Value) -> Decimal {
    value.as_str().expect("decimal as string").parse().unwrap()
}

struct TestApp {
    router: Router,
    clock: ManualClock,
}

async fn spawn_app() -> TestApp {
    let config = AppConfig {
        database: DatabaseConfig::in_memory(),
        bootstrap: BootstrapConfig {
            admin_email: Some(ADMIN_EMAIL.to_string()),
            admin_password: Some(ADMIN_PASSWORD.to_string()),
            admin_name: None,
        },
        ..Default::default()
    };

    let pool = repository::connect(&config.database)
        .await
        .expect("Failed to open database");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap());
    let services = Services::new(
        Repository::new(pool),
        config.auth.clone(),
        Arc::new(clock.clone()),
    );
    services
        .users
        .ensure_bootstrap_admin(&config.bootstrap)
        .await
        .expect("Failed to create admin");

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    TestApp {
        router: api::router(state),
        clock,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Send a body verbatim, with an optional content type
    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri))
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().expect("No token in response").to_string()
    }

    async fn register(&self, name: &str, email: &str) -> (i64, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "reader-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let id = body["user"]["id"].as_i64().unwrap();
        (id, self.login(email, "reader-pass").await)
    }

    async fn create_book(&self, token: &str, title: &str) -> i64 {
        let (status, body) = self
            .send(
                Method::POST,
                "/books",
                Some(token),
                Some(json!({ "title": title, "author": "Anon", "category": "Fiction" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create book failed: {}", body);
        assert_eq!(body["status"], "success");
        body["book"]["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_and_login() {
    let app = spawn_app().await;
    let (id, token) = app.register("Ada Reader", "ada@example.org").await;

    let (status, body) = app.send(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["account_type"], "member");
    assert!(body.get("password_hash").is_none());

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Again", "email": "ADA@example.org", "password": "whatever" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.org", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Short", "email": "short@example.org", "password": "123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_catalog_permissions() {
    let app = spawn_app().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, reader) = app.register("Ada Reader", "ada@example.org").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/books",
            Some(&reader),
            Some(json!({ "title": "Dune", "author": "Frank Herbert" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::POST, "/books", None, Some(json!({ "title": "Dune", "author": "F" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let book = app.create_book(&admin, "Dune").await;

    let (status, body) = app.send(Method::GET, "/books?freesearch=dune", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["status"], "available");

    let (status, body) = app.send(Method::GET, "/categories", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Fiction");

    let (status, body) = app
        .send(Method::GET, &format!("/books/{}", book + 100), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not-found");
}

#[tokio::test]
async fn test_borrow_reserve_return_flow() {
    let app = spawn_app().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (holder_id, holder) = app.register("Holder", "holder@example.org").await;
    let (waiting_id, waiting) = app.register("Waiting", "waiting@example.org").await;
    let book = app.create_book(&admin, "Dune").await;

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/borrow", book), Some(&holder), None)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Borrowed");
    assert_eq!(body["borrowing"]["user_id"], holder_id);

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/borrow", book), Some(&waiting), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "not-available");
    assert_eq!(body["message"], "Book not available");

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/reserve", book), Some(&waiting), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Reserved");

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/reserve", book), Some(&waiting), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already-reserved");

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/renew", book), Some(&holder), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "reservation-pending");

    let (status, body) = app
        .send(Method::GET, &format!("/books/{}/reservations", book), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/return", book), Some(&holder), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "Returned");
    assert_eq!(decimal(&body["fine"]), Decimal::ZERO);
    assert_eq!(body["fulfilled_reservation"]["user_id"], waiting_id);

    let (status, body) = app
        .send(Method::GET, "/notifications", Some(&waiting), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let notifications = body.as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0]["message"].as_str().unwrap().contains("Dune"));

    let (status, body) = app
        .send(Method::GET, &format!("/books/{}", book), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");
    assert!(body["issued_to"].is_null());

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/return", book), Some(&holder), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "no-active-borrowing");
}

#[tokio::test]
async fn test_overdue_return_charges_fine() {
    let app = spawn_app().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (user_id, reader) = app.register("Ada Reader", "ada@example.org").await;
    let book = app.create_book(&admin, "Emma").await;

    let (status, _) = app
        .send(Method::POST, &format!("/books/{}/borrow", book), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Due after 14 days, returned after 20
    app.clock.advance(Duration::days(20));

    let (status, body) = app
        .send(Method::GET, &format!("/users/{}/borrowings?active=true", user_id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["is_overdue"], true);
    assert_eq!(decimal(&body[0]["fine"]), Decimal::new(3, 0));

    let (status, body) = app.send(Method::GET, "/notifications", Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/return", book), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["fine"]), Decimal::new(3, 0));

    let (status, body) = app.send(Method::GET, "/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["fines_collected"]), Decimal::new(3, 0));
    assert_eq!(body["most_borrowed"][0]["book_id"], book);

    let (status, _) = app.send(Method::GET, "/stats", Some(&reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_staff_act_for_members_and_members_do_not() {
    let app = spawn_app().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (ada_id, ada) = app.register("Ada", "ada@example.org").await;
    let (bob_id, bob) = app.register("Bob", "bob@example.org").await;
    let book = app.create_book(&admin, "Ulysses").await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/books/{}/borrow", book),
            Some(&bob),
            Some(json!({ "user_id": ada_id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/books/{}/borrow", book),
            Some(&admin),
            Some(json!({ "user_id": ada_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["borrowing"]["user_id"], ada_id);

    let (status, _) = app
        .send(Method::GET, &format!("/users/{}/borrowings", ada_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/reserve", book), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let reservation = body["reservation"]["id"].as_i64().unwrap();

    let (status, _) = app
        .send(Method::DELETE, &format!("/reservations/{}", reservation), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(Method::GET, &format!("/users/{}/reservations", bob_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["queue_position"], 1);

    let (status, body) = app
        .send(Method::DELETE, &format!("/reservations/{}", reservation), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, _) = app
        .send(Method::POST, &format!("/books/{}/renew", book), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_settings_drive_borrow_limits() {
    let app = spawn_app().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, reader) = app.register("Ada", "ada@example.org").await;

    let (status, mut settings) = app.send(Method::GET, "/settings", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["borrow_limits"]["member"], 3);

    settings["borrow_limits"]["member"] = json!(1);
    let (status, _) = app
        .send(Method::PUT, "/settings", Some(&admin), Some(settings.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(Method::PUT, "/settings", Some(&reader), Some(settings.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut oversized = settings.clone();
    oversized["borrow_duration_days"]["member"] = json!(u32::MAX);
    let (status, _) = app
        .send(Method::PUT, "/settings", Some(&admin), Some(oversized))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    settings["fine_per_day"] = json!("-1");
    let (status, _) = app
        .send(Method::PUT, "/settings", Some(&admin), Some(settings))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let first = app.create_book(&admin, "First").await;
    let second = app.create_book(&admin, "Second").await;
    let (status, _) = app
        .send(Method::POST, &format!("/books/{}/borrow", first), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app
        .send(Method::POST, &format!("/books/{}/borrow", second), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "limit-reached");
    assert_eq!(body["message"], "Borrow limit reached");
}

#[tokio::test]
async fn test_unreadable_circulation_body_is_rejected() {
    let app = spawn_app().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (ada_id, _) = app.register("Ada", "ada@example.org").await;
    let book = app.create_book(&admin, "Ulysses").await;
    let uri = format!("/books/{}/borrow", book);

    let (status, body) = app
        .send_raw(
            Method::POST,
            &uri,
            &admin,
            Some("application/json"),
            &format!("{{\"user_id\": {}", ada_id),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad-value");

    let (status, _) = app
        .send_raw(
            Method::POST,
            &uri,
            &admin,
            Some("text/plain"),
            &json!({ "user_id": ada_id }).to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was issued to anyone
    let (status, body) = app.send(Method::GET, &format!("/books/{}", book), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");

    let (status, body) = app
        .send(Method::POST, &uri, Some(&admin), Some(json!({ "user_id": ada_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["borrowing"]["user_id"], ada_id);
}
