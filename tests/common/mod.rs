#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use hyper::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;

/// In-memory database shared by every request of a test. A single pooled
/// connection keeps the `:memory:` database alive for the pool's lifetime.
pub async fn test_app() -> (Router, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    (tieba_api::app_router(pool.clone()), pool)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers a user and returns `(token, user_id)`.
pub async fn register(app: &Router, username: &str) -> (String, i64) {
    let (status, body) = send(
        app,
        "POST",
        "/register/",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

/// Creates a tieba as `token` and approves it directly, since new tiebas
/// start in the pending state.
pub async fn setup_tieba(app: &Router, pool: &SqlitePool, token: &str, name: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/tiebas/create/",
        Some(token),
        Some(json!({ "name": name, "description": format!("all about {name}") })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "tieba creation failed: {body}");
    let tieba_id = body["tieba"]["id"].as_i64().unwrap();

    sqlx::query("UPDATE tiebas SET status = 1 WHERE id = ?")
        .bind(tieba_id)
        .execute(pool)
        .await
        .unwrap();

    tieba_id
}

pub async fn create_post(app: &Router, token: &str, tieba_id: i64, title: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/posts/create/",
        Some(token),
        Some(json!({ "title": title, "content": "some content", "tieba_id": tieba_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "post creation failed: {body}");
    body["post"]["id"].as_i64().unwrap()
}

pub async fn create_comment(app: &Router, token: &str, post_id: i64, content: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/comments/create/",
        Some(token),
        Some(json!({ "content": content, "post_id": post_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "comment creation failed: {body}");
    body["comment"]["id"].as_i64().unwrap()
}

pub async fn count_rows(pool: &SqlitePool, query: &str, id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>(query)
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}
