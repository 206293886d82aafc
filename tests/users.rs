mod common;

use hyper::StatusCode;
use serde_json::json;

use common::{register, send, test_app};

#[tokio::test]
async fn register_then_login() {
    let (app, _pool) = test_app().await;

    let (token, user_id) = register(&app, "li_ming").await;
    assert!(!token.is_empty());

    let (status, body) = send(
        &app,
        "POST",
        "/login/",
        None,
        Some(json!({ "username": "li_ming", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"].as_i64(), Some(user_id));
    assert_eq!(body["token"].as_str(), Some(token.as_str()));
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let (app, _pool) = test_app().await;
    register(&app, "li_ming").await;

    // Duplicate username.
    let (status, _) = send(
        &app,
        "POST",
        "/register/",
        None,
        Some(json!({
            "username": "li_ming",
            "email": "other@example.com",
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Invalid email.
    let (status, _) = send(
        &app,
        "POST",
        "/register/",
        None,
        Some(json!({
            "username": "wang_wu",
            "email": "not-an-email",
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Username starting with a digit.
    let (status, _) = send(
        &app,
        "POST",
        "/register/",
        None,
        Some(json!({
            "username": "1zhang",
            "email": "zhang@example.com",
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let (app, _pool) = test_app().await;
    register(&app, "li_ming").await;

    let (status, _) = send(
        &app,
        "POST",
        "/login/",
        None,
        Some(json!({ "username": "li_ming", "password": "wrong_password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_requires_auth() {
    let (app, _pool) = test_app().await;

    let (status, _) = send(&app, "GET", "/profile/", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (token, _) = register(&app, "li_ming").await;
    let (status, body) = send(&app, "GET", "/profile/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"].as_str(), Some("li_ming"));
}

#[tokio::test]
async fn profile_partial_update() {
    let (app, _pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;

    let (status, body) = send(
        &app,
        "PUT",
        "/profile/",
        Some(&token),
        Some(json!({ "nickname": "Ming", "bio": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["nickname"].as_str(), Some("Ming"));
    assert_eq!(body["user"]["bio"].as_str(), Some("hello"));
    // Untouched fields survive.
    assert_eq!(body["user"]["email"].as_str(), Some("li_ming@example.com"));
}

#[tokio::test]
async fn change_password_flow() {
    let (app, _pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;

    let (status, _) = send(
        &app,
        "POST",
        "/profile/change-password/",
        Some(&token),
        Some(json!({ "old_password": "wrong", "new_password": "evenmoresecret" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/profile/change-password/",
        Some(&token),
        Some(json!({ "old_password": "secret123", "new_password": "evenmoresecret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        "/login/",
        None,
        Some(json!({ "username": "li_ming", "password": "evenmoresecret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn follow_and_unfollow_adjust_counters() {
    let (app, _pool) = test_app().await;
    let (token, me) = register(&app, "li_ming").await;
    let (_, them) = register(&app, "wang_wu").await;

    // Self-follow is refused.
    let (status, _) = send(&app, "POST", &format!("/users/{me}/follow/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        send(&app, "POST", &format!("/users/{them}/follow/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, target) = send(&app, "GET", &format!("/users/{them}/"), None, None).await;
    assert_eq!(target["follower_count"].as_i64(), Some(1));
    let (_, actor) = send(&app, "GET", &format!("/users/{me}/"), None, None).await;
    assert_eq!(actor["following_count"].as_i64(), Some(1));

    // Double follow is refused.
    let (status, _) =
        send(&app, "POST", &format!("/users/{them}/follow/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        send(&app, "POST", &format!("/users/{them}/unfollow/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, target) = send(&app, "GET", &format!("/users/{them}/"), None, None).await;
    assert_eq!(target["follower_count"].as_i64(), Some(0));
    let (_, actor) = send(&app, "GET", &format!("/users/{me}/"), None, None).await;
    assert_eq!(actor["following_count"].as_i64(), Some(0));

    // Unfollow without an edge is refused.
    let (status, _) =
        send(&app, "POST", &format!("/users/{them}/unfollow/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn follow_unknown_user_is_404() {
    let (app, _pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;

    let (status, _) = send(&app, "POST", "/users/999/follow/", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn follower_lists_show_both_sides() {
    let (app, _pool) = test_app().await;
    let (token_a, a) = register(&app, "li_ming").await;
    let (_, b) = register(&app, "wang_wu").await;

    send(&app, "POST", &format!("/users/{b}/follow/"), Some(&token_a), None).await;

    let (status, body) = send(&app, "GET", &format!("/users/{b}/followers/"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let followers = body.as_array().unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0]["user_id"].as_i64(), Some(a));

    let (status, body) = send(&app, "GET", &format!("/users/{a}/following/"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let following = body.as_array().unwrap();
    assert_eq!(following.len(), 1);
    assert_eq!(following[0]["user_id"].as_i64(), Some(b));
}

#[tokio::test]
async fn user_search() {
    let (app, _pool) = test_app().await;
    register(&app, "li_ming").await;
    register(&app, "wang_wu").await;

    let (status, _) = send(&app, "GET", "/users/search/", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/users/search/?q=ming", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["username"].as_str(), Some("li_ming"));
}

#[tokio::test]
async fn racing_duplicate_insert_maps_to_validation() {
    use tieba_api::utils::app_error::AppError;

    let (app, pool) = test_app().await;
    let (token, me) = register(&app, "li_ming").await;
    let (_, them) = register(&app, "wang_wu").await;
    send(&app, "POST", &format!("/users/{them}/follow/"), Some(&token), None).await;

    // A concurrent duplicate gets past the existence check and lands on the
    // UNIQUE constraint; that error must read as a 400, not a 500.
    let err = sqlx::query(
        "INSERT INTO user_follows (follower_id, following_id, created_at) \
         VALUES (?, ?, datetime('now'))",
    )
    .bind(me)
    .bind(them)
    .execute(&pool)
    .await
    .unwrap_err();
    assert!(matches!(AppError::from(err), AppError::Validation(_)));
}

#[tokio::test]
async fn activity_log_records_actions() {
    let (app, _pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;
    let (_, them) = register(&app, "wang_wu").await;

    send(&app, "POST", &format!("/users/{them}/follow/"), Some(&token), None).await;

    let (status, body) = send(&app, "GET", "/profile/activities/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"register"));
    assert!(actions.contains(&"follow"));
}
