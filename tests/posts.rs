mod common;

use hyper::StatusCode;
use serde_json::json;

use common::{count_rows, create_post, register, send, setup_tieba, test_app};

#[tokio::test]
async fn posting_requires_membership() {
    let (app, pool) = test_app().await;
    let (owner_token, _) = register(&app, "li_ming").await;
    let (outsider_token, _) = register(&app, "wang_wu").await;
    let tieba_id = setup_tieba(&app, &pool, &owner_token, "rustaceans").await;

    let new_post = json!({ "title": "hello", "content": "first post", "tieba_id": tieba_id });

    let (status, _) = send(
        &app,
        "POST",
        "/posts/create/",
        Some(&outsider_token),
        Some(new_post.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // After joining, the same request succeeds and the counters move.
    send(
        &app,
        "POST",
        &format!("/tiebas/{tieba_id}/join/"),
        Some(&outsider_token),
        None,
    )
    .await;
    let (status, body) = send(
        &app,
        "POST",
        "/posts/create/",
        Some(&outsider_token),
        Some(new_post),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["post"]["tieba_name"].as_str(), Some("rustaceans"));

    assert_eq!(
        count_rows(&pool, "SELECT post_count FROM tiebas WHERE id = ?", tieba_id).await,
        1
    );
    assert_eq!(
        count_rows(&pool, "SELECT today_post_count FROM tiebas WHERE id = ?", tieba_id).await,
        1
    );
    let author_id = body["post"]["author_id"].as_i64().unwrap();
    assert_eq!(
        count_rows(&pool, "SELECT post_count FROM users WHERE id = ?", author_id).await,
        1
    );
}

#[tokio::test]
async fn posting_to_unknown_tieba_is_404() {
    let (app, _pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;

    let (status, _) = send(
        &app,
        "POST",
        "/posts/create/",
        Some(&token),
        Some(json!({ "title": "hello", "content": "text", "tieba_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_list_filters_and_paginates() {
    let (app, pool) = test_app().await;
    let (token, author) = register(&app, "li_ming").await;
    let tieba_a = setup_tieba(&app, &pool, &token, "rustaceans").await;
    let tieba_b = setup_tieba(&app, &pool, &token, "gophers").await;
    create_post(&app, &token, tieba_a, "borrow checker tips").await;
    create_post(&app, &token, tieba_b, "goroutine tips").await;

    let (status, body) = send(&app, "GET", "/posts/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = send(&app, "GET", &format!("/posts/?tieba={tieba_a}"), None, None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", "/posts/?q=borrow", None, None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", &format!("/posts/?author={author}&page=1"), None, None).await;
    assert_eq!(body["count"].as_i64(), Some(2));
    assert_eq!(body["page"].as_i64(), Some(1));
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn detail_counts_views_and_records_history_once() {
    let (app, pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;
    let tieba_id = setup_tieba(&app, &pool, &token, "rustaceans").await;
    let post_id = create_post(&app, &token, tieba_id, "hello").await;

    let (status, body) =
        send(&app, "GET", &format!("/posts/{post_id}/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["view_count"].as_i64(), Some(1));

    let (_, body) = send(&app, "GET", &format!("/posts/{post_id}/"), Some(&token), None).await;
    assert_eq!(body["view_count"].as_i64(), Some(2));

    // A repeat visit must not duplicate the history row.
    let history = count_rows(
        &pool,
        "SELECT COUNT(*) FROM post_view_history WHERE post_id = ?",
        post_id,
    )
    .await;
    assert_eq!(history, 1);

    let (status, body) = send(&app, "GET", "/user/history/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["post_id"].as_i64(), Some(post_id));
}

#[tokio::test]
async fn anonymous_views_count_but_leave_no_history() {
    let (app, pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;
    let tieba_id = setup_tieba(&app, &pool, &token, "rustaceans").await;
    let post_id = create_post(&app, &token, tieba_id, "hello").await;

    let (_, body) = send(&app, "GET", &format!("/posts/{post_id}/"), None, None).await;
    assert_eq!(body["view_count"].as_i64(), Some(1));

    let history = count_rows(
        &pool,
        "SELECT COUNT(*) FROM post_view_history WHERE post_id = ?",
        post_id,
    )
    .await;
    assert_eq!(history, 0);
}

#[tokio::test]
async fn only_the_author_can_update_or_delete() {
    let (app, pool) = test_app().await;
    let (author_token, _) = register(&app, "li_ming").await;
    let (other_token, _) = register(&app, "wang_wu").await;
    let tieba_id = setup_tieba(&app, &pool, &author_token, "rustaceans").await;
    let post_id = create_post(&app, &author_token, tieba_id, "hello").await;

    // Someone else's post reads as absent, not forbidden.
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/posts/{post_id}/update/"),
        Some(&other_token),
        Some(json!({ "title": "hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/posts/{post_id}/delete/"),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/posts/{post_id}/update/"),
        Some(&author_token),
        Some(json!({ "content": "edited content" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["content"].as_str(), Some("edited content"));
    assert_eq!(body["post"]["title"].as_str(), Some("hello"));
}

#[tokio::test]
async fn update_persists_with_its_activity_row() {
    let (app, pool) = test_app().await;
    let (token, user_id) = register(&app, "li_ming").await;
    let tieba_id = setup_tieba(&app, &pool, &token, "rustaceans").await;
    let post_id = create_post(&app, &token, tieba_id, "hello").await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/posts/{post_id}/update/"),
        Some(&token),
        Some(json!({ "title": "hello again" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The edit and its log entry land together.
    let title = sqlx::query_scalar::<_, String>("SELECT title FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "hello again");
    let logged = count_rows(
        &pool,
        "SELECT COUNT(*) FROM user_activities WHERE action = 'post_update' AND user_id = ?",
        user_id,
    )
    .await;
    assert_eq!(logged, 1);
}

#[tokio::test]
async fn delete_is_soft_and_decrements_the_tieba() {
    let (app, pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;
    let tieba_id = setup_tieba(&app, &pool, &token, "rustaceans").await;
    let post_id = create_post(&app, &token, tieba_id, "hello").await;

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/posts/{post_id}/delete/"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The row survives with the deleted status; lists and detail hide it.
    let status_code = count_rows(&pool, "SELECT status FROM posts WHERE id = ?", post_id).await;
    assert_eq!(status_code, 3);
    let (status, _) = send(&app, "GET", &format!("/posts/{post_id}/"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(&app, "GET", "/posts/", None, None).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
    assert_eq!(
        count_rows(&pool, "SELECT post_count FROM tiebas WHERE id = ?", tieba_id).await,
        0
    );

    // Double delete must not decrement twice.
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/posts/{post_id}/delete/"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        count_rows(&pool, "SELECT post_count FROM tiebas WHERE id = ?", tieba_id).await,
        0
    );
}

#[tokio::test]
async fn like_toggle_round_trip() {
    let (app, pool) = test_app().await;
    let (token, user_id) = register(&app, "li_ming").await;
    let tieba_id = setup_tieba(&app, &pool, &token, "rustaceans").await;
    let post_id = create_post(&app, &token, tieba_id, "hello").await;

    let (status, body) =
        send(&app, "POST", &format!("/posts/{post_id}/like/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_liked"].as_bool(), Some(true));
    assert_eq!(body["like_count"].as_i64(), Some(1));

    let (status, body) =
        send(&app, "POST", &format!("/posts/{post_id}/like/"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_liked"].as_bool(), Some(false));
    assert_eq!(body["like_count"].as_i64(), Some(0));

    // Only the activation leaves an activity trace.
    let likes_logged = count_rows(
        &pool,
        "SELECT COUNT(*) FROM user_activities WHERE action = 'post_like' AND user_id = ?",
        user_id,
    )
    .await;
    assert_eq!(likes_logged, 1);
}

#[tokio::test]
async fn collect_toggle_round_trip() {
    let (app, pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;
    let tieba_id = setup_tieba(&app, &pool, &token, "rustaceans").await;
    let post_id = create_post(&app, &token, tieba_id, "hello").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/posts/{post_id}/collect/"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_collected"].as_bool(), Some(true));
    assert_eq!(body["collect_count"].as_i64(), Some(1));

    let (status, body) = send(
        &app,
        "POST",
        &format!("/posts/{post_id}/collect/"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_collected"].as_bool(), Some(false));
    assert_eq!(body["collect_count"].as_i64(), Some(0));
}

#[tokio::test]
async fn reports_are_append_once_per_reporter() {
    let (app, pool) = test_app().await;
    let (author_token, _) = register(&app, "li_ming").await;
    let (reporter_token, _) = register(&app, "wang_wu").await;
    let tieba_id = setup_tieba(&app, &pool, &author_token, "rustaceans").await;
    let post_id = create_post(&app, &author_token, tieba_id, "hello").await;

    let report = json!({ "reason": "spam", "description": "ad content" });

    let (status, body) = send(
        &app,
        "POST",
        &format!("/posts/{post_id}/report/"),
        Some(&reporter_token),
        Some(report.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["report"]["reason"].as_str(), Some("spam"));

    // Same reporter again: refused.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/posts/{post_id}/report/"),
        Some(&reporter_token),
        Some(report.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A different reporter still gets through.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/posts/{post_id}/report/"),
        Some(&author_token),
        Some(report),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/posts/{post_id}/report/"),
        Some(&reporter_token),
        Some(json!({ "reason": "not-a-reason" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_images_are_stored_in_order() {
    let (app, pool) = test_app().await;
    let (token, _) = register(&app, "li_ming").await;
    let tieba_id = setup_tieba(&app, &pool, &token, "rustaceans").await;

    let (status, body) = send(
        &app,
        "POST",
        "/posts/create/",
        Some(&token),
        Some(json!({
            "title": "screenshots",
            "content": "see below",
            "tieba_id": tieba_id,
            "images": ["https://img.example.com/a.png", "https://img.example.com/b.png"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let images = body["post"]["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].as_str(), Some("https://img.example.com/a.png"));
}
