use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use hyper::StatusCode;
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;

use crate::extractors::auth_extractor::AuthUser;
use crate::structs::pagination::{page_response, PageParams, PageQuery, DEFAULT_PAGE_SIZE};
use crate::structs::post::{
    NewPost, NewReport, PostDetail, PostListQuery, UpdatePost, ViewHistoryEntry,
};
use crate::structs::status::{PostStatus, TiebaStatus, POST_TYPES};
use crate::utils::activity::record_activity;
use crate::utils::app_error::AppError;
use crate::utils::validation::{check_new_post_data, check_report_reason};
use crate::AppState;

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.author_id, \
     u.username AS author_username, u.nickname AS author_nickname, p.tieba_id, \
     t.name AS tieba_name, p.post_type, p.status, p.view_count, p.comment_count, \
     p.like_count, p.collect_count, p.share_count, p.is_top, p.is_essence, p.created_at, \
     p.updated_at, p.published_at, p.last_reply_at";

const POST_JOINS: &str = "FROM posts p JOIN users u ON u.id = p.author_id \
     JOIN tiebas t ON t.id = p.tieba_id";

pub(crate) async fn fetch_post_detail(
    pool: &sqlx::SqlitePool,
    post_id: i64,
) -> Result<PostDetail, AppError> {
    let post = sqlx::query_as::<_, PostDetail>(&format!(
        "SELECT {POST_COLUMNS} {POST_JOINS} WHERE p.id = ?"
    ))
    .bind(post_id)
    .fetch_optional(pool)
    .await?;

    let Some(mut post) = post else {
        return Err(AppError::NotFound("post not found"));
    };
    post.images =
        sqlx::query_scalar::<_, String>(
            "SELECT url FROM post_images WHERE post_id = ? ORDER BY sort_order, id",
        )
        .bind(post_id)
        .fetch_all(pool)
        .await?;

    Ok(post)
}

pub async fn list_posts_route(
    State(app_state): State<Arc<AppState>>,
    Query(list_query): Query<PostListQuery>,
) -> Result<Response, AppError> {
    let params = PageParams::new(
        &PageQuery {
            page: list_query.page,
            page_size: list_query.page_size,
        },
        DEFAULT_PAGE_SIZE,
    );
    let sort = list_query.sort.as_deref().unwrap_or("latest");

    let push_filters = |builder: &mut QueryBuilder<Sqlite>| {
        builder.push(" WHERE p.status = ");
        builder.push_bind(PostStatus::Published.code());
        if let Some(tieba) = list_query.tieba {
            builder.push(" AND p.tieba_id = ");
            builder.push_bind(tieba);
        }
        if let Some(author) = list_query.author {
            builder.push(" AND p.author_id = ");
            builder.push_bind(author);
        }
        if let Some(q) = list_query.q.as_deref().filter(|q| !q.trim().is_empty()) {
            let pattern = format!("%{}%", q.trim());
            builder.push(" AND (p.title LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR p.content LIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if sort == "essence" {
            builder.push(" AND p.is_essence = 1");
        }
    };

    let mut builder =
        QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} {POST_JOINS}"));
    push_filters(&mut builder);
    match sort {
        "hot" => builder.push(" ORDER BY p.view_count DESC, p.like_count DESC, p.created_at DESC"),
        _ => builder.push(" ORDER BY p.created_at DESC, p.id DESC"),
    };
    builder.push(" LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let posts = builder
        .build_query_as::<PostDetail>()
        .fetch_all(&app_state.pool)
        .await?;

    let mut count_builder = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) {POST_JOINS}"));
    push_filters(&mut count_builder);
    let count = count_builder
        .build_query_scalar::<i64>()
        .fetch_one(&app_state.pool)
        .await?;

    Ok(page_response(&params, count, posts))
}

pub async fn create_post_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(new_post): Json<NewPost>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_user = auth_user.required()?;

    let title = new_post.title.trim();
    let content = new_post.content.trim();
    check_new_post_data(auth_user.id, title, content)?;

    let post_type = new_post.post_type.as_deref().unwrap_or("normal");
    if !POST_TYPES.contains(&post_type) {
        return Err(AppError::validation("unknown post type"));
    }

    let mut tx = app_state.pool.begin().await?;

    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ? AND status = ?")
        .bind(new_post.tieba_id)
        .bind(TiebaStatus::Normal.code())
        .fetch_optional(&mut *tx)
        .await?;
    let Some(tieba_id) = tieba else {
        return Err(AppError::NotFound("tieba not found"));
    };

    let membership = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM tieba_members WHERE tieba_id = ? AND user_id = ?",
    )
    .bind(tieba_id)
    .bind(auth_user.id)
    .fetch_optional(&mut *tx)
    .await?;
    if membership.is_none() {
        warn!(
            "User {} tried to post in tieba {tieba_id} without membership",
            auth_user.id
        );
        return Err(AppError::Forbidden("join the tieba before posting"));
    }

    let now = Utc::now();
    let post_id = sqlx::query(
        "INSERT INTO posts (title, content, author_id, tieba_id, post_type, status, \
         created_at, updated_at, published_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(title)
    .bind(content)
    .bind(auth_user.id)
    .bind(tieba_id)
    .bind(post_type)
    .bind(PostStatus::Published.code())
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    if let Some(images) = &new_post.images {
        for (sort_order, url) in images.iter().enumerate() {
            sqlx::query(
                "INSERT INTO post_images (post_id, url, sort_order, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(post_id)
            .bind(url)
            .bind(sort_order as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }

    sqlx::query(
        "UPDATE tiebas SET post_count = post_count + 1, today_post_count = today_post_count + 1, \
         last_activity_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(tieba_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE users SET post_count = post_count + 1 WHERE id = ?")
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE tieba_members SET post_count = post_count + 1 WHERE tieba_id = ? AND user_id = ?",
    )
    .bind(tieba_id)
    .bind(auth_user.id)
    .execute(&mut *tx)
    .await?;
    record_activity(&mut *tx, auth_user.id, "post_create", Some("post"), Some(post_id)).await?;
    tx.commit().await?;

    let post = fetch_post_detail(&app_state.pool, post_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "post created", "post": post })),
    ))
}

pub async fn post_detail_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<PostDetail>, AppError> {
    let mut tx = app_state.pool.begin().await?;

    let published = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM posts WHERE id = ? AND status = ?",
    )
    .bind(post_id)
    .bind(PostStatus::Published.code())
    .fetch_optional(&mut *tx)
    .await?;
    if published.is_none() {
        return Err(AppError::NotFound("post not found"));
    }

    // At most one history row per (post, user); the view counter below moves
    // on every fetch regardless.
    if let Some(auth_user) = &auth_user.0 {
        sqlx::query(
            "INSERT OR IGNORE INTO post_view_history (post_id, user_id, viewed_at) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(auth_user.id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let post = fetch_post_detail(&app_state.pool, post_id).await?;

    Ok(Json(post))
}

pub async fn update_post_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<i64>,
    Json(update): Json<UpdatePost>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    check_new_post_data(
        auth_user.id,
        update.title.as_deref().map_or("unchanged", str::trim),
        update.content.as_deref().map_or("unchanged", str::trim),
    )?;

    let mut tx = app_state.pool.begin().await?;

    let owned = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM posts WHERE id = ? AND author_id = ? AND status != ?",
    )
    .bind(post_id)
    .bind(auth_user.id)
    .bind(PostStatus::Deleted.code())
    .fetch_optional(&mut *tx)
    .await?;
    if owned.is_none() {
        return Err(AppError::NotFound("post not found"));
    }

    sqlx::query(
        "UPDATE posts SET title = COALESCE(?, title), content = COALESCE(?, content), \
         updated_at = ? WHERE id = ?",
    )
    .bind(update.title.as_deref().map(str::trim))
    .bind(update.content.as_deref().map(str::trim))
    .bind(Utc::now())
    .bind(post_id)
    .execute(&mut *tx)
    .await?;

    record_activity(&mut *tx, auth_user.id, "post_update", Some("post"), Some(post_id)).await?;
    tx.commit().await?;

    let post = fetch_post_detail(&app_state.pool, post_id).await?;

    Ok(Json(json!({ "message": "post updated", "post": post })))
}

pub async fn delete_post_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let post = sqlx::query_as::<_, (i64, i64)>(
        "SELECT id, tieba_id FROM posts WHERE id = ? AND author_id = ? AND status != ?",
    )
    .bind(post_id)
    .bind(auth_user.id)
    .bind(PostStatus::Deleted.code())
    .fetch_optional(&mut *tx)
    .await?;
    let Some((post_id, tieba_id)) = post else {
        return Err(AppError::NotFound("post not found"));
    };

    // Soft delete: only the status flips. Comments, likes and reports below
    // the post remain queryable; lists filter them out by status.
    sqlx::query("UPDATE posts SET status = ?, updated_at = ? WHERE id = ?")
        .bind(PostStatus::Deleted.code())
        .bind(Utc::now())
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE tiebas SET post_count = post_count - 1 WHERE id = ?")
        .bind(tieba_id)
        .execute(&mut *tx)
        .await?;
    record_activity(&mut *tx, auth_user.id, "post_delete", Some("post"), Some(post_id)).await?;
    tx.commit().await?;

    Ok(Json(json!({ "message": "post deleted" })))
}

pub async fn like_post_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let published = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM posts WHERE id = ? AND status = ?",
    )
    .bind(post_id)
    .bind(PostStatus::Published.code())
    .fetch_optional(&mut *tx)
    .await?;
    if published.is_none() {
        return Err(AppError::NotFound("post not found"));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM post_likes WHERE post_id = ? AND user_id = ?",
    )
    .bind(post_id)
    .bind(auth_user.id)
    .fetch_optional(&mut *tx)
    .await?;

    let (message, is_liked) = match existing {
        None => {
            sqlx::query("INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(auth_user.id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE posts SET like_count = like_count + 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
            record_activity(&mut *tx, auth_user.id, "post_like", Some("post"), Some(post_id))
                .await?;
            ("liked", true)
        }
        Some(like_id) => {
            sqlx::query("DELETE FROM post_likes WHERE id = ?")
                .bind(like_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE posts SET like_count = like_count - 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
            ("like removed", false)
        }
    };

    let like_count = sqlx::query_scalar::<_, i64>("SELECT like_count FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(json!({
        "message": message,
        "like_count": like_count,
        "is_liked": is_liked
    })))
}

pub async fn collect_post_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let published = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM posts WHERE id = ? AND status = ?",
    )
    .bind(post_id)
    .bind(PostStatus::Published.code())
    .fetch_optional(&mut *tx)
    .await?;
    if published.is_none() {
        return Err(AppError::NotFound("post not found"));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM post_collects WHERE post_id = ? AND user_id = ?",
    )
    .bind(post_id)
    .bind(auth_user.id)
    .fetch_optional(&mut *tx)
    .await?;

    let (message, is_collected) = match existing {
        None => {
            sqlx::query("INSERT INTO post_collects (post_id, user_id, created_at) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(auth_user.id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE posts SET collect_count = collect_count + 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
            record_activity(&mut *tx, auth_user.id, "post_collect", Some("post"), Some(post_id))
                .await?;
            ("collected", true)
        }
        Some(collect_id) => {
            sqlx::query("DELETE FROM post_collects WHERE id = ?")
                .bind(collect_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE posts SET collect_count = collect_count - 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
            ("collect removed", false)
        }
    };

    let collect_count =
        sqlx::query_scalar::<_, i64>("SELECT collect_count FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;

    Ok(Json(json!({
        "message": message,
        "collect_count": collect_count,
        "is_collected": is_collected
    })))
}

pub async fn report_post_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<i64>,
    Json(new_report): Json<NewReport>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_user = auth_user.required()?;
    check_report_reason(&new_report.reason)?;

    let published = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM posts WHERE id = ? AND status = ?",
    )
    .bind(post_id)
    .bind(PostStatus::Published.code())
    .fetch_optional(&app_state.pool)
    .await?;
    if published.is_none() {
        return Err(AppError::NotFound("post not found"));
    }

    // Reports are append-once per reporter, never toggled.
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM post_reports WHERE post_id = ? AND reporter_id = ?",
    )
    .bind(post_id)
    .bind(auth_user.id)
    .fetch_optional(&app_state.pool)
    .await?;
    if existing.is_some() {
        return Err(AppError::validation("you already reported this post"));
    }

    let now = Utc::now();
    let report_id = sqlx::query(
        "INSERT INTO post_reports (post_id, reporter_id, reason, description, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(post_id)
    .bind(auth_user.id)
    .bind(&new_report.reason)
    .bind(&new_report.description)
    .bind(now)
    .execute(&app_state.pool)
    .await?
    .last_insert_rowid();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "report submitted",
            "report": {
                "id": report_id,
                "post_id": post_id,
                "reason": new_report.reason,
                "description": new_report.description,
                "status": "pending",
                "created_at": now
            }
        })),
    ))
}

pub async fn view_history_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let auth_user = auth_user.required()?;
    let params = PageParams::new(&page_query, DEFAULT_PAGE_SIZE);

    let history = sqlx::query_as::<_, ViewHistoryEntry>(
        "SELECT h.post_id, p.title, h.viewed_at FROM post_view_history h \
         JOIN posts p ON p.id = h.post_id WHERE h.user_id = ? \
         ORDER BY h.viewed_at DESC, h.id DESC LIMIT ? OFFSET ?",
    )
    .bind(auth_user.id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&app_state.pool)
    .await?;

    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM post_view_history WHERE user_id = ?")
            .bind(auth_user.id)
            .fetch_one(&app_state.pool)
            .await?;

    Ok(page_response(&params, count, history))
}

pub async fn hot_posts_route(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let posts = sqlx::query_as::<_, PostDetail>(&format!(
        "SELECT {POST_COLUMNS} {POST_JOINS} WHERE p.status = ? \
         ORDER BY p.view_count DESC, p.like_count DESC LIMIT 20"
    ))
    .bind(PostStatus::Published.code())
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "hot_posts": posts })))
}

pub async fn recommended_posts_route(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let posts = sqlx::query_as::<_, PostDetail>(&format!(
        "SELECT {POST_COLUMNS} {POST_JOINS} WHERE p.status = ? AND p.is_essence = 1 \
         ORDER BY p.created_at DESC LIMIT 10"
    ))
    .bind(PostStatus::Published.code())
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "recommended_posts": posts })))
}
