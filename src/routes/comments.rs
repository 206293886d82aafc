use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use hyper::StatusCode;
use serde_json::{json, Value};

use crate::extractors::auth_extractor::AuthUser;
use crate::routes::users::SearchQuery;
use crate::structs::comment::{CommentDetail, CommentLikeEntry, NewComment, UpdateComment};
use crate::structs::pagination::{page_response, PageParams, PageQuery, DEFAULT_PAGE_SIZE};
use crate::structs::post::NewReport;
use crate::structs::status::{CommentStatus, PostStatus};
use crate::utils::activity::record_activity;
use crate::utils::app_error::AppError;
use crate::utils::validation::{check_comment_content, check_report_reason};
use crate::AppState;

const COMMENT_COLUMNS: &str = "c.id, c.content, c.author_id, \
     u.username AS author_username, u.nickname AS author_nickname, c.post_id, c.parent_id, \
     c.floor_number, c.status, c.like_count, c.reply_count, c.created_at, c.updated_at";

const COMMENT_JOINS: &str = "FROM comments c JOIN users u ON u.id = c.author_id";

async fn fetch_comment_detail(
    pool: &sqlx::SqlitePool,
    comment_id: i64,
) -> Result<CommentDetail, AppError> {
    let comment = sqlx::query_as::<_, CommentDetail>(&format!(
        "SELECT {COMMENT_COLUMNS} {COMMENT_JOINS} WHERE c.id = ?"
    ))
    .bind(comment_id)
    .fetch_optional(pool)
    .await?;

    let Some(mut comment) = comment else {
        return Err(AppError::NotFound("comment not found"));
    };
    comment.images = sqlx::query_scalar::<_, String>(
        "SELECT url FROM comment_images WHERE comment_id = ? ORDER BY sort_order, id",
    )
    .bind(comment_id)
    .fetch_all(pool)
    .await?;

    Ok(comment)
}

pub async fn post_comments_route(
    State(app_state): State<Arc<AppState>>,
    Path(post_id): Path<i64>,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
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

    let params = PageParams::new(&page_query, DEFAULT_PAGE_SIZE);

    // Only top level floors here; replies hang off /comments/:id/replies/.
    let comments = sqlx::query_as::<_, CommentDetail>(&format!(
        "SELECT {COMMENT_COLUMNS} {COMMENT_JOINS} \
         WHERE c.post_id = ? AND c.parent_id IS NULL AND c.status = ? \
         ORDER BY c.created_at, c.id LIMIT ? OFFSET ?"
    ))
    .bind(post_id)
    .bind(CommentStatus::Normal.code())
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&app_state.pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM comments WHERE post_id = ? AND parent_id IS NULL AND status = ?",
    )
    .bind(post_id)
    .bind(CommentStatus::Normal.code())
    .fetch_one(&app_state.pool)
    .await?;

    Ok(page_response(&params, count, comments))
}

pub async fn create_comment_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(new_comment): Json<NewComment>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_user = auth_user.required()?;

    let content = new_comment.content.trim();
    check_comment_content(content)?;

    let mut tx = app_state.pool.begin().await?;

    let published = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM posts WHERE id = ? AND status = ?",
    )
    .bind(new_comment.post_id)
    .bind(PostStatus::Published.code())
    .fetch_optional(&mut *tx)
    .await?;
    if published.is_none() {
        return Err(AppError::NotFound("post not found"));
    }

    if let Some(parent_id) = new_comment.parent_id {
        let parent_post = sqlx::query_scalar::<_, i64>(
            "SELECT post_id FROM comments WHERE id = ? AND status = ?",
        )
        .bind(parent_id)
        .bind(CommentStatus::Normal.code())
        .fetch_optional(&mut *tx)
        .await?;
        match parent_post {
            None => return Err(AppError::NotFound("parent comment not found")),
            Some(parent_post) if parent_post != new_comment.post_id => {
                return Err(AppError::validation(
                    "parent comment belongs to another post",
                ));
            }
            Some(_) => {}
        }
    }

    // Floor assignment happens inside the transaction so two concurrent
    // comments on the same post cannot read the same maximum.
    let floor_number = match new_comment.floor_number {
        Some(floor) if floor > 0 => floor,
        Some(_) => return Err(AppError::validation("floor number must be positive")),
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(floor_number), 0) + 1 FROM comments WHERE post_id = ?",
            )
            .bind(new_comment.post_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let now = Utc::now();
    let comment_id = sqlx::query(
        "INSERT INTO comments (content, author_id, post_id, parent_id, floor_number, status, \
         created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(content)
    .bind(auth_user.id)
    .bind(new_comment.post_id)
    .bind(new_comment.parent_id)
    .bind(floor_number)
    .bind(CommentStatus::Normal.code())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    if let Some(images) = &new_comment.images {
        for (sort_order, url) in images.iter().enumerate() {
            sqlx::query(
                "INSERT INTO comment_images (comment_id, url, sort_order, created_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(comment_id)
            .bind(url)
            .bind(sort_order as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }

    sqlx::query(
        "UPDATE posts SET comment_count = comment_count + 1, last_reply_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(new_comment.post_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE users SET comment_count = comment_count + 1 WHERE id = ?")
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?;
    if let Some(parent_id) = new_comment.parent_id {
        sqlx::query("UPDATE comments SET reply_count = reply_count + 1 WHERE id = ?")
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;
    }
    record_activity(
        &mut *tx,
        auth_user.id,
        "comment_create",
        Some("comment"),
        Some(comment_id),
    )
    .await?;
    tx.commit().await?;

    let comment = fetch_comment_detail(&app_state.pool, comment_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "comment created", "comment": comment })),
    ))
}

pub async fn comment_detail_route(
    State(app_state): State<Arc<AppState>>,
    Path(comment_id): Path<i64>,
) -> Result<Json<CommentDetail>, AppError> {
    let comment = fetch_comment_detail(&app_state.pool, comment_id).await?;
    if comment.status != CommentStatus::Normal.code() {
        return Err(AppError::NotFound("comment not found"));
    }
    Ok(Json(comment))
}

pub async fn update_comment_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(comment_id): Path<i64>,
    Json(update): Json<UpdateComment>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let content = update.content.trim();
    check_comment_content(content)?;

    let mut tx = app_state.pool.begin().await?;

    let previous = sqlx::query_scalar::<_, String>(
        "SELECT content FROM comments WHERE id = ? AND author_id = ? AND status = ?",
    )
    .bind(comment_id)
    .bind(auth_user.id)
    .bind(CommentStatus::Normal.code())
    .fetch_optional(&mut *tx)
    .await?;
    let Some(previous) = previous else {
        return Err(AppError::NotFound("comment not found"));
    };

    let now = Utc::now();
    // The pre-edit body is archived before the row changes.
    sqlx::query(
        "INSERT INTO comment_history (comment_id, content, editor_id, edited_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(comment_id)
    .bind(&previous)
    .bind(auth_user.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
        .bind(content)
        .bind(now)
        .bind(comment_id)
        .execute(&mut *tx)
        .await?;
    record_activity(
        &mut *tx,
        auth_user.id,
        "comment_update",
        Some("comment"),
        Some(comment_id),
    )
    .await?;
    tx.commit().await?;

    let comment = fetch_comment_detail(&app_state.pool, comment_id).await?;

    Ok(Json(json!({ "message": "comment updated", "comment": comment })))
}

pub async fn delete_comment_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let comment = sqlx::query_as::<_, (i64, Option<i64>)>(
        "SELECT post_id, parent_id FROM comments WHERE id = ? AND author_id = ? AND status = ?",
    )
    .bind(comment_id)
    .bind(auth_user.id)
    .bind(CommentStatus::Normal.code())
    .fetch_optional(&mut *tx)
    .await?;
    let Some((post_id, parent_id)) = comment else {
        return Err(AppError::NotFound("comment not found"));
    };

    // Soft delete keeps the floor numbering of later comments intact.
    sqlx::query("UPDATE comments SET status = ?, updated_at = ? WHERE id = ?")
        .bind(CommentStatus::Deleted.code())
        .bind(Utc::now())
        .bind(comment_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE posts SET comment_count = comment_count - 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
    if let Some(parent_id) = parent_id {
        sqlx::query("UPDATE comments SET reply_count = reply_count - 1 WHERE id = ?")
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;
    }
    record_activity(
        &mut *tx,
        auth_user.id,
        "comment_delete",
        Some("comment"),
        Some(comment_id),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(json!({ "message": "comment deleted" })))
}

pub async fn like_comment_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let visible = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM comments WHERE id = ? AND status = ?",
    )
    .bind(comment_id)
    .bind(CommentStatus::Normal.code())
    .fetch_optional(&mut *tx)
    .await?;
    if visible.is_none() {
        return Err(AppError::NotFound("comment not found"));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM comment_likes WHERE comment_id = ? AND user_id = ?",
    )
    .bind(comment_id)
    .bind(auth_user.id)
    .fetch_optional(&mut *tx)
    .await?;

    let (message, is_liked) = match existing {
        None => {
            sqlx::query(
                "INSERT INTO comment_likes (comment_id, user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(comment_id)
            .bind(auth_user.id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            sqlx::query("UPDATE comments SET like_count = like_count + 1 WHERE id = ?")
                .bind(comment_id)
                .execute(&mut *tx)
                .await?;
            record_activity(
                &mut *tx,
                auth_user.id,
                "comment_like",
                Some("comment"),
                Some(comment_id),
            )
            .await?;
            ("liked", true)
        }
        Some(like_id) => {
            sqlx::query("DELETE FROM comment_likes WHERE id = ?")
                .bind(like_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE comments SET like_count = like_count - 1 WHERE id = ?")
                .bind(comment_id)
                .execute(&mut *tx)
                .await?;
            ("like removed", false)
        }
    };

    let like_count =
        sqlx::query_scalar::<_, i64>("SELECT like_count FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;

    Ok(Json(json!({
        "message": message,
        "like_count": like_count,
        "is_liked": is_liked
    })))
}

pub async fn report_comment_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(comment_id): Path<i64>,
    Json(new_report): Json<NewReport>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_user = auth_user.required()?;
    check_report_reason(&new_report.reason)?;

    let visible = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM comments WHERE id = ? AND status = ?",
    )
    .bind(comment_id)
    .bind(CommentStatus::Normal.code())
    .fetch_optional(&app_state.pool)
    .await?;
    if visible.is_none() {
        return Err(AppError::NotFound("comment not found"));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM comment_reports WHERE comment_id = ? AND reporter_id = ?",
    )
    .bind(comment_id)
    .bind(auth_user.id)
    .fetch_optional(&app_state.pool)
    .await?;
    if existing.is_some() {
        return Err(AppError::validation("you already reported this comment"));
    }

    let now = Utc::now();
    let report_id = sqlx::query(
        "INSERT INTO comment_reports (comment_id, reporter_id, reason, description, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(comment_id)
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
                "comment_id": comment_id,
                "reason": new_report.reason,
                "description": new_report.description,
                "status": "pending",
                "created_at": now
            }
        })),
    ))
}

pub async fn comment_likes_route(
    State(app_state): State<Arc<AppState>>,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let visible = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM comments WHERE id = ? AND status = ?",
    )
    .bind(comment_id)
    .bind(CommentStatus::Normal.code())
    .fetch_optional(&app_state.pool)
    .await?;
    if visible.is_none() {
        return Err(AppError::NotFound("comment not found"));
    }

    let likes = sqlx::query_as::<_, CommentLikeEntry>(
        "SELECT l.user_id, u.username, u.nickname, l.created_at FROM comment_likes l \
         JOIN users u ON u.id = l.user_id WHERE l.comment_id = ? ORDER BY l.created_at DESC",
    )
    .bind(comment_id)
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "likes": likes })))
}

pub async fn comment_replies_route(
    State(app_state): State<Arc<AppState>>,
    Path(comment_id): Path<i64>,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let visible = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM comments WHERE id = ? AND status = ?",
    )
    .bind(comment_id)
    .bind(CommentStatus::Normal.code())
    .fetch_optional(&app_state.pool)
    .await?;
    if visible.is_none() {
        return Err(AppError::NotFound("comment not found"));
    }

    let params = PageParams::new(&page_query, DEFAULT_PAGE_SIZE);

    let replies = sqlx::query_as::<_, CommentDetail>(&format!(
        "SELECT {COMMENT_COLUMNS} {COMMENT_JOINS} \
         WHERE c.parent_id = ? AND c.status = ? ORDER BY c.created_at, c.id LIMIT ? OFFSET ?"
    ))
    .bind(comment_id)
    .bind(CommentStatus::Normal.code())
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&app_state.pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM comments WHERE parent_id = ? AND status = ?",
    )
    .bind(comment_id)
    .bind(CommentStatus::Normal.code())
    .fetch_one(&app_state.pool)
    .await?;

    Ok(page_response(&params, count, replies))
}

pub async fn own_comments_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let auth_user = auth_user.required()?;
    let params = PageParams::new(&page_query, DEFAULT_PAGE_SIZE);

    let comments = sqlx::query_as::<_, CommentDetail>(&format!(
        "SELECT {COMMENT_COLUMNS} {COMMENT_JOINS} \
         WHERE c.author_id = ? AND c.status = ? ORDER BY c.created_at DESC, c.id DESC \
         LIMIT ? OFFSET ?"
    ))
    .bind(auth_user.id)
    .bind(CommentStatus::Normal.code())
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&app_state.pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM comments WHERE author_id = ? AND status = ?",
    )
    .bind(auth_user.id)
    .bind(CommentStatus::Normal.code())
    .fetch_one(&app_state.pool)
    .await?;

    Ok(page_response(&params, count, comments))
}

pub async fn search_comments_route(
    State(app_state): State<Arc<AppState>>,
    Query(search_query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let Some(q) = search_query.q.as_deref().filter(|q| !q.trim().is_empty()) else {
        return Err(AppError::validation("search query must not be empty"));
    };

    let comments = sqlx::query_as::<_, CommentDetail>(&format!(
        "SELECT {COMMENT_COLUMNS} {COMMENT_JOINS} \
         WHERE c.content LIKE ? AND c.status = ? ORDER BY c.created_at DESC LIMIT 20"
    ))
    .bind(format!("%{}%", q.trim()))
    .bind(CommentStatus::Normal.code())
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "results": comments })))
}
