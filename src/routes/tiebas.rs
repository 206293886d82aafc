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
use crate::routes::users::SearchQuery;
use crate::structs::pagination::{
    page_response, PageParams, PageQuery, DEFAULT_PAGE_SIZE, MEMBER_PAGE_SIZE,
};
use crate::structs::status::{MemberRole, TiebaStatus};
use crate::structs::tieba::{
    Announcement, Application, Category, MemberEntry, NewAnnouncement, NewApplication, NewTieba,
    ReviewApplication, TiebaDetail, TiebaListQuery,
};
use crate::utils::activity::record_activity;
use crate::utils::app_error::AppError;
use crate::AppState;

const TIEBA_COLUMNS: &str = "id, name, description, avatar, banner, owner_id, category_id, \
     member_count, post_count, today_post_count, total_view_count, status, is_recommended, \
     is_official, join_rule, post_rule, created_at, last_activity_at";

/// Members sort owner first, then admins, moderators and plain members.
const MEMBER_ORDER: &str = "CASE role WHEN 'owner' THEN 0 WHEN 'admin' THEN 1 \
     WHEN 'moderator' THEN 2 ELSE 3 END, joined_at";

async fn fetch_tieba_detail(
    pool: &sqlx::SqlitePool,
    tieba_id: i64,
) -> Result<TiebaDetail, AppError> {
    let tieba = sqlx::query_as::<_, TiebaDetail>(&format!(
        "SELECT {TIEBA_COLUMNS} FROM tiebas WHERE id = ?"
    ))
    .bind(tieba_id)
    .fetch_optional(pool)
    .await?;

    tieba.ok_or(AppError::NotFound("tieba not found"))
}

async fn member_role<'e, E>(
    executor: E,
    tieba_id: i64,
    user_id: i64,
) -> Result<Option<MemberRole>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let role = sqlx::query_scalar::<_, String>(
        "SELECT role FROM tieba_members WHERE tieba_id = ? AND user_id = ?",
    )
    .bind(tieba_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(role.as_deref().and_then(MemberRole::from_str))
}

pub async fn list_categories_route(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, icon, sort_order FROM categories \
         WHERE is_active = 1 ORDER BY sort_order, created_at",
    )
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(categories))
}

pub async fn list_tiebas_route(
    State(app_state): State<Arc<AppState>>,
    Query(list_query): Query<TiebaListQuery>,
) -> Result<Response, AppError> {
    let params = PageParams::new(
        &PageQuery {
            page: list_query.page,
            page_size: list_query.page_size,
        },
        DEFAULT_PAGE_SIZE,
    );

    let push_filters = |builder: &mut QueryBuilder<Sqlite>| {
        builder.push(" WHERE status = ");
        builder.push_bind(TiebaStatus::Normal.code());
        if let Some(q) = list_query.q.as_deref().filter(|q| !q.trim().is_empty()) {
            let pattern = format!("%{}%", q.trim());
            builder.push(" AND (name LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR description LIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(category) = list_query.category {
            builder.push(" AND category_id = ");
            builder.push_bind(category);
        }
    };

    let mut builder =
        QueryBuilder::<Sqlite>::new(format!("SELECT {TIEBA_COLUMNS} FROM tiebas"));
    push_filters(&mut builder);
    builder.push(" ORDER BY member_count DESC, post_count DESC LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let tiebas = builder
        .build_query_as::<TiebaDetail>()
        .fetch_all(&app_state.pool)
        .await?;

    let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tiebas");
    push_filters(&mut count_builder);
    let count = count_builder
        .build_query_scalar::<i64>()
        .fetch_one(&app_state.pool)
        .await?;

    Ok(page_response(&params, count, tiebas))
}

pub async fn create_tieba_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(new_tieba): Json<NewTieba>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_user = auth_user.required()?;

    let name = new_tieba.name.trim();
    let description = new_tieba.description.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(AppError::validation(
            "tieba name must contain between 1 and 100 characters",
        ));
    }
    if description.is_empty() || description.len() > 1000 {
        return Err(AppError::validation(
            "tieba description must contain between 1 and 1000 characters",
        ));
    }

    let name_taken = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE name = ?")
        .bind(name)
        .fetch_optional(&app_state.pool)
        .await?;
    if name_taken.is_some() {
        warn!("Tieba name `{name}` already taken");
        return Err(AppError::validation("tieba name already taken"));
    }

    let now = Utc::now();
    let mut tx = app_state.pool.begin().await?;

    // member_count starts at 1: the owner membership below is part of the
    // same transaction.
    let tieba_id = sqlx::query(
        "INSERT INTO tiebas (name, description, avatar, banner, owner_id, category_id, \
         member_count, status, join_rule, post_rule, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(description)
    .bind(&new_tieba.avatar)
    .bind(&new_tieba.banner)
    .bind(auth_user.id)
    .bind(new_tieba.category_id)
    .bind(TiebaStatus::Pending.code())
    .bind(&new_tieba.join_rule)
    .bind(&new_tieba.post_rule)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO tieba_members (tieba_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(tieba_id)
    .bind(auth_user.id)
    .bind(MemberRole::Owner.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    record_activity(&mut *tx, auth_user.id, "tieba_create", Some("tieba"), Some(tieba_id))
        .await?;
    tx.commit().await?;

    let tieba = fetch_tieba_detail(&app_state.pool, tieba_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "tieba created, pending review", "tieba": tieba })),
    ))
}

pub async fn tieba_detail_route(
    State(app_state): State<Arc<AppState>>,
    Path(tieba_id): Path<i64>,
) -> Result<Json<TiebaDetail>, AppError> {
    let tieba = sqlx::query_as::<_, TiebaDetail>(&format!(
        "SELECT {TIEBA_COLUMNS} FROM tiebas WHERE id = ? AND status = ?"
    ))
    .bind(tieba_id)
    .bind(TiebaStatus::Normal.code())
    .fetch_optional(&app_state.pool)
    .await?;

    tieba.map(Json).ok_or(AppError::NotFound("tieba not found"))
}

pub async fn join_tieba_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(tieba_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ? AND status = ?")
        .bind(tieba_id)
        .bind(TiebaStatus::Normal.code())
        .fetch_optional(&mut *tx)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    if member_role(&mut *tx, tieba_id, auth_user.id).await?.is_some() {
        return Err(AppError::validation("you already joined this tieba"));
    }

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO tieba_members (tieba_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(tieba_id)
    .bind(auth_user.id)
    .bind(MemberRole::Member.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE tiebas SET member_count = member_count + 1 WHERE id = ?")
        .bind(tieba_id)
        .execute(&mut *tx)
        .await?;
    record_activity(&mut *tx, auth_user.id, "join_tieba", Some("tieba"), Some(tieba_id)).await?;

    let member_count =
        sqlx::query_scalar::<_, i64>("SELECT member_count FROM tiebas WHERE id = ?")
            .bind(tieba_id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;

    Ok(Json(json!({
        "message": "joined the tieba",
        "member": { "tieba_id": tieba_id, "user_id": auth_user.id, "role": "member", "joined_at": now },
        "member_count": member_count
    })))
}

pub async fn leave_tieba_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(tieba_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ?")
        .bind(tieba_id)
        .fetch_optional(&mut *tx)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    let Some(role) = member_role(&mut *tx, tieba_id, auth_user.id).await? else {
        return Err(AppError::validation("you are not a member of this tieba"));
    };
    if role == MemberRole::Owner {
        return Err(AppError::validation("the owner cannot leave their tieba"));
    }

    sqlx::query("DELETE FROM tieba_members WHERE tieba_id = ? AND user_id = ?")
        .bind(tieba_id)
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE tiebas SET member_count = member_count - 1 WHERE id = ?")
        .bind(tieba_id)
        .execute(&mut *tx)
        .await?;
    record_activity(&mut *tx, auth_user.id, "leave_tieba", Some("tieba"), Some(tieba_id)).await?;
    tx.commit().await?;

    Ok(Json(json!({ "message": "left the tieba" })))
}

pub async fn tieba_members_route(
    State(app_state): State<Arc<AppState>>,
    Path(tieba_id): Path<i64>,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ?")
        .bind(tieba_id)
        .fetch_optional(&app_state.pool)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    let params = PageParams::new(&page_query, MEMBER_PAGE_SIZE);

    let members = sqlx::query_as::<_, MemberEntry>(&format!(
        "SELECT m.user_id, u.username, u.nickname, u.avatar, m.role, m.post_count, \
         m.comment_count, m.joined_at FROM tieba_members m JOIN users u ON u.id = m.user_id \
         WHERE m.tieba_id = ? AND m.is_active = 1 ORDER BY {MEMBER_ORDER} LIMIT ? OFFSET ?"
    ))
    .bind(tieba_id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&app_state.pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tieba_members WHERE tieba_id = ? AND is_active = 1",
    )
    .bind(tieba_id)
    .fetch_one(&app_state.pool)
    .await?;

    Ok(page_response(&params, count, members))
}

pub async fn tieba_announcements_route(
    State(app_state): State<Arc<AppState>>,
    Path(tieba_id): Path<i64>,
) -> Result<Json<Vec<Announcement>>, AppError> {
    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ?")
        .bind(tieba_id)
        .fetch_optional(&app_state.pool)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    let announcements = sqlx::query_as::<_, Announcement>(
        "SELECT id, tieba_id, author_id, title, content, is_pinned, is_important, created_at, \
         expire_at FROM tieba_announcements WHERE tieba_id = ? AND is_active = 1 \
         ORDER BY is_pinned DESC, created_at DESC",
    )
    .bind(tieba_id)
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(announcements))
}

pub async fn create_announcement_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(tieba_id): Path<i64>,
    Json(new_announcement): Json<NewAnnouncement>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_user = auth_user.required()?;

    let title = new_announcement.title.trim();
    if title.is_empty() || title.len() > 200 {
        return Err(AppError::validation(
            "announcement title must contain between 1 and 200 characters",
        ));
    }
    if new_announcement.content.trim().is_empty() {
        return Err(AppError::validation("announcement content must not be empty"));
    }

    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ? AND status = ?")
        .bind(tieba_id)
        .bind(TiebaStatus::Normal.code())
        .fetch_optional(&app_state.pool)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    let role = member_role(&app_state.pool, tieba_id, auth_user.id).await?;
    if !role.is_some_and(MemberRole::can_moderate) {
        return Err(AppError::Forbidden(
            "only moderators can publish announcements",
        ));
    }

    let now = Utc::now();
    let announcement_id = sqlx::query(
        "INSERT INTO tieba_announcements (tieba_id, author_id, title, content, is_pinned, \
         is_important, created_at, updated_at, expire_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(tieba_id)
    .bind(auth_user.id)
    .bind(title)
    .bind(new_announcement.content.trim())
    .bind(new_announcement.is_pinned.unwrap_or(false))
    .bind(new_announcement.is_important.unwrap_or(false))
    .bind(now)
    .bind(now)
    .bind(new_announcement.expire_at)
    .execute(&app_state.pool)
    .await?
    .last_insert_rowid();

    let announcement = sqlx::query_as::<_, Announcement>(
        "SELECT id, tieba_id, author_id, title, content, is_pinned, is_important, created_at, \
         expire_at FROM tieba_announcements WHERE id = ?",
    )
    .bind(announcement_id)
    .fetch_one(&app_state.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "announcement published", "announcement": announcement })),
    ))
}

pub async fn apply_tieba_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(tieba_id): Path<i64>,
    Json(new_application): Json<NewApplication>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_user = auth_user.required()?;

    let apply_reason = new_application.apply_reason.trim();
    if apply_reason.is_empty() || apply_reason.len() > 500 {
        return Err(AppError::validation(
            "application reason must contain between 1 and 500 characters",
        ));
    }

    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ? AND status = ?")
        .bind(tieba_id)
        .bind(TiebaStatus::Normal.code())
        .fetch_optional(&app_state.pool)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    if member_role(&app_state.pool, tieba_id, auth_user.id)
        .await?
        .is_some()
    {
        return Err(AppError::validation("you already joined this tieba"));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM tieba_applications WHERE tieba_id = ? AND applicant_id = ?",
    )
    .bind(tieba_id)
    .bind(auth_user.id)
    .fetch_optional(&app_state.pool)
    .await?;
    if existing.is_some() {
        return Err(AppError::validation("you already applied to this tieba"));
    }

    let now = Utc::now();
    let application_id = sqlx::query(
        "INSERT INTO tieba_applications (tieba_id, applicant_id, apply_reason, applied_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(tieba_id)
    .bind(auth_user.id)
    .bind(apply_reason)
    .bind(now)
    .execute(&app_state.pool)
    .await?
    .last_insert_rowid();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "application submitted",
            "application": {
                "id": application_id,
                "tieba_id": tieba_id,
                "applicant_id": auth_user.id,
                "apply_reason": apply_reason,
                "status": "pending",
                "applied_at": now
            }
        })),
    ))
}

pub async fn tieba_applications_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(tieba_id): Path<i64>,
) -> Result<Json<Vec<Application>>, AppError> {
    let auth_user = auth_user.required()?;

    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ?")
        .bind(tieba_id)
        .fetch_optional(&app_state.pool)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    let role = member_role(&app_state.pool, tieba_id, auth_user.id).await?;
    if !role.is_some_and(MemberRole::can_review) {
        return Err(AppError::Forbidden("only the owner or admins can review applications"));
    }

    let applications = sqlx::query_as::<_, Application>(
        "SELECT a.id, a.tieba_id, a.applicant_id, u.username AS applicant_username, \
         a.apply_reason, a.status, a.reviewer_id, a.review_comment, a.applied_at, a.reviewed_at \
         FROM tieba_applications a JOIN users u ON u.id = a.applicant_id \
         WHERE a.tieba_id = ? ORDER BY a.applied_at DESC",
    )
    .bind(tieba_id)
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(applications))
}

pub async fn review_application_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path((tieba_id, application_id)): Path<(i64, i64)>,
    Json(review): Json<ReviewApplication>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let tieba = sqlx::query_scalar::<_, i64>("SELECT id FROM tiebas WHERE id = ?")
        .bind(tieba_id)
        .fetch_optional(&mut *tx)
        .await?;
    if tieba.is_none() {
        return Err(AppError::NotFound("tieba not found"));
    }

    let role = member_role(&mut *tx, tieba_id, auth_user.id).await?;
    if !role.is_some_and(MemberRole::can_review) {
        return Err(AppError::Forbidden("only the owner or admins can review applications"));
    }

    let application = sqlx::query_as::<_, (i64, String)>(
        "SELECT applicant_id, status FROM tieba_applications WHERE id = ? AND tieba_id = ?",
    )
    .bind(application_id)
    .bind(tieba_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((applicant_id, status)) = application else {
        return Err(AppError::NotFound("application not found"));
    };
    if status != "pending" {
        return Err(AppError::validation("application already reviewed"));
    }

    let now = Utc::now();
    let new_status = if review.approve {
        if member_role(&mut *tx, tieba_id, applicant_id).await?.is_some() {
            return Err(AppError::validation("applicant already joined this tieba"));
        }
        sqlx::query(
            "INSERT INTO tieba_members (tieba_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(tieba_id)
        .bind(applicant_id)
        .bind(MemberRole::Member.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE tiebas SET member_count = member_count + 1 WHERE id = ?")
            .bind(tieba_id)
            .execute(&mut *tx)
            .await?;
        record_activity(&mut *tx, applicant_id, "join_tieba", Some("tieba"), Some(tieba_id))
            .await?;
        "approved"
    } else {
        "rejected"
    };

    sqlx::query(
        "UPDATE tieba_applications SET status = ?, reviewer_id = ?, review_comment = ?, \
         reviewed_at = ? WHERE id = ?",
    )
    .bind(new_status)
    .bind(auth_user.id)
    .bind(&review.review_comment)
    .bind(now)
    .bind(application_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(json!({ "message": format!("application {new_status}") })))
}

pub async fn hot_tiebas_route(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let tiebas = sqlx::query_as::<_, TiebaDetail>(&format!(
        "SELECT {TIEBA_COLUMNS} FROM tiebas WHERE status = ? \
         ORDER BY today_post_count DESC, member_count DESC LIMIT 20"
    ))
    .bind(TiebaStatus::Normal.code())
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "hot_tiebas": tiebas })))
}

pub async fn recommended_tiebas_route(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let tiebas = sqlx::query_as::<_, TiebaDetail>(&format!(
        "SELECT {TIEBA_COLUMNS} FROM tiebas WHERE status = ? AND is_recommended = 1 \
         ORDER BY member_count DESC LIMIT 10"
    ))
    .bind(TiebaStatus::Normal.code())
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "recommended_tiebas": tiebas })))
}

pub async fn search_tiebas_route(
    State(app_state): State<Arc<AppState>>,
    Query(search): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let query = search.q.unwrap_or_default();
    let query = query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::validation("search query must not be empty"));
    }

    let pattern = format!("%{query}%");
    let tiebas = sqlx::query_as::<_, TiebaDetail>(&format!(
        "SELECT {TIEBA_COLUMNS} FROM tiebas WHERE status = ? AND (name LIKE ? OR description LIKE ?) \
         ORDER BY member_count DESC, post_count DESC LIMIT 20"
    ))
    .bind(TiebaStatus::Normal.code())
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "results": tiebas })))
}
