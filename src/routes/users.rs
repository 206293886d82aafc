use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::extractors::auth_extractor::AuthUser;
use crate::structs::activity::ActivityEntry;
use crate::structs::pagination::{page_response, PageParams, PageQuery, DEFAULT_PAGE_SIZE};
use crate::structs::status::UserStatus;
use crate::structs::user::{
    ChangePassword, FollowEntry, LoginUser, PrivateUser, PublicUser, RegisterUser, UpdateUser,
};
use crate::utils::activity::record_activity;
use crate::utils::app_error::AppError;
use crate::utils::password::{generate_token, hash_password, verify_password};
use crate::utils::validation::{check_email_address, check_password, check_username};
use crate::AppState;

const PRIVATE_USER_COLUMNS: &str = "id, username, nickname, email, phone, avatar, gender, \
     birthday, bio, status, post_count, comment_count, follower_count, following_count, \
     created_at, updated_at";

const PUBLIC_USER_COLUMNS: &str = "id, username, nickname, avatar, gender, bio, status, \
     post_count, comment_count, follower_count, following_count, created_at";

async fn fetch_private_user(
    pool: &sqlx::SqlitePool,
    user_id: i64,
) -> Result<PrivateUser, AppError> {
    let user =
        sqlx::query_as::<_, PrivateUser>(&format!(
            "SELECT {PRIVATE_USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or(AppError::NotFound("user not found"))
}

pub async fn register_route(
    State(app_state): State<Arc<AppState>>,
    Json(mut register_user): Json<RegisterUser>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    register_user.username = register_user.username.trim().to_lowercase();
    register_user.email = register_user.email.trim().to_lowercase();

    check_username(&register_user.username)?;
    check_email_address(&register_user.email)?;
    check_password(&register_user.password)?;

    let email_taken = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(&register_user.email)
        .fetch_optional(&app_state.pool)
        .await?;
    if email_taken.is_some() {
        warn!("Email address `{}` already used", register_user.email);
        return Err(AppError::validation("email address already used"));
    }

    let username_taken = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
        .bind(&register_user.username)
        .fetch_optional(&app_state.pool)
        .await?;
    if username_taken.is_some() {
        warn!("Username `{}` already used", register_user.username);
        return Err(AppError::validation("username already used"));
    }

    let token = generate_token();
    let now = Utc::now();

    let mut tx = app_state.pool.begin().await?;
    let user_id = sqlx::query(
        "INSERT INTO users (username, nickname, email, phone, password, token, status, \
         created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&register_user.username)
    .bind(&register_user.nickname)
    .bind(&register_user.email)
    .bind(&register_user.phone)
    .bind(hash_password(&register_user.password))
    .bind(&token)
    .bind(UserStatus::Normal.code())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    record_activity(&mut *tx, user_id, "register", None, None).await?;
    tx.commit().await?;

    let user = fetch_private_user(&app_state.pool, user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "registration successful", "user": user, "token": token })),
    ))
}

pub async fn login_route(
    State(app_state): State<Arc<AppState>>,
    Json(login_user): Json<LoginUser>,
) -> Result<Json<Value>, AppError> {
    struct Credentials {
        id: i64,
        password: String,
        token: String,
        status: i64,
    }

    let row = sqlx::query_as::<_, (i64, String, String, i64)>(
        "SELECT id, password, token, status FROM users WHERE username = ?",
    )
    .bind(login_user.username.trim().to_lowercase())
    .fetch_optional(&app_state.pool)
    .await?
    .map(|(id, password, token, status)| Credentials {
        id,
        password,
        token,
        status,
    });

    let Some(credentials) = row else {
        return Err(AppError::validation("incorrect username or password"));
    };
    if !verify_password(&login_user.password, &credentials.password) {
        warn!("Failed login for user {}", credentials.id);
        return Err(AppError::validation("incorrect username or password"));
    }
    if credentials.status == UserStatus::Disabled.code() {
        return Err(AppError::validation("this account is disabled"));
    }

    record_activity(&app_state.pool, credentials.id, "login", None, None).await?;

    let user = fetch_private_user(&app_state.pool, credentials.id).await?;

    Ok(Json(
        json!({ "message": "login successful", "user": user, "token": credentials.token }),
    ))
}

pub async fn get_profile_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<PrivateUser>, AppError> {
    let auth_user = auth_user.required()?;
    let user = fetch_private_user(&app_state.pool, auth_user.id).await?;
    Ok(Json(user))
}

pub async fn update_profile_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(update): Json<UpdateUser>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    if let Some(bio) = &update.bio {
        if bio.len() > 500 {
            return Err(AppError::validation("bio must not exceed 500 characters"));
        }
    }
    if let Some(gender) = update.gender {
        if !(0..=2).contains(&gender) {
            return Err(AppError::validation("gender must be 0, 1 or 2"));
        }
    }

    sqlx::query(
        "UPDATE users SET nickname = COALESCE(?, nickname), avatar = COALESCE(?, avatar), \
         gender = COALESCE(?, gender), birthday = COALESCE(?, birthday), \
         bio = COALESCE(?, bio), updated_at = ? WHERE id = ?",
    )
    .bind(&update.nickname)
    .bind(&update.avatar)
    .bind(update.gender)
    .bind(update.birthday)
    .bind(&update.bio)
    .bind(Utc::now())
    .bind(auth_user.id)
    .execute(&app_state.pool)
    .await?;

    let user = fetch_private_user(&app_state.pool, auth_user.id).await?;

    Ok(Json(json!({ "message": "profile updated", "user": user })))
}

pub async fn change_password_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(change): Json<ChangePassword>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;
    check_password(&change.new_password)?;

    let current_hash =
        sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE id = ?")
            .bind(auth_user.id)
            .fetch_one(&app_state.pool)
            .await?;

    if !verify_password(&change.old_password, &current_hash) {
        return Err(AppError::validation("old password is incorrect"));
    }

    sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE id = ?")
        .bind(hash_password(&change.new_password))
        .bind(Utc::now())
        .bind(auth_user.id)
        .execute(&app_state.pool)
        .await?;

    Ok(Json(json!({ "message": "password changed" })))
}

pub async fn user_activities_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let auth_user = auth_user.required()?;
    let params = PageParams::new(&page_query, DEFAULT_PAGE_SIZE);

    let activities = sqlx::query_as::<_, ActivityEntry>(
        "SELECT id, action, target_type, target_id, created_at FROM user_activities \
         WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(auth_user.id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&app_state.pool)
    .await?;

    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_activities WHERE user_id = ?")
            .bind(auth_user.id)
            .fetch_one(&app_state.pool)
            .await?;

    Ok(page_response(&params, count, activities))
}

pub async fn user_detail_route(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<PublicUser>, AppError> {
    let user = sqlx::query_as::<_, PublicUser>(&format!(
        "SELECT {PUBLIC_USER_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(user_id)
    .fetch_optional(&app_state.pool)
    .await?;

    user.map(Json).ok_or(AppError::NotFound("user not found"))
}

pub async fn follow_user_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    if user_id == auth_user.id {
        return Err(AppError::validation("you cannot follow yourself"));
    }

    let mut tx = app_state.pool.begin().await?;

    let target = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(target_id) = target else {
        return Err(AppError::NotFound("user not found"));
    };

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM user_follows WHERE follower_id = ? AND following_id = ?",
    )
    .bind(auth_user.id)
    .bind(target_id)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(AppError::validation("you already follow this user"));
    }

    let now = Utc::now();
    sqlx::query("INSERT INTO user_follows (follower_id, following_id, created_at) VALUES (?, ?, ?)")
        .bind(auth_user.id)
        .bind(target_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = ?")
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET follower_count = follower_count + 1 WHERE id = ?")
        .bind(target_id)
        .execute(&mut *tx)
        .await?;
    record_activity(&mut *tx, auth_user.id, "follow", Some("user"), Some(target_id)).await?;
    tx.commit().await?;

    Ok(Json(json!({
        "message": "followed",
        "follow": { "follower_id": auth_user.id, "following_id": target_id, "created_at": now }
    })))
}

pub async fn unfollow_user_route(
    State(app_state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let auth_user = auth_user.required()?;

    let mut tx = app_state.pool.begin().await?;

    let target = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(target_id) = target else {
        return Err(AppError::NotFound("user not found"));
    };

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM user_follows WHERE follower_id = ? AND following_id = ?",
    )
    .bind(auth_user.id)
    .bind(target_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(follow_id) = existing else {
        return Err(AppError::validation("you do not follow this user"));
    };

    sqlx::query("DELETE FROM user_follows WHERE id = ?")
        .bind(follow_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET following_count = following_count - 1 WHERE id = ?")
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET follower_count = follower_count - 1 WHERE id = ?")
        .bind(target_id)
        .execute(&mut *tx)
        .await?;
    record_activity(&mut *tx, auth_user.id, "unfollow", Some("user"), Some(target_id)).await?;
    tx.commit().await?;

    Ok(Json(json!({ "message": "unfollowed" })))
}

async fn follow_edge_list(
    app_state: &AppState,
    user_id: i64,
    page_query: &PageQuery,
    followers: bool,
) -> Result<Response, AppError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&app_state.pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("user not found"));
    }

    // followers: who follows `user_id`; following: whom `user_id` follows.
    let (join_on, filter_on) = if followers {
        ("f.follower_id", "f.following_id")
    } else {
        ("f.following_id", "f.follower_id")
    };

    let params = PageParams::new(page_query, DEFAULT_PAGE_SIZE);

    let entries = sqlx::query_as::<_, FollowEntry>(&format!(
        "SELECT u.id AS user_id, u.username, u.nickname, u.avatar, u.follower_count, \
         u.following_count, f.created_at FROM user_follows f JOIN users u ON u.id = {join_on} \
         WHERE {filter_on} = ? ORDER BY f.created_at DESC, f.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(user_id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&app_state.pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM user_follows f WHERE {filter_on} = ?"
    ))
    .bind(user_id)
    .fetch_one(&app_state.pool)
    .await?;

    Ok(page_response(&params, count, entries))
}

pub async fn user_followers_route(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
    follow_edge_list(&app_state, user_id, &page_query, true).await
}

pub async fn user_following_route(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(page_query): Query<PageQuery>,
) -> Result<Response, AppError> {
    follow_edge_list(&app_state, user_id, &page_query, false).await
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub async fn search_users_route(
    State(app_state): State<Arc<AppState>>,
    Query(search): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let query = search.q.unwrap_or_default();
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::validation("search query must not be empty"));
    }

    let pattern = format!("%{query}%");
    let users = sqlx::query_as::<_, PublicUser>(&format!(
        "SELECT {PUBLIC_USER_COLUMNS} FROM users \
         WHERE (username LIKE ? OR nickname LIKE ? OR email LIKE ?) AND status = ? LIMIT 20"
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(UserStatus::Normal.code())
    .fetch_all(&app_state.pool)
    .await?;

    Ok(Json(json!({ "results": users })))
}
