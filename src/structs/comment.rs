use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Serialize, FromRow)]
pub struct CommentDetail {
    pub id: i64,
    pub content: String,
    pub author_id: i64,
    pub author_username: String,
    pub author_nickname: Option<String>,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub floor_number: i64,
    pub status: i64,
    pub like_count: i64,
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Deserialize)]
pub struct NewComment {
    pub content: String,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    /// Explicit floors are accepted; absent ones are assigned
    /// `max(floor) + 1` within the insert transaction.
    pub floor_number: Option<i64>,
    pub images: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct UpdateComment {
    pub content: String,
}

#[derive(Serialize, FromRow)]
pub struct CommentLikeEntry {
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
}
