use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Post snapshot joined with its author and tieba. `images` is filled
/// separately on detail responses; list queries leave it empty.
#[derive(Serialize, FromRow)]
pub struct PostDetail {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_username: String,
    pub author_nickname: Option<String>,
    pub tieba_id: i64,
    pub tieba_name: String,
    pub post_type: String,
    pub status: i64,
    pub view_count: i64,
    pub comment_count: i64,
    pub like_count: i64,
    pub collect_count: i64,
    pub share_count: i64,
    pub is_top: bool,
    pub is_essence: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub last_reply_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub tieba_id: i64,
    pub post_type: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct PostListQuery {
    pub tieba: Option<i64>,
    pub author: Option<i64>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Deserialize)]
pub struct NewReport {
    pub reason: String,
    pub description: Option<String>,
}

#[derive(Serialize, FromRow)]
pub struct ViewHistoryEntry {
    pub post_id: i64,
    pub title: String,
    pub viewed_at: DateTime<Utc>,
}
