use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i64,
}

#[derive(Serialize, FromRow)]
pub struct TiebaDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub owner_id: i64,
    pub category_id: Option<i64>,
    pub member_count: i64,
    pub post_count: i64,
    pub today_post_count: i64,
    pub total_view_count: i64,
    pub status: i64,
    pub is_recommended: bool,
    pub is_official: bool,
    pub join_rule: Option<String>,
    pub post_rule: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct NewTieba {
    pub name: String,
    pub description: String,
    pub category_id: Option<i64>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub join_rule: Option<String>,
    pub post_rule: Option<String>,
}

#[derive(Deserialize)]
pub struct TiebaListQuery {
    pub q: Option<String>,
    pub category: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize, FromRow)]
pub struct MemberEntry {
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    pub post_count: i64,
    pub comment_count: i64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize, FromRow)]
pub struct Announcement {
    pub id: i64,
    pub tieba_id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub is_pinned: bool,
    pub is_important: bool,
    pub created_at: DateTime<Utc>,
    pub expire_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct NewAnnouncement {
    pub title: String,
    pub content: String,
    pub is_pinned: Option<bool>,
    pub is_important: Option<bool>,
    pub expire_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, FromRow)]
pub struct Application {
    pub id: i64,
    pub tieba_id: i64,
    pub applicant_id: i64,
    pub applicant_username: String,
    pub apply_reason: String,
    pub status: String,
    pub reviewer_id: Option<i64>,
    pub review_comment: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct NewApplication {
    pub apply_reason: String,
}

#[derive(Deserialize)]
pub struct ReviewApplication {
    pub approve: bool,
    pub review_comment: Option<String>,
}
