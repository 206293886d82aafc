use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Snapshot returned for any user, own or foreign. Counters are the
/// denormalized values maintained by the follow/post/comment handlers.
#[derive(Serialize, FromRow)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub gender: i64,
    pub bio: Option<String>,
    pub status: i64,
    pub post_count: i64,
    pub comment_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, FromRow)]
pub struct PrivateUser {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub gender: i64,
    pub birthday: Option<NaiveDate>,
    pub bio: Option<String>,
    pub status: i64,
    pub post_count: i64,
    pub comment_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct RegisterUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub nickname: Option<String>,
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginUser {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub gender: Option<i64>,
    pub birthday: Option<NaiveDate>,
    pub bio: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePassword {
    pub old_password: String,
    pub new_password: String,
}

/// One edge of the follow graph, joined with the user on the far side.
#[derive(Serialize, FromRow)]
pub struct FollowEntry {
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
}
