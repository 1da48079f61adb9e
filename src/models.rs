use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub avatar_path: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Internal lookup result for login; the hash never crosses the API boundary.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub role: String,
}

/// Partial profile update; `password_hash` is only written when present.
#[derive(Debug, Clone)]
pub struct UpdateUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub user_id: Id,
    pub content: String,
    pub image_path: Option<String>,
    pub like_count: i32,
    pub comment_count: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Id,
    pub content: String,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub user_id: Id,
    pub content: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub user_id: Id,
    pub content: String,
}

/// Bounded comment preview attached to each feed entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CommentPreview {
    pub id: Id,
    pub user_id: Id,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Feed entry: post joined with its author plus up to three comments.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct FeedPost {
    pub id: Id,
    pub user_id: Id,
    pub user_name: String,
    pub user_email: String,
    pub user_avatar: Option<String>,
    pub content: String,
    pub image_path: Option<String>,
    pub like_count: i32,
    pub comment_count: i32,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    #[serde(default)]
    pub comments: Vec<CommentPreview>,
}

/// Post row as it appears on a profile page (author implied by context).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostSummary {
    pub id: Id,
    pub content: String,
    pub image_path: Option<String>,
    pub like_count: i32,
    pub comment_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Liked,
    Unliked,
}

/// Outcome of the idempotent like toggle; `total_likes` is the recount, not
/// an increment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LikeToggle {
    pub post_id: Id,
    pub user_id: Id,
    pub action: LikeAction,
    pub total_likes: i64,
}
