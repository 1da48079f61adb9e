use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a new user. `Conflict` when the email is taken; the unique
    /// index is the authoritative guard, the caller's pre-check is advisory.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_credentials(&self, email: &str) -> RepoResult<Option<Credentials>>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// `Conflict` when the email belongs to a different user id.
    async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User>;
    /// Unconditional overwrite; absent ids are a no-op by design.
    async fn set_avatar(&self, id: Id, path: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Active posts, newest first, author joined in, up to three active
    /// comments per post (oldest first). One bounded comment query per post.
    async fn feed(&self, limit: i64) -> RepoResult<Vec<FeedPost>>;
    async fn posts_by_user(&self, user_id: Id, limit: i64) -> RepoResult<Vec<PostSummary>>;
    async fn count_by_user(&self, user_id: Id) -> RepoResult<i64>;
    /// Flag flip; repeat calls are a no-op, not an error.
    async fn soft_delete_post(&self, id: Id) -> RepoResult<()>;
    /// Hard cascade: comments, then likes, then the post, in one transaction.
    async fn purge_post(&self, id: Id) -> RepoResult<()>;
    /// Substring search over content, newest first, inactive rows included.
    async fn find_by_content(&self, pattern: &str) -> RepoResult<Vec<Post>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Insert and refresh the parent's comment_count from a full recount,
    /// both inside one transaction.
    async fn add_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn recent_for_post(&self, post_id: Id, limit: i64) -> RepoResult<Vec<CommentPreview>>;
}

#[async_trait]
pub trait LikeRepo: Send + Sync {
    /// Insert-if-absent / delete-if-present, then recount and persist the
    /// counter, all in one transaction. Double-toggle restores the original
    /// state.
    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle>;
}

pub trait Repo: UserRepo + PostRepo + CommentRepo + LikeRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + CommentRepo + LikeRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        users: HashMap<Id, User>,
        passwords: HashMap<Id, String>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        likes: HashMap<(Id, Id), chrono::DateTime<Utc>>,
        next_id: Id,
    }

    /// Backend used by the test suite; mirrors the Postgres semantics,
    /// including the counter recounts and the cascade order.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn recount_likes(state: &mut State, post_id: Id) -> i64 {
            let total = state.likes.keys().filter(|(p, _)| *p == post_id).count() as i64;
            if let Some(post) = state.posts.get_mut(&post_id) {
                post.like_count = total as i32;
            }
            total
        }

        fn recount_comments(state: &mut State, post_id: Id) -> i64 {
            let total = state
                .comments
                .values()
                .filter(|c| c.post_id == post_id)
                .count() as i64;
            if let Some(post) = state.posts.get_mut(&post_id) {
                post.comment_count = total as i32;
            }
            total
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                name: new.name,
                email: new.email,
                bio: new.bio,
                phone: new.phone,
                birth_date: new.birth_date,
                location: new.location,
                avatar_path: None,
                role: new.role,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            s.passwords.insert(id, new.password_hash);
            Ok(user)
        }

        async fn find_credentials(&self, email: &str) -> RepoResult<Option<Credentials>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.email == email).map(|u| Credentials {
                user: u.clone(),
                password_hash: s.passwords.get(&u.id).cloned().unwrap_or_default(),
            }))
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.email == upd.email && u.id != id) {
                return Err(RepoError::Conflict);
            }
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.name = upd.name;
            user.email = upd.email;
            user.bio = upd.bio;
            let updated = user.clone();
            if let Some(hash) = upd.password_hash {
                s.passwords.insert(id, hash);
            }
            Ok(updated)
        }

        async fn set_avatar(&self, id: Id, path: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if let Some(user) = s.users.get_mut(&id) {
                user.avatar_path = Some(path.to_string());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                user_id: new.user_id,
                content: new.content,
                image_path: new.image_path,
                like_count: 0,
                comment_count: 0,
                active: true,
                created_at: Utc::now(),
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn feed(&self, limit: i64) -> RepoResult<Vec<FeedPost>> {
            let s = self.state.read().unwrap();
            let mut posts: Vec<_> = s.posts.values().filter(|p| p.active).cloned().collect();
            // id breaks same-timestamp ties so ordering stays stable
            posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            posts.truncate(limit.max(0) as usize);

            let mut feed = Vec::with_capacity(posts.len());
            for post in posts {
                let Some(author) = s.users.get(&post.user_id) else {
                    continue;
                };
                let mut comments: Vec<_> = s
                    .comments
                    .values()
                    .filter(|c| c.post_id == post.id && c.active)
                    .cloned()
                    .collect();
                comments.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
                comments.truncate(3);
                let previews = comments
                    .into_iter()
                    .filter_map(|c| {
                        let commenter = s.users.get(&c.user_id)?;
                        Some(CommentPreview {
                            id: c.id,
                            user_id: c.user_id,
                            user_name: commenter.name.clone(),
                            user_avatar: commenter.avatar_path.clone(),
                            content: c.content,
                            created_at: c.created_at,
                        })
                    })
                    .collect();
                feed.push(FeedPost {
                    id: post.id,
                    user_id: post.user_id,
                    user_name: author.name.clone(),
                    user_email: author.email.clone(),
                    user_avatar: author.avatar_path.clone(),
                    content: post.content,
                    image_path: post.image_path,
                    like_count: post.like_count,
                    comment_count: post.comment_count,
                    created_at: post.created_at,
                    comments: previews,
                });
            }
            Ok(feed)
        }

        async fn posts_by_user(&self, user_id: Id, limit: i64) -> RepoResult<Vec<PostSummary>> {
            let s = self.state.read().unwrap();
            let mut posts: Vec<_> = s
                .posts
                .values()
                .filter(|p| p.user_id == user_id && p.active)
                .cloned()
                .collect();
            posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            posts.truncate(limit.max(0) as usize);
            Ok(posts
                .into_iter()
                .map(|p| PostSummary {
                    id: p.id,
                    content: p.content,
                    image_path: p.image_path,
                    like_count: p.like_count,
                    comment_count: p.comment_count,
                    created_at: p.created_at,
                })
                .collect())
        }

        async fn count_by_user(&self, user_id: Id) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.posts
                .values()
                .filter(|p| p.user_id == user_id && p.active)
                .count() as i64)
        }

        async fn soft_delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.active = false;
            Ok(())
        }

        async fn purge_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.posts.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            s.comments.retain(|_, c| c.post_id != id);
            s.likes.retain(|(post_id, _), _| *post_id != id);
            Ok(())
        }

        async fn find_by_content(&self, pattern: &str) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let needle = pattern.to_lowercase();
            let mut posts: Vec<_> = s
                .posts
                .values()
                .filter(|p| p.content.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            Ok(posts)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn add_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&new.post_id) || !s.users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                post_id: new.post_id,
                user_id: new.user_id,
                content: new.content,
                active: true,
                created_at: Utc::now(),
            };
            s.comments.insert(id, comment.clone());
            Self::recount_comments(&mut s, new.post_id);
            Ok(comment)
        }

        async fn recent_for_post(&self, post_id: Id, limit: i64) -> RepoResult<Vec<CommentPreview>> {
            let s = self.state.read().unwrap();
            let mut comments: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id && c.active)
                .cloned()
                .collect();
            comments.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
            comments.truncate(limit.max(0) as usize);
            Ok(comments
                .into_iter()
                .filter_map(|c| {
                    let commenter = s.users.get(&c.user_id)?;
                    Some(CommentPreview {
                        id: c.id,
                        user_id: c.user_id,
                        user_name: commenter.name.clone(),
                        user_avatar: commenter.avatar_path.clone(),
                        content: c.content,
                        created_at: c.created_at,
                    })
                })
                .collect())
        }
    }

    #[async_trait]
    impl LikeRepo for InMemRepo {
        async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&post_id) || !s.users.contains_key(&user_id) {
                return Err(RepoError::NotFound);
            }
            let key = (post_id, user_id);
            let action = if s.likes.remove(&key).is_some() {
                LikeAction::Unliked
            } else {
                s.likes.insert(key, Utc::now());
                LikeAction::Liked
            };
            let total_likes = Self::recount_likes(&mut s, post_id);
            Ok(LikeToggle {
                post_id,
                user_id,
                action,
                total_likes,
            })
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const USER_COLUMNS: &str =
        "id, name, email, bio, phone, birth_date, location, avatar_path, role, created_at";
    const POST_COLUMNS: &str =
        "id, user_id, content, image_path, like_count, comment_count, active, created_at";

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    // Unique violation is the authoritative conflict signal (closes the
    // check-then-insert race); FK violation means the referenced row is gone.
    fn map_db_err(err: sqlx::Error) -> RepoError {
        if let sqlx::Error::Database(ref db) = err {
            match db.code().as_deref() {
                Some("23505") => return RepoError::Conflict,
                Some("23503") => return RepoError::NotFound,
                _ => {}
            }
        }
        RepoError::Database(err)
    }

    #[derive(sqlx::FromRow)]
    struct FeedPostRow {
        id: Id,
        user_id: Id,
        user_name: String,
        user_email: String,
        user_avatar: Option<String>,
        content: String,
        image_path: Option<String>,
        like_count: i32,
        comment_count: i32,
        created_at: chrono::DateTime<chrono::Utc>,
    }

    impl From<FeedPostRow> for FeedPost {
        fn from(r: FeedPostRow) -> Self {
            FeedPost {
                id: r.id,
                user_id: r.user_id,
                user_name: r.user_name,
                user_email: r.user_email,
                user_avatar: r.user_avatar,
                content: r.content,
                image_path: r.image_path,
                like_count: r.like_count,
                comment_count: r.comment_count,
                created_at: r.created_at,
                comments: Vec::new(),
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct CredentialsRow {
        id: Id,
        name: String,
        email: String,
        bio: Option<String>,
        phone: Option<String>,
        birth_date: Option<chrono::NaiveDate>,
        location: Option<String>,
        avatar_path: Option<String>,
        role: String,
        created_at: chrono::DateTime<chrono::Utc>,
        password_hash: String,
    }

    impl From<CredentialsRow> for Credentials {
        fn from(r: CredentialsRow) -> Self {
            Credentials {
                user: User {
                    id: r.id,
                    name: r.name,
                    email: r.email,
                    bio: r.bio,
                    phone: r.phone,
                    birth_date: r.birth_date,
                    location: r.location,
                    avatar_path: r.avatar_path,
                    role: r.role,
                    created_at: r.created_at,
                },
                password_hash: r.password_hash,
            }
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let user = sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users (name, email, password_hash, bio, phone, birth_date, location, role) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {USER_COLUMNS}"
            ))
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.bio)
            .bind(&new.phone)
            .bind(new.birth_date)
            .bind(&new.location)
            .bind(&new.role)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(user)
        }

        async fn find_credentials(&self, email: &str) -> RepoResult<Option<Credentials>> {
            let row = sqlx::query_as::<_, CredentialsRow>(&format!(
                "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(row.map(Credentials::from))
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
            // Advisory pre-check for the common case; the unique index still
            // backs the race window (mapped by map_db_err below).
            let taken = sqlx::query_scalar::<_, Id>(
                "SELECT id FROM users WHERE email = $1 AND id <> $2",
            )
            .bind(&upd.email)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
            if taken.is_some() {
                return Err(RepoError::Conflict);
            }

            sqlx::query_as::<_, User>(&format!(
                "UPDATE users SET name = $2, email = $3, bio = $4, \
                 password_hash = COALESCE($5, password_hash) \
                 WHERE id = $1 RETURNING {USER_COLUMNS}"
            ))
            .bind(id)
            .bind(&upd.name)
            .bind(&upd.email)
            .bind(&upd.bio)
            .bind(&upd.password_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn set_avatar(&self, id: Id, path: &str) -> RepoResult<()> {
            sqlx::query("UPDATE users SET avatar_path = $2 WHERE id = $1")
                .bind(id)
                .bind(path)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let post = sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (user_id, content, image_path) VALUES ($1,$2,$3) \
                 RETURNING {POST_COLUMNS}"
            ))
            .bind(new.user_id)
            .bind(&new.content)
            .bind(&new.image_path)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn feed(&self, limit: i64) -> RepoResult<Vec<FeedPost>> {
            let mut feed: Vec<FeedPost> = sqlx::query_as::<_, FeedPostRow>(
                "SELECT p.id, p.user_id, u.name AS user_name, u.email AS user_email, \
                        u.avatar_path AS user_avatar, p.content, p.image_path, \
                        p.like_count, p.comment_count, p.created_at \
                 FROM posts p JOIN users u ON u.id = p.user_id \
                 WHERE p.active ORDER BY p.created_at DESC, p.id DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?
            .into_iter()
            .map(FeedPost::from)
            .collect();

            // Deliberate bounded fan-out: one capped query per post keeps the
            // preview limit explicit instead of burying it in a window join.
            for post in &mut feed {
                post.comments = self.recent_for_post(post.id, 3).await?;
            }
            Ok(feed)
        }

        async fn posts_by_user(&self, user_id: Id, limit: i64) -> RepoResult<Vec<PostSummary>> {
            let posts = sqlx::query_as::<_, PostSummary>(
                "SELECT id, content, image_path, like_count, comment_count, created_at \
                 FROM posts WHERE user_id = $1 AND active \
                 ORDER BY created_at DESC, id DESC LIMIT $2",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(posts)
        }

        async fn count_by_user(&self, user_id: Id) -> RepoResult<i64> {
            let count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM posts WHERE user_id = $1 AND active",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(count)
        }

        async fn soft_delete_post(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE posts SET active = FALSE WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn purge_post(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_db_err)?;
            sqlx::query("DELETE FROM comments WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            sqlx::query("DELETE FROM likes WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                // dropping the transaction rolls the cascade back
                return Err(RepoError::NotFound);
            }
            tx.commit().await.map_err(map_db_err)?;
            Ok(())
        }

        async fn find_by_content(&self, pattern: &str) -> RepoResult<Vec<Post>> {
            let posts = sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts \
                 WHERE content ILIKE '%' || $1 || '%' \
                 ORDER BY created_at DESC, id DESC"
            ))
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(posts)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn add_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(map_db_err)?;
            let comment = sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (post_id, user_id, content) VALUES ($1,$2,$3) \
                 RETURNING id, post_id, user_id, content, active, created_at",
            )
            .bind(new.post_id)
            .bind(new.user_id)
            .bind(&new.content)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?;
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM comments WHERE post_id = $1",
            )
            .bind(new.post_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?;
            sqlx::query("UPDATE posts SET comment_count = $2 WHERE id = $1")
                .bind(new.post_id)
                .bind(total as i32)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            tx.commit().await.map_err(map_db_err)?;
            Ok(comment)
        }

        async fn recent_for_post(&self, post_id: Id, limit: i64) -> RepoResult<Vec<CommentPreview>> {
            let comments = sqlx::query_as::<_, CommentPreview>(
                "SELECT c.id, c.user_id, u.name AS user_name, \
                        u.avatar_path AS user_avatar, c.content, c.created_at \
                 FROM comments c JOIN users u ON u.id = c.user_id \
                 WHERE c.post_id = $1 AND c.active \
                 ORDER BY c.created_at ASC, c.id ASC LIMIT $2",
            )
            .bind(post_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(comments)
        }
    }

    #[async_trait]
    impl LikeRepo for PgRepo {
        async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle> {
            let mut tx = self.pool.begin().await.map_err(map_db_err)?;
            let existing = sqlx::query_scalar::<_, i32>(
                "SELECT 1 FROM likes WHERE post_id = $1 AND user_id = $2",
            )
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_err)?;

            let action = if existing.is_some() {
                sqlx::query("DELETE FROM likes WHERE post_id = $1 AND user_id = $2")
                    .bind(post_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_db_err)?;
                LikeAction::Unliked
            } else {
                sqlx::query("INSERT INTO likes (post_id, user_id) VALUES ($1, $2)")
                    .bind(post_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_db_err)?;
                LikeAction::Liked
            };

            // Full recount, never an in-place increment, so the counter
            // self-heals any drift.
            let total_likes = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM likes WHERE post_id = $1",
            )
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?;
            let res = sqlx::query("UPDATE posts SET like_count = $2 WHERE id = $1")
                .bind(post_id)
                .bind(total_likes as i32)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tx.commit().await.map_err(map_db_err)?;

            Ok(LikeToggle {
                post_id,
                user_id,
                action,
                total_likes,
            })
        }
    }
}
