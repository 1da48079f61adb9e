use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use futures_util::TryStreamExt as _;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::auth::{self, PasswordError};
use crate::error::{success, ApiError, Envelope};
use crate::models::*;
// the sub-traits must be in scope for their methods to resolve on dyn Repo
use crate::repo::{CommentRepo as _, LikeRepo as _, PostRepo as _, UserRepo as _};
use crate::repo::{Repo, RepoError};
use crate::storage::{UploadKind, UploadStore};

const FEED_LIMIT: i64 = 20;
const PROFILE_POST_LIMIT: i64 = 10;
const TEXT_FIELD_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub uploads: Arc<dyn UploadStore>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    // framework-level extractor failures must come back in the envelope
    // too, not as bare 4xx bodies
    cfg.app_data(json_config())
        .app_data(path_config())
        .app_data(query_config())
        .service(
            web::scope("/api")
                .service(web::resource("").route(web::get().to(api_info)))
                .service(web::resource("/auth/cadastro").route(web::post().to(signup)))
                .service(web::resource("/auth/login").route(web::post().to(login)))
                .service(web::resource("/users/update").route(web::put().to(update_user)))
                .service(
                    web::resource("/users/upload-avatar").route(web::post().to(upload_avatar)),
                )
                .service(web::resource("/users/{id}").route(web::get().to(user_profile)))
                .service(web::resource("/posts/postar").route(web::post().to(create_post)))
                .service(web::resource("/posts/feed").route(web::get().to(feed)))
                .service(web::resource("/posts/curtir").route(web::post().to(toggle_like)))
                .service(web::resource("/posts/comentar").route(web::post().to(add_comment)))
                .service(
                    web::resource("/posts/deletar/{id}").route(web::delete().to(delete_post)),
                )
                .service(web::resource("/admin/posts/{id}").route(web::delete().to(purge_post))),
        )
        .default_service(web::route().to(not_found));
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _| ApiError::Validation(format!("invalid request body: {err}")).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|_, _| ApiError::Validation("invalid path parameter".into()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|_, _| ApiError::Validation("invalid query parameter".into()).into())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_id(value: Option<&String>) -> Option<Id> {
    value?.trim().parse().ok()
}

fn user_not_found(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::NotFound("User not found".into()),
        other => other.into(),
    }
}

fn post_not_found(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::NotFound("Post not found".into()),
        other => other.into(),
    }
}

// ---------------- auth -----------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/auth/cadastro",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Envelope with {id, name, email}, or success=false on validation/conflict")
    )
)]
pub async fn signup(
    data: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let (name, email, password) = match (
        non_empty(req.name),
        non_empty(req.email),
        non_empty(req.password),
    ) {
        (Some(n), Some(e), Some(p)) => (n, e, p),
        _ => {
            return Err(ApiError::Validation(
                "Name, email and password are required".into(),
            ))
        }
    };

    // friendly pre-check; the unique index still decides under concurrency
    if data.repo.find_credentials(&email).await?.is_some() {
        return Err(ApiError::Conflict("This email is already registered".into()));
    }

    let password_hash = auth::hash_password(&password).map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;
    let role = auth::signup_role(&email).to_string();

    let user = data
        .repo
        .create_user(NewUser {
            name,
            email,
            password_hash,
            bio: non_empty(req.bio),
            phone: non_empty(req.phone),
            birth_date: req.birth_date,
            location: non_empty(req.location),
            role,
        })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::Conflict("This email is already registered".into()),
            other => other.into(),
        })?;

    log::info!("user registered: id={} email={}", user.id, user.email);
    Ok(success(
        "User registered successfully!",
        json!({ "id": user.id, "name": user.name, "email": user.email }),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Envelope with {user, redirect_to}, or success=false on bad credentials")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let (email, password) = match (non_empty(req.email), non_empty(req.password)) {
        (Some(e), Some(p)) => (e, p),
        _ => return Err(ApiError::Validation("Email and password are required".into())),
    };

    let Some(creds) = data.repo.find_credentials(&email).await? else {
        auth::burn_verification(&password);
        return Err(ApiError::Auth("Incorrect email or password".into()));
    };
    match auth::verify_password(&password, &creds.password_hash) {
        Ok(()) => {}
        Err(PasswordError::Mismatch) => {
            return Err(ApiError::Auth("Incorrect email or password".into()))
        }
        Err(e) => {
            log::error!("password verification failed for user {}: {e}", creds.user.id);
            return Err(ApiError::Internal);
        }
    }

    log::info!("login: id={} email={}", creds.user.id, creds.user.email);
    Ok(success(
        "Login successful!",
        json!({ "user": creds.user, "redirect_to": "/feed" }),
    ))
}

// ---------------- users ----------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub user_id: Option<Id>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/users/update",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Envelope with the updated user summary")
    )
)]
pub async fn update_user(
    data: web::Data<AppState>,
    payload: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let (Some(user_id), Some(name), Some(email)) =
        (req.user_id, non_empty(req.name), non_empty(req.email))
    else {
        return Err(ApiError::Validation(
            "User id, name and email are required".into(),
        ));
    };

    let password_hash = match non_empty(req.password) {
        Some(p) => Some(auth::hash_password(&p).map_err(|e| {
            log::error!("password hashing failed: {e}");
            ApiError::Internal
        })?),
        None => None,
    };

    let user = data
        .repo
        .update_user(
            user_id,
            UpdateUser {
                name,
                email,
                password_hash,
                bio: non_empty(req.bio),
            },
        )
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound("User not found".into()),
            RepoError::Conflict => {
                ApiError::Conflict("This email is already in use by another user".into())
            }
            other => other.into(),
        })?;

    Ok(success(
        "Profile updated successfully!",
        json!({ "id": user.id, "name": user.name, "email": user.email, "bio": user.bio }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/users/upload-avatar",
    responses(
        (status = 200, description = "Envelope with {avatar_path}; multipart fields: user_id, avatar")
    )
)]
pub async fn upload_avatar(
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let (fields, file) =
        read_multipart(payload, "avatar", UploadKind::Avatar.max_bytes()).await?;
    let (Some(user_id), Some(file)) = (parse_id(fields.get("user_id")), file) else {
        return Err(ApiError::Validation("User and file are required".into()));
    };

    let avatar_path = data
        .uploads
        .save(UploadKind::Avatar, &file.name, &file.bytes)
        .await?;
    data.repo.set_avatar(user_id, &avatar_path).await?;

    log::info!("avatar updated for user {user_id}");
    Ok(success(
        "Profile photo updated successfully!",
        json!({ "avatar_path": avatar_path }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Envelope with {user, posts, stats.total_posts}")
    )
)]
pub async fn user_profile(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let user = data.repo.get_user(id).await.map_err(user_not_found)?;
    let posts = data.repo.posts_by_user(id, PROFILE_POST_LIMIT).await?;
    let total_posts = data.repo.count_by_user(id).await?;
    Ok(success(
        "Profile loaded",
        json!({ "user": user, "posts": posts, "stats": { "total_posts": total_posts } }),
    ))
}

// ---------------- posts ----------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/posts/postar",
    responses(
        (status = 200, description = "Envelope with the created post; multipart fields: user_id, content?, photo?", body = Post)
    )
)]
pub async fn create_post(
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let (fields, photo) =
        read_multipart(payload, "photo", UploadKind::PostImage.max_bytes()).await?;
    let user_id = parse_id(fields.get("user_id"));
    let content = fields
        .get("content")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let Some(user_id) = user_id else {
        return Err(ApiError::Validation(
            "User and content (or image) are required".into(),
        ));
    };
    // a post carries text, an image, or both; never neither
    if content.is_empty() && photo.is_none() {
        return Err(ApiError::Validation(
            "User and content (or image) are required".into(),
        ));
    }

    let author = data.repo.get_user(user_id).await.map_err(user_not_found)?;
    let image_path = match photo {
        Some(file) => Some(
            data.uploads
                .save(UploadKind::PostImage, &file.name, &file.bytes)
                .await?,
        ),
        None => None,
    };

    let post = data
        .repo
        .create_post(NewPost {
            user_id: author.id,
            content,
            image_path,
        })
        .await?;

    log::info!("post created: id={} author={}", post.id, post.user_id);
    Ok(success("Post created successfully!", post))
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/posts/feed",
    params(("limit" = Option<i64>, Query, description = "Page size, capped at 20")),
    responses(
        (status = 200, description = "Envelope with the feed", body = [FeedPost])
    )
)]
pub async fn feed(
    data: web::Data<AppState>,
    query: web::Query<FeedParams>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(FEED_LIMIT).clamp(1, FEED_LIMIT);
    let feed = data.repo.feed(limit).await?;
    Ok(success("Feed loaded", feed))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LikeRequest {
    pub post_id: Option<Id>,
    pub user_id: Option<Id>,
}

#[utoipa::path(
    post,
    path = "/api/posts/curtir",
    request_body = LikeRequest,
    responses(
        (status = 200, description = "Envelope with the toggle outcome", body = LikeToggle)
    )
)]
pub async fn toggle_like(
    data: web::Data<AppState>,
    payload: web::Json<LikeRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let (Some(post_id), Some(user_id)) = (req.post_id, req.user_id) else {
        return Err(ApiError::Validation("Post and user are required".into()));
    };

    let post = data.repo.get_post(post_id).await.map_err(post_not_found)?;
    if !post.active {
        return Err(ApiError::NotFound("Post not found".into()));
    }
    data.repo.get_user(user_id).await.map_err(user_not_found)?;

    let toggle = data.repo.toggle_like(post_id, user_id).await?;
    let message = match toggle.action {
        LikeAction::Liked => "Post liked successfully!",
        LikeAction::Unliked => "Post unliked successfully!",
    };
    Ok(success(message, toggle))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentRequest {
    pub post_id: Option<Id>,
    pub user_id: Option<Id>,
    pub content: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/posts/comentar",
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Envelope with the created comment", body = Comment)
    )
)]
pub async fn add_comment(
    data: web::Data<AppState>,
    payload: web::Json<CommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let (Some(post_id), Some(user_id), Some(content)) =
        (req.post_id, req.user_id, non_empty(req.content))
    else {
        return Err(ApiError::Validation("All fields are required".into()));
    };

    let post = data.repo.get_post(post_id).await.map_err(post_not_found)?;
    if !post.active {
        return Err(ApiError::NotFound("Post not found".into()));
    }
    data.repo.get_user(user_id).await.map_err(user_not_found)?;

    let comment = data
        .repo
        .add_comment(NewComment {
            post_id,
            user_id,
            content,
        })
        .await?;

    log::info!("comment added: id={} post={}", comment.id, comment.post_id);
    Ok(success("Comment added successfully!", comment))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteRequest {
    pub user_id: Option<Id>,
}

#[utoipa::path(
    delete,
    path = "/api/posts/deletar/{id}",
    params(("id" = Id, Path, description = "Post id")),
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Envelope with {post_id}; success=false without owner/admin rights")
    )
)]
pub async fn delete_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<DeleteRequest>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let Some(user_id) = payload.user_id else {
        return Err(ApiError::Validation("Post id and user are required".into()));
    };

    let post = data.repo.get_post(post_id).await.map_err(post_not_found)?;
    let user = data.repo.get_user(user_id).await.map_err(user_not_found)?;
    if !auth::can_delete_post(&post, &user) {
        return Err(ApiError::Auth(
            "You do not have permission to delete this post".into(),
        ));
    }

    // public deletes keep the row and flip the flag; rows only disappear
    // through the purge path below
    data.repo.soft_delete_post(post_id).await?;
    log::info!("post {post_id} deleted by user {user_id}");
    Ok(success("Post deleted successfully!", json!({ "post_id": post_id })))
}

pub async fn purge_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<DeleteRequest>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let Some(user_id) = payload.user_id else {
        return Err(ApiError::Validation("Post id and user are required".into()));
    };

    let user = data.repo.get_user(user_id).await.map_err(user_not_found)?;
    if !auth::is_admin(&user) {
        return Err(ApiError::Auth("Administrator access required".into()));
    }

    data.repo.purge_post(post_id).await.map_err(post_not_found)?;
    log::info!("post {post_id} purged by admin {user_id}");
    Ok(success("Post purged successfully!", json!({ "post_id": post_id })))
}

// ---------------- service info & fallback ----------------------------------

pub async fn api_info() -> HttpResponse {
    success(
        "networkup API is running",
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "POST /api/auth/cadastro": "Register a user",
                "POST /api/auth/login": "Log in",
                "PUT /api/users/update": "Update a profile",
                "POST /api/users/upload-avatar": "Upload a profile photo",
                "GET /api/users/{id}": "Fetch a user profile",
                "POST /api/posts/postar": "Create a post",
                "GET /api/posts/feed": "Fetch the feed",
                "POST /api/posts/curtir": "Toggle a like",
                "POST /api/posts/comentar": "Comment on a post",
                "DELETE /api/posts/deletar/{id}": "Delete a post"
            }
        }),
    )
}

// The only place a non-200 status escapes: unmatched routes.
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(Envelope::<serde_json::Value> {
        success: false,
        message: "Endpoint not found".into(),
        data: None,
    })
}

// ---------------- multipart helper ------------------------------------------

struct FilePart {
    name: String,
    bytes: Vec<u8>,
}

/// Drain a multipart payload into text fields plus at most one file (taken
/// from `file_field`). The file is capped at `cap` bytes while streaming so
/// an oversized upload is rejected before it is buffered whole.
async fn read_multipart(
    mut payload: Multipart,
    file_field: &str,
    cap: usize,
) -> Result<(HashMap<String, String>, Option<FilePart>), ApiError> {
    let mut fields = HashMap::new();
    let mut file = None;

    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::warn!("multipart parse error: {e}");
        ApiError::Validation("malformed multipart payload".into())
    })? {
        let Some(name) = field.content_disposition().get_name().map(str::to_string) else {
            continue;
        };

        if name == file_field {
            let file_name = field
                .content_disposition()
                .get_filename()
                .unwrap_or("upload")
                .to_string();
            let mut bytes: Vec<u8> = Vec::new();
            let mut stream = field;
            while let Some(chunk) = stream.try_next().await.map_err(|e| {
                log::error!("multipart read error: {e}");
                ApiError::Internal
            })? {
                if bytes.len() + chunk.len() > cap {
                    return Err(ApiError::PayloadTooLarge(cap));
                }
                bytes.extend_from_slice(&chunk);
            }
            file = Some(FilePart {
                name: file_name,
                bytes,
            });
        } else {
            let mut buf: Vec<u8> = Vec::new();
            let mut stream = field;
            while let Some(chunk) = stream.try_next().await.map_err(|e| {
                log::error!("multipart read error: {e}");
                ApiError::Internal
            })? {
                if buf.len() + chunk.len() > TEXT_FIELD_LIMIT {
                    return Err(ApiError::Validation(format!("field '{name}' is too long")));
                }
                buf.extend_from_slice(&chunk);
            }
            let value = String::from_utf8(buf)
                .map_err(|_| ApiError::Validation(format!("field '{name}' must be UTF-8")))?;
            fields.insert(name, value);
        }
    }

    Ok((fields, file))
}
