use crate::models::{
    Comment, CommentPreview, FeedPost, LikeAction, LikeToggle, Post, PostSummary, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::signup,
        crate::routes::login,
        crate::routes::update_user,
        crate::routes::upload_avatar,
        crate::routes::user_profile,
        crate::routes::create_post,
        crate::routes::feed,
        crate::routes::toggle_like,
        crate::routes::add_comment,
        crate::routes::delete_post,
    ),
    components(schemas(
        User, Post, Comment, CommentPreview, FeedPost, PostSummary,
        LikeAction, LikeToggle,
        crate::routes::SignupRequest, crate::routes::LoginRequest,
        crate::routes::UpdateUserRequest, crate::routes::LikeRequest,
        crate::routes::CommentRequest, crate::routes::DeleteRequest
    )),
    tags(
        (name = "auth", description = "Signup and login"),
        (name = "users", description = "Profiles and avatars"),
        (name = "posts", description = "Posts, likes and comments"),
    )
)]
pub struct ApiDoc;
