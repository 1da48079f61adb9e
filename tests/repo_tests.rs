#![cfg(feature = "inmem-store")]

use networkup::models::{LikeAction, NewComment, NewPost, NewUser, UpdateUser};
use networkup::repo::inmem::InMemRepo;
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use networkup::repo::{CommentRepo, LikeRepo, PostRepo, RepoError, UserRepo};

fn repo() -> InMemRepo {
    InMemRepo::new()
}

fn new_user(name: &str, email: &str) -> NewUser {
    NewUser {
        name: name.into(),
        email: email.into(),
        password_hash: "$argon2id$stub".into(),
        bio: None,
        phone: None,
        birth_date: None,
        location: None,
        role: "user".into(),
    }
}

fn new_post(user_id: i64, content: &str) -> NewPost {
    NewPost {
        user_id,
        content: content.into(),
        image_path: None,
    }
}

#[tokio::test]
async fn signup_is_unique_per_email() {
    let r = repo();

    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    assert_eq!(ana.id, 1);
    assert_eq!(ana.role, "user");

    // exact same email → conflict
    let err = r
        .create_user(new_user("Other Ana", "ana@x.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // lookup keeps the stored hash internal to Credentials
    let creds = r.find_credentials("ana@x.com").await.unwrap().unwrap();
    assert_eq!(creds.user.id, ana.id);
    assert_eq!(creds.password_hash, "$argon2id$stub");
    assert!(r.find_credentials("nobody@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn update_user_guards_email_and_id() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let bia = r.create_user(new_user("Bia", "bia@x.com")).await.unwrap();

    // taking another user's email → conflict
    let err = r
        .update_user(
            bia.id,
            UpdateUser {
                name: "Bia".into(),
                email: "ana@x.com".into(),
                password_hash: None,
                bio: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // keeping your own email is not a collision
    let updated = r
        .update_user(
            ana.id,
            UpdateUser {
                name: "Ana Clara".into(),
                email: "ana@x.com".into(),
                password_hash: Some("$argon2id$rotated".into()),
                bio: Some("hello".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Ana Clara");
    assert_eq!(updated.bio.as_deref(), Some("hello"));

    // the password rotation landed
    let creds = r.find_credentials("ana@x.com").await.unwrap().unwrap();
    assert_eq!(creds.password_hash, "$argon2id$rotated");

    let err = r
        .update_user(
            999,
            UpdateUser {
                name: "Ghost".into(),
                email: "ghost@x.com".into(),
                password_hash: None,
                bio: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn set_avatar_is_an_unchecked_overwrite() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();

    // unknown id is a no-op, not an error
    r.set_avatar(999, "/uploads/profiles/ghost.png").await.unwrap();

    r.set_avatar(ana.id, "/uploads/profiles/ana.png").await.unwrap();
    let reloaded = r.get_user(ana.id).await.unwrap();
    assert_eq!(
        reloaded.avatar_path.as_deref(),
        Some("/uploads/profiles/ana.png")
    );
}

#[tokio::test]
async fn post_creation_requires_an_existing_author() {
    let r = repo();
    let err = r.create_post(new_post(42, "hello")).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));

    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let post = r.create_post(new_post(ana.id, "bom dia")).await.unwrap();
    assert!(post.active);
    assert_eq!(post.like_count, 0);
    assert_eq!(post.comment_count, 0);
}

#[tokio::test]
async fn double_toggle_restores_like_state() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let post = r.create_post(new_post(ana.id, "bom dia")).await.unwrap();

    let first = r.toggle_like(post.id, ana.id).await.unwrap();
    assert_eq!(first.action, LikeAction::Liked);
    assert_eq!(first.total_likes, 1);
    assert_eq!(r.get_post(post.id).await.unwrap().like_count, 1);

    let second = r.toggle_like(post.id, ana.id).await.unwrap();
    assert_eq!(second.action, LikeAction::Unliked);
    assert_eq!(second.total_likes, 0);
    assert_eq!(r.get_post(post.id).await.unwrap().like_count, 0);

    // unknown post or user → not found
    let err = r.toggle_like(999, ana.id).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn comment_counter_tracks_the_authoritative_rows() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let bia = r.create_user(new_user("Bia", "bia@x.com")).await.unwrap();
    let post = r.create_post(new_post(ana.id, "bom dia")).await.unwrap();

    for i in 0..5 {
        r.add_comment(NewComment {
            post_id: post.id,
            user_id: bia.id,
            content: format!("comment {i}"),
        })
        .await
        .unwrap();
    }
    assert_eq!(r.get_post(post.id).await.unwrap().comment_count, 5);

    // preview is capped and oldest-first
    let preview = r.recent_for_post(post.id, 3).await.unwrap();
    assert_eq!(preview.len(), 3);
    assert_eq!(preview[0].content, "comment 0");
    assert_eq!(preview[2].content, "comment 2");
    assert_eq!(preview[0].user_name, "Bia");

    let err = r
        .add_comment(NewComment {
            post_id: 999,
            user_id: bia.id,
            content: "orphan".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn soft_delete_hides_without_removing() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let post = r.create_post(new_post(ana.id, "bom dia")).await.unwrap();

    assert_eq!(r.feed(20).await.unwrap().len(), 1);
    assert_eq!(r.count_by_user(ana.id).await.unwrap(), 1);

    r.soft_delete_post(post.id).await.unwrap();
    // repeat flip is a no-op, not an error
    r.soft_delete_post(post.id).await.unwrap();

    assert!(r.feed(20).await.unwrap().is_empty());
    assert!(r.posts_by_user(ana.id, 10).await.unwrap().is_empty());
    assert_eq!(r.count_by_user(ana.id).await.unwrap(), 0);

    // the row survives, just flagged
    let hidden = r.get_post(post.id).await.unwrap();
    assert!(!hidden.active);

    let err = r.soft_delete_post(999).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn purge_cascades_comments_and_likes() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let bia = r.create_user(new_user("Bia", "bia@x.com")).await.unwrap();
    let post = r.create_post(new_post(ana.id, "bom dia")).await.unwrap();

    r.toggle_like(post.id, bia.id).await.unwrap();
    r.add_comment(NewComment {
        post_id: post.id,
        user_id: bia.id,
        content: "nice".into(),
    })
    .await
    .unwrap();

    r.purge_post(post.id).await.unwrap();

    let err = r.get_post(post.id).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
    assert!(r.recent_for_post(post.id, 3).await.unwrap().is_empty());

    let err = r.purge_post(post.id).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn feed_is_capped_and_newest_first() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    for i in 0..25 {
        r.create_post(new_post(ana.id, &format!("post {i}"))).await.unwrap();
    }

    let feed = r.feed(20).await.unwrap();
    assert_eq!(feed.len(), 20);
    // insertion order breaks same-millisecond timestamp ties
    for pair in feed.windows(2) {
        assert!(pair[0].id > pair[1].id);
    }
    assert_eq!(feed[0].content, "post 24");
    assert_eq!(feed[0].user_name, "Ana");
    assert_eq!(feed[0].user_email, "ana@x.com");
}

#[tokio::test]
async fn feed_attaches_at_most_three_comments() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let post = r.create_post(new_post(ana.id, "bom dia")).await.unwrap();
    for i in 0..5 {
        r.add_comment(NewComment {
            post_id: post.id,
            user_id: ana.id,
            content: format!("c{i}"),
        })
        .await
        .unwrap();
    }

    let feed = r.feed(20).await.unwrap();
    assert_eq!(feed[0].comments.len(), 3);
    assert_eq!(feed[0].comments[0].content, "c0");
    assert_eq!(feed[0].comment_count, 5);
}

#[tokio::test]
async fn profile_listing_is_bounded_to_ten() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    for i in 0..12 {
        r.create_post(new_post(ana.id, &format!("post {i}"))).await.unwrap();
    }

    let posts = r.posts_by_user(ana.id, 10).await.unwrap();
    assert_eq!(posts.len(), 10);
    assert_eq!(posts[0].content, "post 11");
    assert_eq!(r.count_by_user(ana.id).await.unwrap(), 12);
}

#[tokio::test]
async fn content_search_is_case_insensitive_and_includes_inactive() {
    let r = repo();
    let ana = r.create_user(new_user("Ana", "ana@x.com")).await.unwrap();
    let old = r.create_post(new_post(ana.id, "Bom Dia pessoal")).await.unwrap();
    let newer = r.create_post(new_post(ana.id, "bom dia de novo")).await.unwrap();
    r.create_post(new_post(ana.id, "boa noite")).await.unwrap();
    r.soft_delete_post(old.id).await.unwrap();

    let found = r.find_by_content("bom dia").await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].id, newer.id);
    assert_eq!(found[1].id, old.id);
}
