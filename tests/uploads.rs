#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use networkup::repo::inmem::InMemRepo;
use networkup::repo::{PostRepo, UserRepo};
use networkup::storage::DiskUploadStore;
use networkup::{config, AppState};
use serde_json::Value;
use std::sync::Arc;

// Minimal 1x1 transparent PNG
fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I', b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I',
        b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

fn build_multipart(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>, boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

async fn seed_user(repo: &InMemRepo) -> i64 {
    repo.create_user(networkup::models::NewUser {
        name: "Ana".into(),
        email: "ana@x.com".into(),
        password_hash: "$stub".into(),
        bio: None,
        phone: None,
        birth_date: None,
        location: None,
        role: "user".into(),
    })
    .await
    .unwrap()
    .id
}

#[actix_web::test]
async fn avatar_upload_persists_to_disk_and_profile() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = InMemRepo::new();
    let user_id = seed_user(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                uploads: Arc::new(DiskUploadStore::new(tmp.path())),
            }))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(
        &[("user_id", "1")],
        Some(("avatar", "me.png", &sample_png())),
        "BOUNDARYAV",
    );
    let req = test::TestRequest::post()
        .uri("/api/users/upload-avatar")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["success"], true);

    let avatar_path = v["data"]["avatar_path"].as_str().unwrap();
    assert!(avatar_path.starts_with("/uploads/profiles/profile-"));
    assert!(avatar_path.ends_with(".png"));
    // the served path is relative; the bytes landed under the store root
    let on_disk = tmp.path().join(avatar_path.trim_start_matches("/uploads/"));
    assert_eq!(std::fs::read(on_disk).unwrap(), sample_png());

    let user = repo.get_user(user_id).await.unwrap();
    assert_eq!(user.avatar_path.as_deref(), Some(avatar_path));
}

#[actix_web::test]
async fn avatar_upload_requires_user_and_file() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = InMemRepo::new();
    seed_user(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                uploads: Arc::new(DiskUploadStore::new(tmp.path())),
            }))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(&[("user_id", "1")], None, "BOUNDARYNF");
    let req = test::TestRequest::post()
        .uri("/api/users/upload-avatar")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["success"], false);
    assert!(v["message"].as_str().unwrap().contains("required"));
}

#[actix_web::test]
async fn non_image_upload_is_rejected_in_band() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = InMemRepo::new();
    seed_user(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                uploads: Arc::new(DiskUploadStore::new(tmp.path())),
            }))
            .configure(config),
    )
    .await;

    // plain text wearing a .png name
    let (ct, body) = build_multipart(
        &[("user_id", "1")],
        Some(("avatar", "fake.png", b"hello world")),
        "BOUNDARYTX",
    );
    let req = test::TestRequest::post()
        .uri("/api/users/upload-avatar")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["success"], false);
    assert!(v["message"].as_str().unwrap().contains("image"));

    // nothing was persisted to the profile
    let user = repo.get_user(1).await.unwrap();
    assert!(user.avatar_path.is_none());
}

#[actix_web::test]
async fn oversized_avatar_is_rejected_while_streaming() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = InMemRepo::new();
    seed_user(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                uploads: Arc::new(DiskUploadStore::new(tmp.path())),
            }))
            .configure(config),
    )
    .await;

    // 2 MiB avatar cap: pad a real PNG header past the limit
    let mut oversized = sample_png();
    oversized.resize(2 * 1024 * 1024 + 1, 0);
    let (ct, body) = build_multipart(
        &[("user_id", "1")],
        Some(("avatar", "big.png", &oversized)),
        "BOUNDARYBG",
    );
    let req = test::TestRequest::post()
        .uri("/api/users/upload-avatar")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["success"], false);
    assert!(v["message"].as_str().unwrap().contains("exceeds"));
}

#[actix_web::test]
async fn post_with_photo_stores_under_posts_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = InMemRepo::new();
    seed_user(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                uploads: Arc::new(DiskUploadStore::new(tmp.path())),
            }))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(
        &[("user_id", "1")],
        Some(("photo", "sunset.png", &sample_png())),
        "BOUNDARYPH",
    );
    let req = test::TestRequest::post()
        .uri("/api/posts/postar")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["success"], true);

    // image-only posts are valid; content stays empty
    assert_eq!(v["data"]["content"], "");
    let image_path = v["data"]["image_path"].as_str().unwrap();
    assert!(image_path.starts_with("/uploads/posts/post-"));

    let post = repo.get_post(v["data"]["id"].as_i64().unwrap()).await.unwrap();
    assert_eq!(post.image_path.as_deref(), Some(image_path));
}
