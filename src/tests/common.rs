//! Fixtures shared by the service and router tests.

use axum::body::{to_bytes, Body};
use axum::http::Response;
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use inkpad::config::db::DB;
use inkpad::config::AppConfig;
use inkpad::model::article::{Article, ArticleForm};
use inkpad::{create_app, AppState};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "inkpad-test-boundary";

/// A fresh in-memory database with all migrations applied.
/// A single connection keeps every query on the same memory database.
pub async fn setup_db() -> DB {
    let db = DB::new("sqlite::memory:", 1).await.unwrap();
    db.migrate().await.unwrap();
    db
}

pub struct TestApp {
    pub app: Router,
    pub db: Arc<DB>,
    pub uploads: TempDir,
}

pub async fn setup_app() -> TestApp {
    setup_app_with(|_| {}).await
}

/// Like `setup_app`, with a hook to adjust the config before the router is built.
pub async fn setup_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let db = setup_db().await;
    let uploads = tempfile::tempdir().unwrap();

    let mut config = AppConfig::from_env().unwrap();
    config.upload.base_path = uploads.path().to_string_lossy().to_string();
    config.log.log_requests = false;
    configure(&mut config);

    let state = AppState::from_parts(config, db);
    let db = state.db.clone();
    let app = create_app(state).await.unwrap();

    TestApp { app, db, uploads }
}

pub fn token_of(username: &str) -> String {
    format!("{username}-token")
}

pub async fn create_user(db: &DB, username: &str, is_admin: bool) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (username, token, is_admin, created_at) VALUES (?, ?, ?, 0) RETURNING id",
    )
    .bind(username)
    .bind(token_of(username))
    .bind(is_admin)
    .fetch_one(&db.pool)
    .await
    .unwrap()
}

pub async fn create_article(
    db: &DB,
    author_id: i64,
    title: &str,
    body: &str,
    column_id: Option<i64>,
    tags: &[&str],
) -> i64 {
    let form = ArticleForm {
        title: title.to_string(),
        body: body.to_string(),
        column_id,
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    };
    Article::create(db, author_id, &form, None).await.unwrap().id
}

pub async fn set_created(db: &DB, id: i64, created: i64) {
    sqlx::query("UPDATE articles SET created = ? WHERE id = ?")
        .bind(created)
        .bind(id)
        .execute(&db.pool)
        .await
        .unwrap();
}

pub async fn set_views(db: &DB, id: i64, views: i64) {
    sqlx::query("UPDATE articles SET total_views = ? WHERE id = ?")
        .bind(views)
        .bind(id)
        .execute(&db.pool)
        .await
        .unwrap();
}

pub async fn add_comment(db: &DB, article_id: i64, user_id: i64, body: &str, created: i64) {
    sqlx::query("INSERT INTO comments (article_id, user_id, body, created) VALUES (?, ?, ?, ?)")
        .bind(article_id)
        .bind(user_id)
        .bind(body)
        .bind(created)
        .execute(&db.pool)
        .await
        .unwrap();
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 90, 160])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

/// Encodes text fields and an optional `(field, filename, content type, bytes)` file part.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    if let Some((name, filename, content_type, bytes)) = file {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
