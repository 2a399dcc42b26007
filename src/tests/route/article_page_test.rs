#[cfg(test)]
mod tests {
    use crate::tests::common::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use inkpad::model::article::Article;
    use tower::ServiceExt;

    fn form_request(uri: &str, username: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(username) = username {
            builder = builder.header(header::COOKIE, format!("token={}", token_of(username)));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn location(response: &axum::response::Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_root_redirects_to_list() {
        let t = setup_app().await;
        let response = t.app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/article/list");
    }

    #[tokio::test]
    async fn test_list_page_renders_articles() {
        let t = setup_app().await;
        let alice = create_user(&t.db, "alice", false).await;
        create_article(&t.db, alice, "Hello <world>", "x", None, &["greeting"]).await;

        let response = t.app.oneshot(get("/article/list?tag=greeting")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = body_string(response).await;
        assert!(html.contains("Hello &lt;world&gt;"));
        assert!(html.contains("Page 1 of 1"));
    }

    #[tokio::test]
    async fn test_avatar_links_follow_configured_upload_url() {
        let t = setup_app_with(|config| config.upload.base_url = "/media".to_string()).await;
        let alice = create_user(&t.db, "alice", false).await;
        let id = create_article(&t.db, alice, "Pictured", "x", None, &[]).await;
        sqlx::query("UPDATE articles SET avatar = 'article/cover.png' WHERE id = ?")
            .bind(id)
            .execute(&t.db.pool)
            .await
            .unwrap();
        std::fs::create_dir_all(t.uploads.path().join("article")).unwrap();
        std::fs::write(t.uploads.path().join("article/cover.png"), png_bytes(4, 4)).unwrap();

        for uri in ["/article/list".to_string(), format!("/article/detail/{id}")] {
            let response = t.app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let html = body_string(response).await.replace("&#x2f;", "/");
            assert!(html.contains(r#"src="/media/article/cover.png""#), "{uri}");
            assert!(!html.contains("/uploads/"), "{uri}");
        }

        let response = t.app.oneshot(get("/media/article/cover.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_detail_counts_views() {
        let t = setup_app().await;
        let alice = create_user(&t.db, "alice", false).await;
        let id = create_article(&t.db, alice, "Seen", "## Part\n\ntext", None, &[]).await;
        let uri = format!("/article/detail/{id}");

        let first = t.app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let html = body_string(first).await;
        assert!(html.contains(r#"<div class="toc">"#));
        assert!(html.contains(r#"id="part""#));

        t.app.oneshot(get(&uri)).await.unwrap();

        let article = Article::find_with_tags(&t.db, id).await.unwrap();
        assert_eq!(article.row.total_views, 2);
    }

    #[tokio::test]
    async fn test_detail_of_missing_article() {
        let t = setup_app().await;
        let response = t.app.oneshot(get("/article/detail/999")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_string(response).await.contains("404"));
    }

    #[tokio::test]
    async fn test_create_requires_login() {
        let t = setup_app().await;
        let body = multipart_body(&[("title", "t"), ("body", "b")], None);

        let response = t.app.clone().oneshot(form_request("/article/create", None, body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = t.app.oneshot(form_request("/article/create", Some("nobody"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_article() {
        let t = setup_app().await;
        create_user(&t.db, "alice", false).await;
        let body = multipart_body(
            &[
                ("title", "  Fresh  "),
                ("body", "content"),
                ("column", "none"),
                ("tags", "rust, web"),
                ("tags", "axum"),
            ],
            Some(("avatar", "", "application/octet-stream", b"")),
        );

        let response = t.app.oneshot(form_request("/article/create", Some("alice"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/article/list");

        let article = Article::find_with_tags(&t.db, 1).await.unwrap();
        assert_eq!(article.row.title, "Fresh");
        assert_eq!(article.row.author, "alice");
        assert_eq!(article.row.column_id, None);
        assert_eq!(article.row.avatar, None);
        assert_eq!(article.row.total_views, 0);
        assert_eq!(article.tags, vec!["axum", "rust", "web"]);
    }

    #[tokio::test]
    async fn test_create_resizes_avatar() {
        let t = setup_app().await;
        create_user(&t.db, "alice", false).await;
        let png = png_bytes(1000, 333);
        let body = multipart_body(
            &[("title", "Pictured"), ("body", "b")],
            Some(("avatar", "cover.png", "image/png", &png)),
        );

        let response = t.app.oneshot(form_request("/article/create", Some("alice"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let article = Article::find_with_tags(&t.db, 1).await.unwrap();
        let avatar = article.row.avatar.unwrap();
        assert!(avatar.starts_with("article/"));
        assert!(avatar.ends_with(".png"));

        let img = image::open(t.uploads.path().join(&avatar)).unwrap();
        assert_eq!((img.width(), img.height()), (400, 133));
    }

    #[tokio::test]
    async fn test_create_with_broken_avatar_stores_nothing() {
        let t = setup_app().await;
        create_user(&t.db, "alice", false).await;
        let body = multipart_body(
            &[("title", "Broken"), ("body", "b")],
            Some(("avatar", "fake.png", "image/png", b"not a png")),
        );

        let response = t.app.oneshot(form_request("/article/create", Some("alice"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(Article::find_by_id(&t.db, 1).await.unwrap().is_none());
        let stored = walk_files(t.uploads.path());
        assert!(stored.is_empty(), "left behind: {stored:?}");
    }

    #[tokio::test]
    async fn test_create_with_invalid_fields() {
        let t = setup_app().await;
        create_user(&t.db, "alice", false).await;

        let title = "x".repeat(101);
        for fields in [
            vec![("title", ""), ("body", "b")],
            vec![("title", title.as_str()), ("body", "b")],
            vec![("title", "t"), ("body", "")],
            vec![("title", "t"), ("body", "b"), ("column", "abc")],
            vec![("title", "t"), ("body", "b"), ("column", "55")],
        ] {
            let body = multipart_body(&fields, None);
            let response = t.app.clone().oneshot(form_request("/article/create", Some("alice"), body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        assert!(Article::find_by_id(&t.db, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_by_author() {
        let t = setup_app().await;
        let alice = create_user(&t.db, "alice", false).await;
        let id = create_article(&t.db, alice, "Before", "old", None, &["x", "y"]).await;
        set_views(&t.db, id, 4).await;

        let body = multipart_body(&[("title", "After"), ("body", "new"), ("tags", "z")], None);
        let uri = format!("/article/update/{id}");
        let response = t.app.oneshot(form_request(&uri, Some("alice"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/article/detail/{id}"));

        let article = Article::find_with_tags(&t.db, id).await.unwrap();
        assert_eq!(article.row.title, "After");
        assert_eq!(article.row.body, "new");
        assert_eq!(article.row.total_views, 4);
        assert_eq!(article.tags, vec!["z"]);
    }

    #[tokio::test]
    async fn test_update_replaces_old_avatar_file() {
        let t = setup_app().await;
        create_user(&t.db, "alice", false).await;
        let png = png_bytes(800, 600);

        let body = multipart_body(
            &[("title", "Pictured"), ("body", "b")],
            Some(("avatar", "first.png", "image/png", &png)),
        );
        t.app.clone().oneshot(form_request("/article/create", Some("alice"), body)).await.unwrap();
        let first = Article::find_with_tags(&t.db, 1).await.unwrap().row.avatar.unwrap();

        let body = multipart_body(
            &[("title", "Pictured"), ("body", "b")],
            Some(("avatar", "second.png", "image/png", &png)),
        );
        let response = t.app.oneshot(form_request("/article/update/1", Some("alice"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let second = Article::find_with_tags(&t.db, 1).await.unwrap().row.avatar.unwrap();
        assert_ne!(first, second);
        assert!(!t.uploads.path().join(&first).exists());

        let img = image::open(t.uploads.path().join(&second)).unwrap();
        assert_eq!((img.width(), img.height()), (400, 300));
    }

    #[tokio::test]
    async fn test_non_author_cannot_update() {
        let t = setup_app().await;
        let alice = create_user(&t.db, "alice", false).await;
        create_user(&t.db, "mallory", false).await;
        create_user(&t.db, "root", true).await;
        let id = create_article(&t.db, alice, "Mine", "body", None, &["keep"]).await;
        let uri = format!("/article/update/{id}");

        for intruder in ["mallory", "root"] {
            let body = multipart_body(&[("title", "Hijacked"), ("body", "gone")], None);
            let response = t.app.clone().oneshot(form_request(&uri, Some(intruder), body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        let request = Request::builder()
            .uri(&uri)
            .header(header::COOKIE, format!("token={}", token_of("mallory")))
            .body(Body::empty())
            .unwrap();
        let response = t.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let article = Article::find_with_tags(&t.db, id).await.unwrap();
        assert_eq!(article.row.title, "Mine");
        assert_eq!(article.row.body, "body");
        assert_eq!(article.tags, vec!["keep"]);
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let t = setup_app().await;
        let alice = create_user(&t.db, "alice", false).await;
        create_user(&t.db, "mallory", false).await;
        create_user(&t.db, "root", true).await;
        let by_admin = create_article(&t.db, alice, "Moderated", "x", None, &[]).await;
        let by_author = create_article(&t.db, alice, "Retracted", "x", None, &[]).await;

        let delete = |id: i64, username: &str| {
            form_request(&format!("/article/delete/{id}"), Some(username), multipart_body(&[], None))
        };

        let response = t.app.clone().oneshot(delete(by_admin, "mallory")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(Article::find_by_id(&t.db, by_admin).await.unwrap().is_some());

        let response = t.app.clone().oneshot(delete(by_admin, "root")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(Article::find_by_id(&t.db, by_admin).await.unwrap().is_none());

        let response = t.app.clone().oneshot(delete(by_author, "alice")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/article/list");

        let response = t.app.oneshot(delete(by_author, "alice")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let t = setup_app().await;
        create_user(&t.db, "alice", false).await;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/article/list")
            .body(Body::empty())
            .unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let request = Request::builder()
            .uri("/article/delete/1")
            .header(header::COOKIE, format!("token={}", token_of("alice")))
            .body(Body::empty())
            .unwrap();
        let response = t.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    fn walk_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                files.extend(walk_files(&path));
            } else {
                files.push(path);
            }
        }
        files
    }
}
