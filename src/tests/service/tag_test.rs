#[cfg(test)]
mod tests {
    use crate::tests::common::*;
    use inkpad::model::tag::Tag;

    fn names(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_tags_replaces_previous_set() {
        let db = setup_db().await;
        let alice = create_user(&db, "alice", false).await;
        let id = create_article(&db, alice, "Tagged", "x", None, &["old", "b"]).await;

        Tag::set_tags(&db, id, &names(&["a", "b"])).await.unwrap();
        assert_eq!(Tag::tags_of(&db, id).await.unwrap(), vec!["a", "b"]);

        Tag::set_tags(&db, id, &names(&["b", "a"])).await.unwrap();
        assert_eq!(Tag::tags_of(&db, id).await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_set_tags_collapses_duplicates_and_blanks() {
        let db = setup_db().await;
        let alice = create_user(&db, "alice", false).await;
        let id = create_article(&db, alice, "Tagged", "x", None, &[]).await;

        Tag::set_tags(&db, id, &names(&[" rust", "rust ", "", "web"])).await.unwrap();
        assert_eq!(Tag::tags_of(&db, id).await.unwrap(), vec!["rust", "web"]);

        Tag::set_tags(&db, id, &[]).await.unwrap();
        assert!(Tag::tags_of(&db, id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_are_shared_between_articles() {
        let db = setup_db().await;
        let alice = create_user(&db, "alice", false).await;
        create_article(&db, alice, "One", "x", None, &["rust", "web"]).await;
        create_article(&db, alice, "Two", "x", None, &["rust"]).await;

        let tags = Tag::get_all_with_article_count(&db).await.unwrap();
        let counts: Vec<_> = tags.iter().map(|t| (t.name.as_str(), t.article_count)).collect();
        assert_eq!(counts, vec![("rust", 2), ("web", 1)]);
    }

    #[tokio::test]
    async fn test_set_tags_on_missing_article() {
        let db = setup_db().await;
        let err = Tag::set_tags(&db, 12, &names(&["a"])).await.unwrap_err();
        assert_eq!(err.code(), 404);
        assert!(Tag::get_all_with_article_count(&db).await.unwrap().is_empty());
    }
}
