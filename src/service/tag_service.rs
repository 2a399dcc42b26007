use crate::errors::{not_found, ApiResult};
use crate::model::tag::{Tag, TagWithArticleCount};
use crate::util::common::now_millis;
use sqlx::{query_as, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;

impl Tag {
    pub async fn get_all_with_article_count(pool: &SqlitePool) -> ApiResult<Vec<TagWithArticleCount>> {
        let tags = query_as::<_, TagWithArticleCount>(
            r#"
            SELECT t.name AS name, COUNT(at.article_id) AS article_count
            FROM tags t
            LEFT JOIN article_tags at ON at.tag_id = t.id
            GROUP BY t.id
            ORDER BY article_count DESC, t.name
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(tags)
    }

    /// Tag names of one article, sorted by name.
    pub async fn tags_of(pool: &SqlitePool, article_id: i64) -> ApiResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT t.name
            FROM article_tags at
            INNER JOIN tags t ON t.id = at.tag_id
            WHERE at.article_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(article_id)
        .fetch_all(pool)
        .await?;

        Ok(names)
    }

    /// Replaces the whole tag set of an article.
    pub async fn set_tags(pool: &SqlitePool, article_id: i64, names: &[String]) -> ApiResult<()> {
        let mut tx = pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(not_found("article not found"));
        }

        Tag::set_tags_in(&mut tx, article_id, names).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Same as [`Tag::set_tags`] inside a caller's transaction. Unknown tags are created;
    /// names are trimmed and duplicates collapse into one link.
    pub async fn set_tags_in(
        tx: &mut Transaction<'_, Sqlite>,
        article_id: i64,
        names: &[String],
    ) -> ApiResult<()> {
        sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
            .bind(article_id)
            .execute(&mut **tx)
            .await?;

        for name in normalize_tag_names(names) {
            let tag = Tag::find_or_create(tx, &name).await?;

            sqlx::query(
                r#"
                INSERT OR IGNORE INTO article_tags (article_id, tag_id)
                VALUES (?, ?)
                "#,
            )
            .bind(article_id)
            .bind(tag.id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    pub async fn find_or_create(tx: &mut Transaction<'_, Sqlite>, name: &str) -> ApiResult<Tag> {
        let tag = if let Some(tag) = Tag::find_by_name(tx, name).await? {
            tag
        } else {
            Tag::create(tx, name).await?
        };
        Ok(tag)
    }

    async fn find_by_name(tx: &mut Transaction<'_, Sqlite>, name: &str) -> ApiResult<Option<Self>> {
        let tag = query_as::<_, Tag>("SELECT id, name, created_at FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(tag)
    }

    async fn create(tx: &mut Transaction<'_, Sqlite>, name: &str) -> ApiResult<Tag> {
        let now = now_millis();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tags (name, created_at)
            VALUES (?, ?)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(Tag {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }
}

/// Trims names, drops blanks and keeps the first occurrence of each name.
pub fn normalize_tag_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(String::from)
        .collect()
}
