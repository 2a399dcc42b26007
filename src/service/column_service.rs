use crate::errors::ApiResult;
use crate::model::column::Column;
use crate::util::common::now_millis;
use sqlx::SqlitePool;

impl Column {
    pub async fn all(pool: &SqlitePool) -> ApiResult<Vec<Column>> {
        let columns = sqlx::query_as::<_, Column>(
            "SELECT id, title, created FROM article_columns ORDER BY created, id",
        )
        .fetch_all(pool)
        .await?;

        Ok(columns)
    }

    pub async fn exists(pool: &SqlitePool, id: i64) -> ApiResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM article_columns WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(found.is_some())
    }

    pub async fn create(pool: &SqlitePool, title: &str) -> ApiResult<Column> {
        let now = now_millis();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO article_columns (title, created)
            VALUES (?, ?)
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(Column {
            id,
            title: title.to_string(),
            created: now,
        })
    }
}
