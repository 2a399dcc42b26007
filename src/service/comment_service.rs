use crate::errors::ApiResult;
use crate::model::comment::Comment;
use sqlx::SqlitePool;

impl Comment {
    /// Comments of one article, oldest first. Comments are written by the comment service.
    pub async fn find_by_article(pool: &SqlitePool, article_id: i64) -> ApiResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.article_id, u.username, c.body, c.created
            FROM comments c
            INNER JOIN users u ON u.id = c.user_id
            WHERE c.article_id = ?
            ORDER BY c.created, c.id
            "#,
        )
        .bind(article_id)
        .fetch_all(pool)
        .await?;

        Ok(comments)
    }
}
