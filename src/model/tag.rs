use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Serialize, FromRow, Clone)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TagWithArticleCount {
    pub name: String,
    pub article_count: i64,
}
