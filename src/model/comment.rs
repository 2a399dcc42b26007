use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Serialize, FromRow, Clone)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub username: String,
    pub body: String,
    pub created: i64,
}
